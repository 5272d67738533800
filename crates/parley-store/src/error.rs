//! Error types for the user store.

/// Errors that can occur in the store layer.
///
/// A missing user is NOT an error for
/// [`find_or_create`](crate::UserStore::find_or_create) — not-found
/// implies create. These variants cover genuine faults plus the
/// lookups that are allowed to miss.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An empty name can never resolve or create a user.
    #[error("empty user name")]
    EmptyName,

    /// A lookup that does not create (e.g. make-admin's target) found
    /// no user with this name.
    #[error("no such user: {0}")]
    NotFound(String),

    /// The persistence collaborator failed. The message is whatever
    /// the repository implementation reported.
    #[error("repository failure: {0}")]
    Backend(String),
}
