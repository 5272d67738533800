//! The persistence seam: [`UserRepository`] and the in-memory
//! implementation.
//!
//! Parley doesn't implement durable storage itself — that's the job of
//! whatever row-store you put behind this trait (SQLite, Postgres, a
//! flat file). The trait is the contract the [`UserStore`] needs:
//! find-or-create by name, flip the admin flag, append a chat row.
//! [`MemoryRepository`] implements it in memory for demos and tests.
//!
//! Implementations don't need their own writer serialization: the
//! [`UserStore`] calls into the repository while holding its cache
//! lock, so calls arrive one at a time.
//!
//! [`UserStore`]: crate::UserStore

use std::collections::HashMap;
use std::sync::Mutex;

use crate::StoreError;

/// A user row as the repository knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Backing-store identifier, unique per user.
    pub id: i64,
    /// The user's name (the lookup key).
    pub name: String,
    /// Whether the user has admin rights.
    pub admin: bool,
}

/// One persisted chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    /// The sender's backing-store identifier.
    pub user_id: i64,
    /// Unix milliseconds at which the message was sent.
    pub sent_at: u64,
    /// The message text.
    pub text: String,
}

/// Durable storage for users and chat history.
///
/// Every method may fail; the caller decides which failures are fatal
/// (login) and which are best-effort (chat storage).
pub trait UserRepository: Send + Sync + 'static {
    /// Returns the row for `name`, creating it if absent.
    ///
    /// Never fails with "not found" — not-found implies create. New
    /// users are never admins.
    fn find_or_create(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<UserRecord, StoreError>> + Send;

    /// Returns the row for `name` without creating it.
    fn find(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>, StoreError>> + Send;

    /// Updates the admin flag of the row with the given id.
    fn update_admin(
        &self,
        id: i64,
        admin: bool,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Appends one chat line to the history.
    fn append_chat(
        &self,
        row: ChatRow,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Shared-handle passthrough, so an embedder can keep a handle to its
/// repository while the server owns another.
impl<R: UserRepository> UserRepository for std::sync::Arc<R> {
    async fn find_or_create(&self, name: &str) -> Result<UserRecord, StoreError> {
        (**self).find_or_create(name).await
    }

    async fn find(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        (**self).find(name).await
    }

    async fn update_admin(&self, id: i64, admin: bool) -> Result<(), StoreError> {
        (**self).update_admin(id, admin).await
    }

    async fn append_chat(&self, row: ChatRow) -> Result<(), StoreError> {
        (**self).append_chat(row).await
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    users: HashMap<String, UserRecord>,
    chats: Vec<ChatRow>,
}

/// An in-memory [`UserRepository`].
///
/// Nothing survives a restart — use it for demos and tests, never as
/// the real store. A std `Mutex` is fine here: no method awaits while
/// holding it.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryInner>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository preseeded with admin users.
    ///
    /// Admin rights are only ever granted via `make-admin`, which is
    /// itself admin-only — so a fresh deployment needs at least one
    /// admin baked in.
    pub fn with_admins<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repo = Self::new();
        {
            let mut inner = repo.inner.lock().expect("repository lock poisoned");
            for name in names {
                let name = name.into();
                inner.next_id += 1;
                let id = inner.next_id;
                inner.users.insert(
                    name.clone(),
                    UserRecord {
                        id,
                        name,
                        admin: true,
                    },
                );
            }
        }
        repo
    }

    /// Number of user rows (test inspection).
    pub fn user_count(&self) -> usize {
        self.inner.lock().expect("repository lock poisoned").users.len()
    }

    /// Snapshot of the persisted chat rows (test inspection).
    pub fn chat_rows(&self) -> Vec<ChatRow> {
        self.inner
            .lock()
            .expect("repository lock poisoned")
            .chats
            .clone()
    }
}

impl UserRepository for MemoryRepository {
    async fn find_or_create(&self, name: &str) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().expect("repository lock poisoned");
        if let Some(record) = inner.users.get(name) {
            return Ok(record.clone());
        }

        inner.next_id += 1;
        let record = UserRecord {
            id: inner.next_id,
            name: name.to_string(),
            admin: false,
        };
        inner.users.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn find(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().expect("repository lock poisoned");
        Ok(inner.users.get(name).cloned())
    }

    async fn update_admin(&self, id: i64, admin: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("repository lock poisoned");
        let record = inner
            .users
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Backend(format!("no user row with id {id}")))?;
        record.admin = admin;
        Ok(())
    }

    async fn append_chat(&self, row: ChatRow) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("repository lock poisoned");
        inner.chats.push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let repo = MemoryRepository::new();
        let first = repo.find_or_create("alice").await.unwrap();
        let second = repo.find_or_create("alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn test_new_users_are_not_admin() {
        let repo = MemoryRepository::new();
        let rec = repo.find_or_create("bob").await.unwrap();
        assert!(!rec.admin);
    }

    #[tokio::test]
    async fn test_with_admins_preseeds_admin_rows() {
        let repo = MemoryRepository::with_admins(["root"]);
        let rec = repo.find("root").await.unwrap().expect("should exist");
        assert!(rec.admin);
        // find_or_create must return the preseeded row, not a new one.
        let same = repo.find_or_create("root").await.unwrap();
        assert_eq!(rec, same);
    }

    #[tokio::test]
    async fn test_find_does_not_create() {
        let repo = MemoryRepository::new();
        assert!(repo.find("ghost").await.unwrap().is_none());
        assert_eq!(repo.user_count(), 0);
    }

    #[tokio::test]
    async fn test_update_admin_flips_row() {
        let repo = MemoryRepository::new();
        let rec = repo.find_or_create("bob").await.unwrap();
        repo.update_admin(rec.id, true).await.unwrap();
        assert!(repo.find("bob").await.unwrap().unwrap().admin);
    }

    #[tokio::test]
    async fn test_append_chat_records_rows_in_order() {
        let repo = MemoryRepository::new();
        let rec = repo.find_or_create("alice").await.unwrap();
        for (i, text) in ["one", "two"].iter().enumerate() {
            repo.append_chat(ChatRow {
                user_id: rec.id,
                sent_at: i as u64,
                text: text.to_string(),
            })
            .await
            .unwrap();
        }
        let rows = repo.chat_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "one");
        assert_eq!(rows[1].text, "two");
    }
}
