//! The cached user store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{ChatRow, StoreError, User, UserRepository};

/// Cache-backed front door to user persistence.
///
/// Holds the single live [`User`] value per name. Constructed once at
/// server startup and shared by handle — there is no global instance.
///
/// # Locking discipline
///
/// One internal lock guards the cache, and repository calls happen
/// while it is held. That is what makes the first-login race safe: two
/// concurrent logins of a brand-new name serialize on the lock, the
/// winner creates the row and populates the cache, and the loser finds
/// the winner's `User` on its cache check — never a duplicate.
///
/// Hard global invariant: no method of this type calls into the client
/// registry, and the registry never calls in here. The two locks are
/// never nested, in either order.
pub struct UserStore<R: UserRepository> {
    repo: R,
    cache: Mutex<HashMap<String, Arc<User>>>,
}

impl<R: UserRepository> UserStore<R> {
    /// Creates a store over the given repository with an empty cache.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `name` to its shared [`User`], creating the user on
    /// first sight.
    ///
    /// # Errors
    /// Fails only on an empty name or a repository fault — "not found"
    /// implies create and is not an error.
    pub async fn find_or_create(&self, name: &str) -> Result<Arc<User>, StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let mut cache = self.cache.lock().await;
        if let Some(user) = cache.get(name) {
            return Ok(Arc::clone(user));
        }

        let record = self.repo.find_or_create(name).await?;
        let user = Arc::new(User::new(record.id, record.name, record.admin));
        cache.insert(name.to_string(), Arc::clone(&user));
        tracing::debug!(%name, id = user.id(), "user cached");
        Ok(user)
    }

    /// Resolves `name` without creating it.
    ///
    /// Used by operations that target an existing user (make-admin):
    /// a typo must not mint a new account.
    pub async fn find_existing(&self, name: &str) -> Result<Arc<User>, StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let mut cache = self.cache.lock().await;
        if let Some(user) = cache.get(name) {
            return Ok(Arc::clone(user));
        }

        match self.repo.find(name).await? {
            Some(record) => {
                let user = Arc::new(User::new(record.id, record.name, record.admin));
                cache.insert(name.to_string(), Arc::clone(&user));
                Ok(user)
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    /// Flips a user's admin flag, durably and in memory.
    ///
    /// The in-memory flag changes only after the repository accepted
    /// the update, so `is_admin()` never claims rights the store
    /// didn't persist.
    pub async fn set_admin(&self, user: &User, admin: bool) -> Result<(), StoreError> {
        let _cache = self.cache.lock().await;
        self.repo.update_admin(user.id(), admin).await?;
        user.set_admin_flag(admin);
        tracing::info!(name = user.name(), admin, "admin flag updated");
        Ok(())
    }

    /// Appends one chat line to the user's history.
    ///
    /// Callers treat failures as best-effort: log and carry on, the
    /// message is still broadcast.
    pub async fn store_chat(
        &self,
        user: &User,
        sent_at: u64,
        text: &str,
    ) -> Result<(), StoreError> {
        let _cache = self.cache.lock().await;
        self.repo
            .append_chat(ChatRow {
                user_id: user.id(),
                sent_at,
                text: text.to_string(),
            })
            .await
    }
}
