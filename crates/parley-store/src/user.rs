//! The shared user value.

use std::sync::atomic::{AtomicBool, Ordering};

/// One chat user.
///
/// Owned by the [`UserStore`](crate::UserStore) cache and shared as
/// `Arc<User>` with every session logged in under this name. The name
/// is the immutable key; the admin flag is the only mutable attribute
/// and changes only through
/// [`UserStore::set_admin`](crate::UserStore::set_admin), so an atomic
/// is enough — no lock, no torn reads.
#[derive(Debug)]
pub struct User {
    id: i64,
    name: String,
    admin: AtomicBool,
}

impl User {
    pub(crate) fn new(id: i64, name: String, admin: bool) -> Self {
        Self {
            id,
            name,
            admin: AtomicBool::new(admin),
        }
    }

    /// The backing-store row identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// The user's name (unique, immutable).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this user currently has admin rights.
    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::Acquire)
    }

    pub(crate) fn set_admin_flag(&self, admin: bool) {
        self.admin.store(admin, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_flag_starts_as_constructed() {
        assert!(!User::new(1, "bob".into(), false).is_admin());
        assert!(User::new(2, "root".into(), true).is_admin());
    }

    #[test]
    fn test_admin_flag_is_visible_after_set() {
        let user = User::new(1, "bob".into(), false);
        user.set_admin_flag(true);
        assert!(user.is_admin());
    }
}
