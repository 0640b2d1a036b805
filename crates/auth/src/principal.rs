use serde::{Deserialize, Serialize};

use tally_core::UserId;

use crate::user::User;

/// A resolved, authenticated caller.
///
/// Built from the user store on every request, so superuser status is never
/// taken from a token or a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub is_superuser: bool,
}

impl Principal {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, is_superuser: false }
    }

    pub fn superuser(user_id: UserId) -> Self {
        Self { user_id, is_superuser: true }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_superuser: user.is_superuser,
        }
    }
}
