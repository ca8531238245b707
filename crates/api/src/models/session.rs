//! Session-related types.
//!
//! Sessions are issued by the marketplace's auth service; this service only
//! reads the identity stored in them.

use serde::{Deserialize, Serialize};

use marketplace_core::UserId;

/// Session-stored user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
