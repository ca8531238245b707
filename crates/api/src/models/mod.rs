//! Request-scoped models that are not part of the domain core.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
