//! No-op authentication stub
//!
//! The appliance is assumed to live on a trusted local network, so the
//! console performs no real authentication: any login yields the same
//! administrative session. This models a deployment assumption, not a
//! missing feature. A deployment on a less trusted network should
//! replace this module with a capability-checked session abstraction.

use serde::{Deserialize, Serialize};

/// A console session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub is_admin: bool,
}

impl Session {
    /// The single session the trusted-network deployment hands out
    pub fn trusted_network() -> Self {
        Self {
            username: "admin".to_string(),
            is_admin: true,
        }
    }
}

/// Accepts any credentials and returns the administrative session
pub fn login(_username: &str, _password: &str) -> Session {
    Session::trusted_network()
}
