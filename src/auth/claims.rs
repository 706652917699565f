use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Uid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Parse the subject as a user id
    pub fn uid(&self) -> Option<Uid> {
        self.sub.trim().parse().ok()
    }
}
