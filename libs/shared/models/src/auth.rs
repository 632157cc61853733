use serde::{Deserialize, Serialize};

/// Caller's ID token as presented in the `Authorization: Bearer` header.
///
/// The API does not verify it; the realtime database enforces its own rules
/// against the token we forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
