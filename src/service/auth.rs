//! Optional shared-secret check for the install and exit routes

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use super::AppState;
use crate::error::InstallError;

pub const SECRET_HEADER: &str = "x-admin-password";

/// Only the digest of the secret is kept in memory.
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Both sides are hashed first so the comparison length never depends
    /// on the candidate.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

pub async fn require_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, InstallError> {
    if let Some(secret) = &state.secret {
        let supplied = req
            .headers()
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if !supplied.is_some_and(|v| secret.matches(v)) {
            log::warn!(
                "Rejected {} {}: missing or wrong {SECRET_HEADER}",
                req.method(),
                req.uri().path()
            );
            return Err(InstallError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_exact_secret() {
        let secret = SharedSecret::new("hunter2");
        assert!(secret.matches("hunter2"));
        assert!(!secret.matches("hunter"));
        assert!(!secret.matches("hunter2 "));
        assert!(!secret.matches(""));
    }

    #[test]
    fn debug_does_not_leak() {
        assert_eq!(format!("{:?}", SharedSecret::new("x")), "SharedSecret(..)");
    }
}
