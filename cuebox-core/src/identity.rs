use async_trait::async_trait;
use thiserror::Error;

use crate::UserId;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The credential is unknown or expired
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Identity lookup failed: {0}")]
    Internal(String),
}

/// Resolves a caller credential to a stable user id.
///
/// The engine never calls this itself. Callers resolve the user first and pass the id into
/// each operation that needs one.
#[async_trait]
pub trait IdentityProvider
where
    Self: Send + Sync + 'static,
{
    async fn resolve(&self, credential: &str) -> Result<UserId, IdentityError>;
}
