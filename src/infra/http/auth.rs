//! Verified contributor identity.
//!
//! Authentication happens upstream. The gateway forwards the verified contributor in a trusted
//! header; this module only reads it back.

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;

use crate::domain::canvas::ContributorId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("verified identity header `{0}` is missing")]
    Missing(String),
    #[error("verified identity header `{0}` is malformed")]
    Invalid(String),
}

/// Capability check returning the contributor a request acts for.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, headers: &HeaderMap) -> Result<ContributorId, AuthError>;
}

pub struct GatewayHeaderVerifier {
    header: HeaderName,
}

impl GatewayHeaderVerifier {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl SessionVerifier for GatewayHeaderVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<ContributorId, AuthError> {
        let value = headers
            .get(&self.header)
            .ok_or_else(|| AuthError::Missing(self.header.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::Invalid(self.header.to_string()))?;
        ContributorId::parse(value).map_err(|_| AuthError::Invalid(self.header.to_string()))
    }
}
