//! CA certificate chain lookup.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("CA certificate chain unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the CA's own chain, leaf-most first, as DER certificates.
pub trait CaChainProvider: Send + Sync + fmt::Debug {
    fn ca_cert_chain(&self) -> Result<Vec<Vec<u8>>, ChainError>;
}

/// A chain fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticChain {
    certs: Vec<Vec<u8>>,
}

impl StaticChain {
    pub fn new(certs: Vec<Vec<u8>>) -> Self {
        Self { certs }
    }
}

impl CaChainProvider for StaticChain {
    fn ca_cert_chain(&self) -> Result<Vec<Vec<u8>>, ChainError> {
        Ok(self.certs.clone())
    }
}
