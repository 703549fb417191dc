use async_trait::async_trait;
use thiserror::Error;

use orcabot_core::Quote;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document render failed: {0}")]
    Render(String),
    #[error("document storage failed: {0}")]
    Storage(String),
}

/// A stored quote document, addressable by customers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedDocument {
    pub public_url: String,
    pub filename: String,
}

/// Seam between the issuance pipeline and whatever renders/stores the
/// printable quote. The server crate provides the real implementation;
/// issuance treats failure as "quote without a document", never as a lost
/// transaction.
#[async_trait]
pub trait DocumentIssuer: Send + Sync {
    async fn render_and_store(
        &self,
        quote: &Quote,
        customer_name: &str,
    ) -> Result<IssuedDocument, DocumentError>;
}
