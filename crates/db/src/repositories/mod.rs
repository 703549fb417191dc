use async_trait::async_trait;
use thiserror::Error;

use orcabot_core::domain::lead::{Lead, LeadId};
use orcabot_core::domain::message::Message;
use orcabot_core::domain::quote::{Quote, QuoteId};

pub mod lead;
pub mod memory;
pub mod message;
pub mod quote;

pub use lead::SqlLeadRepository;
pub use memory::{InMemoryLeadRepository, InMemoryMessageRepository, InMemoryQuoteRepository};
pub use message::SqlMessageRepository;
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, RepositoryError>;
    async fn save(&self, lead: Lead) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), RepositoryError>;

    /// Most recent `limit` turns for a lead, returned oldest first.
    async fn list_recent(
        &self,
        lead_id: &LeadId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    async fn find_latest_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<Quote>, RepositoryError>;
    async fn save(&self, quote: Quote) -> Result<(), RepositoryError>;

    async fn has_quote_for_lead(&self, lead_id: &LeadId) -> Result<bool, RepositoryError> {
        Ok(self.find_latest_for_lead(lead_id).await?.is_some())
    }
}
