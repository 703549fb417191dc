use std::collections::HashMap;

use tokio::sync::RwLock;

use orcabot_core::domain::lead::{Lead, LeadId};
use orcabot_core::domain::message::Message;
use orcabot_core::domain::quote::{Quote, QuoteId};

use super::{LeadRepository, MessageRepository, QuoteRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<HashMap<String, Lead>>,
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads.get(&id.0).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads.values().find(|lead| lead.phone == phone).cloned())
    }

    async fn save(&self, mut lead: Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        // Same first-write-wins name rule as the SQL upsert.
        if let Some(existing) = leads.get(&lead.id.0) {
            if existing.name.is_some() {
                lead.name = existing.name.clone();
            }
        }
        leads.insert(lead.id.0.clone(), lead);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.entry(message.lead_id.0.clone()).or_default().push(message);
        Ok(())
    }

    async fn list_recent(
        &self,
        lead_id: &LeadId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let history = messages.get(&lead_id.0).map(Vec::as_slice).unwrap_or_default();
        let skip = history.len().saturating_sub(limit as usize);
        Ok(history[skip..].to_vec())
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, Quote>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn find_latest_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .values()
            .filter(|quote| quote.lead_id == *lead_id)
            .max_by_key(|quote| quote.issued_at)
            .cloned())
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }
}
