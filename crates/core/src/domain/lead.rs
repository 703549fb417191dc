use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Quoted,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Quoted => "quoted",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "quoted" => Some(Self::Quoted),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A customer conversation identity, keyed by WhatsApp phone number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub phone: String,
    /// Display name from the chat gateway. First write wins; later webhook
    /// names never overwrite a stored one.
    pub name: Option<String>,
    pub status: LeadStatus,
    /// Set when the assistant's last reply offered to assemble a quote and
    /// the customer has not yet answered. Drives forced quote issuance.
    pub awaiting_quote_confirmation: bool,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn can_transition_to(&self, next: &LeadStatus) -> bool {
        matches!(
            (&self.status, next),
            (LeadStatus::New, LeadStatus::Quoted)
                | (LeadStatus::New, LeadStatus::Closed)
                | (LeadStatus::Quoted, LeadStatus::Closed)
        )
    }

    pub fn transition_to(&mut self, next: LeadStatus) -> Result<(), DomainError> {
        if self.can_transition_to(&next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidLeadTransition { from: self.status.clone(), to: next })
    }
}
