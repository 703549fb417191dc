use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Customer,
    Assistant,
    /// Internal marker appended by the agent (e.g. "quote sent" notes).
    /// Stored for future-turn context, never replayed as reasoning input.
    ToolNote,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
            Self::ToolNote => "tool_note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Self::Customer),
            "assistant" => Some(Self::Assistant),
            "tool_note" => Some(Self::ToolNote),
            _ => None,
        }
    }

    /// Whether messages with this role are fed back to the reasoning model.
    pub fn replayed_in_transcript(&self) -> bool {
        matches!(self, Self::Customer | Self::Assistant)
    }
}

/// One append-only conversational turn. Retrieval order is creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub lead_id: LeadId,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
