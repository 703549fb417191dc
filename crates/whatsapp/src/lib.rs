//! Evolution API integration: outbound chat delivery and inbound webhook
//! payload handling.

pub mod client;
pub mod events;

pub use client::{mask_phone, typing_delay, ChatGateway, EvolutionClient, GatewayError};
pub use events::{extract_inbound, is_message_event, InboundMessage, WebhookPayload};
