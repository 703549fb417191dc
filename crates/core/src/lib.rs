//! Core domain and configuration for orcabot.
//!
//! This crate holds everything the rest of the workspace agrees on:
//! - **Domain types** (`domain`) - leads, conversation messages, catalog
//!   entries and immutable quotes with currency-precise totals
//! - **Configuration** (`config`) - layered file/env/override loading with
//!   fail-fast validation
//! - **Error taxonomy** (`errors`) - domain/application/interface layering
//!   with user-safe messages for the customer-facing edge
//! - **Retry policy** (`retry`) - bounded exponential backoff shared by the
//!   outbound HTTP clients
//!
//! No I/O happens here; integration crates depend on this one, never the
//! other way around.

pub mod config;
pub mod domain;
pub mod errors;
pub mod retry;

pub use domain::catalog::CatalogEntry;
pub use domain::lead::{Lead, LeadId, LeadStatus};
pub use domain::message::{Message, MessageId, MessageRole};
pub use domain::quote::{Quote, QuoteId, QuoteLineItem};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use retry::RetryPolicy;
