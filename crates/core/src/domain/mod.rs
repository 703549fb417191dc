pub mod catalog;
pub mod lead;
pub mod message;
pub mod quote;
