//! Core data model types for mailbox messages and report rows.

pub mod message;
pub mod report;
