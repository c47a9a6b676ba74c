//! Core data model types for fetched messages and their attachments.

pub mod attachment;
pub mod message;
