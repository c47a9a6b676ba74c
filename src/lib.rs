//! `mailgrab` — download attachments from an IMAP mailbox.
//!
//! Selects a (Gmail) label, searches it for messages from one sender inside
//! a date window, and saves every attachment to a directory without ever
//! overwriting an existing file. A dry run reports the exact paths a real
//! run would use.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod scan;
pub mod secrets;
pub mod session;
