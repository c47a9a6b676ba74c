//! Structured record of every decision a scan makes.
//!
//! The orchestrator never logs directly; it streams [`TraceEvent`]s into a
//! [`TraceSink`]. Tests collect them in a `Vec`, the CLI forwards them to
//! `tracing` through [`LogSink`].

use std::fmt;
use std::path::PathBuf;

use humansize::{format_size, BINARY};
use serde::Serialize;
use tracing::Level;

/// One step of a scan, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A mailbox returned by `LIST`, raw and decoded.
    LabelListed { raw: String, decoded: String },
    LabelSelected { label: String, messages: u32 },
    LabelRejected { label: String, reason: String },
    SearchCriteria { criteria: String },
    MessagesFound { count: usize },
    NoMessages,
    MessageStarted {
        id: u32,
        date: Option<String>,
        subject: String,
        from: String,
    },
    MessageUnparsable { id: u32, reason: String },
    Downloaded {
        filename: String,
        path: PathBuf,
        size: u64,
    },
    WouldDownload {
        filename: String,
        path: PathBuf,
        size: u64,
    },
    EmptyPayload { filename: String },
    WriteFailed {
        filename: String,
        path: PathBuf,
        error: String,
    },
    NoAttachments { id: u32 },
    /// Summary; emitted exactly once per scan.
    Finished {
        messages: usize,
        downloaded: usize,
        planned: usize,
        failed: usize,
    },
}

impl TraceEvent {
    /// Severity used when the event is logged.
    pub fn level(&self) -> Level {
        match self {
            Self::LabelRejected { .. } | Self::WriteFailed { .. } => Level::ERROR,
            Self::EmptyPayload { .. } | Self::MessageUnparsable { .. } => Level::WARN,
            _ => Level::INFO,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelListed { raw, decoded } if raw == decoded => {
                write!(f, "Available label: {decoded}")
            }
            Self::LabelListed { raw, decoded } => {
                write!(f, "Available label: {decoded} ({raw})")
            }
            Self::LabelSelected { label, messages } => {
                write!(f, "Selected label \"{label}\" ({messages} messages)")
            }
            Self::LabelRejected { label, reason } => write!(
                f,
                "Error selecting label \"{label}\": {reason}. Please check if the label exists."
            ),
            Self::SearchCriteria { criteria } => write!(f, "Search criteria: {criteria}"),
            Self::MessagesFound { count } => write!(f, "Number of messages found: {count}"),
            Self::NoMessages => write!(f, "No messages found."),
            Self::MessageStarted {
                id,
                date,
                subject,
                from,
            } => {
                write!(f, "Processing email #{id}")?;
                if let Some(date) = date {
                    write!(f, " from {date}")?;
                }
                write!(f, ": \"{subject}\" sent by {from}")
            }
            Self::MessageUnparsable { id, reason } => {
                write!(f, "Skipping email #{id}, it could not be parsed: {reason}")
            }
            Self::Downloaded {
                filename,
                path,
                size,
            } => write!(
                f,
                "Downloaded: {filename} ({}) and saved to {}",
                format_size(*size, BINARY),
                path.display()
            ),
            Self::WouldDownload {
                filename,
                path,
                size,
            } => write!(
                f,
                "Would download: {filename} ({}) and save to {}",
                format_size(*size, BINARY),
                path.display()
            ),
            Self::EmptyPayload { filename } => write!(f, "Empty payload for attachment: {filename}"),
            Self::WriteFailed {
                filename,
                path,
                error,
            } => write!(
                f,
                "Error saving attachment {filename} to {}: {error}",
                path.display()
            ),
            Self::NoAttachments { .. } => write!(f, "No matching attachments found in this email."),
            Self::Finished {
                messages,
                downloaded,
                planned,
                failed,
            } => {
                write!(f, "Attachment download completed: {messages} message(s) scanned, ")?;
                if *planned > 0 {
                    write!(f, "{planned} attachment(s) would be downloaded")?;
                } else {
                    write!(f, "{downloaded} attachment(s) downloaded")?;
                }
                if *failed > 0 {
                    write!(f, ", {failed} failed")?;
                }
                Ok(())
            }
        }
    }
}

/// Receiver of trace events.
pub trait TraceSink {
    fn record(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn record(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn record(&mut self, event: TraceEvent) {
        (**self).record(event);
    }
}

/// Forwards every event to `tracing` at the event's level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&mut self, event: TraceEvent) {
        let level = event.level();
        if level == Level::ERROR {
            tracing::error!("{event}");
        } else if level == Level::WARN {
            tracing::warn!("{event}");
        } else {
            tracing::info!("{event}");
        }
    }
}
