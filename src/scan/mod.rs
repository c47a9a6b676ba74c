//! Mailbox scan: select a label, search by sender and date, save attachments.

pub mod trace;
pub mod window;

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::export::attachment::{write_attachment, OutputDir};
use crate::model::message::ParsedMessage;
use crate::parser::header::{decode_header_value, parse_date};
use crate::parser::label::{decode_label, encode_label};
use crate::parser::mime::{extract_attachments, parse_message, Extracted};
use crate::session::{Credentials, MailSession, ScopedSession, SelectOutcome};

use self::trace::{TraceEvent, TraceSink};
use self::window::{search_query, SearchWindow};

/// Mailbox searched when no label is given.
pub const ALL_MAIL: &str = "[Gmail]/All Mail";

/// What to look for and where to put it.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Readable label name; `None` means [`ALL_MAIL`].
    pub label: Option<String>,
    /// Only messages `FROM` this address.
    pub sender: String,
    pub window: SearchWindow,
    /// Directory attachments are written to. Must exist unless `dry_run`.
    pub destination: PathBuf,
    /// Report what would be written without writing anything.
    pub dry_run: bool,
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    #[default]
    Completed,
    /// The search matched nothing.
    NoMessages,
    /// The label could not be selected; nothing was searched.
    LabelUnavailable,
}

/// Totals of one scan. Per-attachment detail lives in the trace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Messages fetched and examined.
    pub messages: usize,
    /// Messages in which no attachment was found.
    pub without_attachments: usize,
    /// Files written.
    pub downloaded: Vec<PathBuf>,
    /// Files a dry run would have written.
    pub planned: Vec<PathBuf>,
    /// Paths whose write failed.
    pub failed: Vec<PathBuf>,
    /// Attachments skipped because their payload was empty.
    pub empty: usize,
}

impl ScanReport {
    fn finished(&self) -> TraceEvent {
        TraceEvent::Finished {
            messages: self.messages,
            downloaded: self.downloaded.len(),
            planned: self.planned.len(),
            failed: self.failed.len(),
        }
    }
}

/// Log in, list labels, scan, and log out.
///
/// The session is released on every path out of this function, including
/// authentication failure and errors in the middle of the scan.
pub fn run<S: MailSession>(
    session: S,
    credentials: &Credentials,
    request: &ScanRequest,
    sink: &mut dyn TraceSink,
) -> Result<ScanReport> {
    let mut session = ScopedSession::login(session, credentials)?;
    list_labels(&mut session, sink)?;
    let report = scan(&mut session, request, sink)?;
    if let Err(e) = session.release() {
        warn!(error = %e, "Scan finished but the session did not close cleanly");
    }
    Ok(report)
}

/// Trace every mailbox on the server with its decoded name; returns the decoded names.
pub fn list_labels<S: MailSession>(
    session: &mut ScopedSession<S>,
    sink: &mut dyn TraceSink,
) -> Result<Vec<String>> {
    let raw_names = session.list_mailboxes()?;
    let mut decoded_names = Vec::with_capacity(raw_names.len());
    for raw in raw_names {
        let decoded = decode_label(&raw);
        decoded_names.push(decoded.clone());
        sink.record(TraceEvent::LabelListed { raw, decoded });
    }
    Ok(decoded_names)
}

/// Scan one label of an authenticated session.
///
/// A rejected label or an empty search ends the scan normally (see
/// [`ScanOutcome`]). A failed attachment write is traced and skipped.
/// Session errors are returned as-is.
pub fn scan<S: MailSession>(
    session: &mut ScopedSession<S>,
    request: &ScanRequest,
    sink: &mut dyn TraceSink,
) -> Result<ScanReport> {
    let mut report = ScanReport::default();
    let label = request.label.as_deref().unwrap_or(ALL_MAIL);

    match session.select(&encode_label(label))? {
        SelectOutcome::Selected { exists } => sink.record(TraceEvent::LabelSelected {
            label: label.to_string(),
            messages: exists,
        }),
        SelectOutcome::Rejected { reason } => {
            sink.record(TraceEvent::LabelRejected {
                label: label.to_string(),
                reason,
            });
            report.outcome = ScanOutcome::LabelUnavailable;
            sink.record(report.finished());
            return Ok(report);
        }
    }

    let (since, before) = (request.window.since(), request.window.before());
    sink.record(TraceEvent::SearchCriteria {
        criteria: search_query(&request.sender, since, before),
    });
    let ids = session.search(&request.sender, since, before)?;
    sink.record(TraceEvent::MessagesFound { count: ids.len() });

    if ids.is_empty() {
        sink.record(TraceEvent::NoMessages);
        report.outcome = ScanOutcome::NoMessages;
        session.finish();
        sink.record(report.finished());
        return Ok(report);
    }

    let mut output = OutputDir::new(&request.destination);
    debug!(dir = %output.root().display(), dry_run = request.dry_run, "Saving attachments");
    for id in ids {
        let raw = session.fetch(id)?;
        let message = match parse_message(&raw) {
            Ok(message) => message,
            Err(e) => {
                sink.record(TraceEvent::MessageUnparsable {
                    id,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        report.messages += 1;
        sink.record(message_started(id, &message, &request.window));
        save_attachments(id, &message, &mut output, request.dry_run, &mut report, sink);
    }

    session.finish();
    sink.record(report.finished());
    Ok(report)
}

fn message_started(id: u32, message: &ParsedMessage, window: &SearchWindow) -> TraceEvent {
    let headers = &message.headers;
    let date = headers.date.as_deref().and_then(parse_date);
    // The server filters on arrival date; the Date header may disagree.
    if let Some(date) = date.filter(|d| !window.contains(d.date_naive())) {
        debug!(id, date = %date, window = %window, "Date header outside the search window");
    }
    TraceEvent::MessageStarted {
        id,
        date: date.map(|d| d.format("%Y-%m-%d").to_string()),
        subject: headers
            .subject
            .as_deref()
            .map(decode_header_value)
            .unwrap_or_default(),
        from: headers
            .from
            .as_deref()
            .map(decode_header_value)
            .unwrap_or_default(),
    }
}

fn save_attachments(
    id: u32,
    message: &ParsedMessage,
    output: &mut OutputDir,
    dry_run: bool,
    report: &mut ScanReport,
    sink: &mut dyn TraceSink,
) {
    let mut found = false;

    for item in extract_attachments(message) {
        let attachment = match item {
            Extracted::Attachment(attachment) => attachment,
            Extracted::EmptyPayload { filename } => {
                report.empty += 1;
                sink.record(TraceEvent::EmptyPayload { filename });
                continue;
            }
        };
        found = true;

        let path = output.claim(&attachment.filename);
        debug!(id, path = %path.display(), content_type = %attachment.content_type, "Attachment");
        if dry_run {
            sink.record(TraceEvent::WouldDownload {
                filename: attachment.filename.clone(),
                path: path.clone(),
                size: attachment.size(),
            });
            report.planned.push(path);
            continue;
        }

        match write_attachment(&path, attachment.payload) {
            Ok(()) => {
                sink.record(TraceEvent::Downloaded {
                    filename: attachment.filename.clone(),
                    path: path.clone(),
                    size: attachment.size(),
                });
                report.downloaded.push(path);
            }
            Err(e) => {
                sink.record(TraceEvent::WriteFailed {
                    filename: attachment.filename.clone(),
                    path: path.clone(),
                    error: e.to_string(),
                });
                report.failed.push(path);
            }
        }
    }

    if !found {
        report.without_attachments += 1;
        sink.record(TraceEvent::NoAttachments { id });
    }
}
