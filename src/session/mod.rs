//! The mail session collaborator and the scoped guard around it.
//!
//! [`MailSession`] is the narrow set of IMAP commands a scan needs.
//! [`ScopedSession`] owns one for the duration of a run and guarantees the
//! mailbox is closed and the session logged out exactly once, on every
//! exit path, from `Drop` if nothing else.

pub mod imap;

use chrono::NaiveDate;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::Result;

/// Result of selecting a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The mailbox is open and holds `exists` messages.
    Selected { exists: u32 },
    /// The server refused (no such label, no access).
    Rejected { reason: String },
}

/// Blocking mail session commands, in the order a scan issues them.
///
/// Every call may fail; a failure other than a rejected `select` means
/// the session is unusable.
pub trait MailSession {
    fn authenticate(&mut self, address: &str, secret: &SecretString) -> Result<()>;

    /// Names of all mailboxes, still in modified UTF-7.
    fn list_mailboxes(&mut self) -> Result<Vec<String>>;

    /// Select a mailbox by its encoded name.
    fn select(&mut self, mailbox: &str) -> Result<SelectOutcome>;

    /// Ids of messages from `sender` received on or after `since` and before `before`.
    fn search(&mut self, sender: &str, since: NaiveDate, before: NaiveDate) -> Result<Vec<u32>>;

    /// Full raw RFC 5322 bytes of one message.
    fn fetch(&mut self, id: u32) -> Result<Vec<u8>>;

    /// Close the selected mailbox.
    fn close(&mut self) -> Result<()>;

    fn logout(&mut self) -> Result<()>;
}

/// Address and password for `authenticate`.
#[derive(Debug)]
pub struct Credentials {
    pub address: String,
    pub secret: SecretString,
}

/// Where a scoped session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    LabelSelected,
    Searching,
    Iterating,
    Done,
    Failed,
}

/// Owns a [`MailSession`] and tears it down exactly once.
pub struct ScopedSession<S: MailSession> {
    inner: S,
    state: SessionState,
    selected: bool,
    released: bool,
}

impl<S: MailSession> ScopedSession<S> {
    /// Take ownership of a connected session.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SessionState::Connected,
            selected: false,
            released: false,
        }
    }

    /// Wrap `inner` and authenticate. On failure the session is torn down
    /// before the error is returned.
    pub fn login(inner: S, credentials: &Credentials) -> Result<Self> {
        let mut scoped = Self::new(inner);
        if let Err(e) = scoped.inner.authenticate(&credentials.address, &credentials.secret) {
            scoped.state = SessionState::Failed;
            return Err(e);
        }
        debug!(address = %credentials.address, "Authenticated");
        Ok(scoped)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Run a command; any error moves the session to `Failed`.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let result = op(&mut self.inner);
        if result.is_err() {
            self.transition(SessionState::Failed);
        }
        result
    }

    pub fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        self.guarded(|s| s.list_mailboxes())
    }

    pub fn select(&mut self, mailbox: &str) -> Result<SelectOutcome> {
        let outcome = self.guarded(|s| s.select(mailbox))?;
        match outcome {
            SelectOutcome::Selected { .. } => {
                self.selected = true;
                self.transition(SessionState::LabelSelected);
            }
            SelectOutcome::Rejected { .. } => self.transition(SessionState::Failed),
        }
        Ok(outcome)
    }

    pub fn search(&mut self, sender: &str, since: NaiveDate, before: NaiveDate) -> Result<Vec<u32>> {
        self.transition(SessionState::Searching);
        self.guarded(|s| s.search(sender, since, before))
    }

    pub fn fetch(&mut self, id: u32) -> Result<Vec<u8>> {
        self.transition(SessionState::Iterating);
        self.guarded(|s| s.fetch(id))
    }

    /// Mark the scan as complete.
    pub fn finish(&mut self) {
        if self.state != SessionState::Failed {
            self.transition(SessionState::Done);
        }
    }

    /// Close the mailbox (if one was selected) and log out.
    ///
    /// Both steps are attempted even if the first fails; the first error
    /// is returned.
    pub fn release(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let closed = if self.selected {
            self.inner.close()
        } else {
            Ok(())
        };
        let logged_out = self.inner.logout();
        self.transition(SessionState::Disconnected);
        closed.and(logged_out)
    }
}

impl<S: MailSession> Drop for ScopedSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Failed to close mail session cleanly");
        }
    }
}
