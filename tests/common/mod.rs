//! A scripted, in-memory mail session for driving scans in tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};

use mailgrab::error::{MailgrabError, Result};
use mailgrab::session::{Credentials, MailSession, SelectOutcome};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

pub fn credentials() -> Credentials {
    Credentials {
        address: "rider@example.com".to_string(),
        secret: SecretString::from("app-password".to_string()),
    }
}

/// Every command the fake received, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.0.borrow_mut().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// A mailbox server holding a fixed set of messages.
pub struct FakeMailbox {
    pub password: String,
    pub mailboxes: Vec<String>,
    pub messages: BTreeMap<u32, Vec<u8>>,
    /// Mailbox names (encoded) that SELECT refuses.
    pub rejected: Vec<String>,
    /// A fetch of this id fails as if the connection dropped.
    pub broken_fetch: Option<u32>,
    log: CallLog,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self {
            password: "app-password".to_string(),
            mailboxes: vec![
                "INBOX".to_string(),
                "Bills".to_string(),
                "[Gmail]/All Mail".to_string(),
                "&ZeVnLIqe-".to_string(),
            ],
            messages: BTreeMap::new(),
            rejected: Vec::new(),
            broken_fetch: None,
            log: CallLog::default(),
        }
    }

    /// Store messages under ids 1, 2, 3, ...
    pub fn with_messages(mut self, messages: Vec<Vec<u8>>) -> Self {
        self.messages = (1u32..).zip(messages).collect();
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl MailSession for FakeMailbox {
    fn authenticate(&mut self, address: &str, secret: &SecretString) -> Result<()> {
        self.log.push("authenticate");
        if secret.expose_secret() == self.password {
            Ok(())
        } else {
            Err(MailgrabError::Authentication {
                address: address.to_string(),
                reason: "[AUTHENTICATIONFAILED] Invalid credentials".to_string(),
            })
        }
    }

    fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        self.log.push("list");
        Ok(self.mailboxes.clone())
    }

    fn select(&mut self, mailbox: &str) -> Result<SelectOutcome> {
        self.log.push(format!("select {mailbox}"));
        if self.rejected.iter().any(|m| m == mailbox) {
            return Ok(SelectOutcome::Rejected {
                reason: "[NONEXISTENT] Unknown Mailbox".to_string(),
            });
        }
        Ok(SelectOutcome::Selected {
            exists: self.messages.len() as u32,
        })
    }

    fn search(&mut self, sender: &str, since: NaiveDate, before: NaiveDate) -> Result<Vec<u32>> {
        self.log.push(format!("search {sender} {since} {before}"));
        Ok(self.messages.keys().copied().collect())
    }

    fn fetch(&mut self, id: u32) -> Result<Vec<u8>> {
        self.log.push(format!("fetch {id}"));
        if self.broken_fetch == Some(id) {
            return Err(MailgrabError::Protocol("connection lost".to_string()));
        }
        self.messages
            .get(&id)
            .cloned()
            .ok_or_else(|| MailgrabError::Protocol(format!("no message {id}")))
    }

    fn close(&mut self) -> Result<()> {
        self.log.push("close");
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.log.push("logout");
        Ok(())
    }
}
