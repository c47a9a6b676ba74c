//! [`MailSession`] over a real IMAP server (TLS, blocking).

use std::net::TcpStream;

use chrono::NaiveDate;
use native_tls::{TlsConnector, TlsStream};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::{MailSession, SelectOutcome};
use crate::error::{MailgrabError, Result};
use crate::scan::window::search_query;

type Stream = TlsStream<TcpStream>;

/// Gmail's IMAP endpoint.
pub const GMAIL_HOST: &str = "imap.gmail.com";
/// IMAP over implicit TLS.
pub const IMAPS_PORT: u16 = 993;

enum Connection {
    Unauthenticated(imap::Client<Stream>),
    Authenticated(imap::Session<Stream>),
    Closed,
}

/// A TLS IMAP connection.
pub struct ImapSession {
    server: String,
    connection: Connection,
}

impl ImapSession {
    /// Open a TLS connection to `host:port`. Authentication happens later.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let server = format!("{host}:{port}");
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| MailgrabError::Tls(e.to_string()))?;

        info!(server = %server, "Connecting to IMAP server");
        let client = imap::connect((host, port), host, &tls).map_err(|e| {
            MailgrabError::Connection {
                server: server.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            server,
            connection: Connection::Unauthenticated(client),
        })
    }

    fn session(&mut self) -> Result<&mut imap::Session<Stream>> {
        match &mut self.connection {
            Connection::Authenticated(session) => Ok(session),
            Connection::Unauthenticated(_) => {
                Err(MailgrabError::Protocol("not authenticated".into()))
            }
            Connection::Closed => Err(MailgrabError::Protocol("session already closed".into())),
        }
    }
}

impl MailSession for ImapSession {
    fn authenticate(&mut self, address: &str, secret: &SecretString) -> Result<()> {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Unauthenticated(client) => {
                match client.login(address, secret.expose_secret()) {
                    Ok(session) => {
                        info!(server = %self.server, "Logged in");
                        self.connection = Connection::Authenticated(session);
                        Ok(())
                    }
                    Err((e, client)) => {
                        self.connection = Connection::Unauthenticated(client);
                        Err(MailgrabError::Authentication {
                            address: address.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
            other => {
                self.connection = other;
                Err(MailgrabError::Protocol(
                    "cannot log in: session already authenticated or closed".into(),
                ))
            }
        }
    }

    fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        let names = self.session()?.list(Some(""), Some("*"))?;
        Ok(names.iter().map(|name| name.name().to_string()).collect())
    }

    fn select(&mut self, mailbox: &str) -> Result<SelectOutcome> {
        match self.session()?.select(mailbox) {
            Ok(status) => Ok(SelectOutcome::Selected {
                exists: status.exists,
            }),
            Err(imap::Error::No(reason)) | Err(imap::Error::Bad(reason)) => {
                Ok(SelectOutcome::Rejected { reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn search(&mut self, sender: &str, since: NaiveDate, before: NaiveDate) -> Result<Vec<u32>> {
        let query = search_query(sender, since, before);
        debug!(query = %query, "SEARCH");
        let mut ids: Vec<u32> = self.session()?.search(&query)?.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&mut self, id: u32) -> Result<Vec<u8>> {
        let fetches = self.session()?.fetch(id.to_string(), "RFC822")?;
        fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| MailgrabError::Protocol(format!("message {id} came back without a body")))
    }

    fn close(&mut self) -> Result<()> {
        self.session()?.close()?;
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Authenticated(mut session) => {
                session.logout()?;
                debug!(server = %self.server, "Logged out");
                Ok(())
            }
            // Never authenticated: dropping the client closes the socket.
            Connection::Unauthenticated(_) | Connection::Closed => Ok(()),
        }
    }
}
