//! IMAP transport for the mailbox scanner.
//!
//! All fetches use BODY.PEEK so reading a message never sets its seen flag
//! implicitly; the engine marks messages seen explicitly, and only once
//! every attachment reached a terminal outcome.

use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ImapConfig;
use crate::error::{BridgeError, Result};

use super::extract::extract_attachments;
use super::scanner::MailSource;
use super::types::MailMessage;

type TlsSession = Session<TlsStream<TcpStream>>;

pub struct ImapMailbox {
    session: TlsSession,
    folder: String,
}

impl ImapMailbox {
    /// Connect, authenticate and select the configured folder.
    pub async fn connect(config: &ImapConfig) -> Result<Self> {
        info!("Connecting to IMAP server {}:{}", config.host, config.port);

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| BridgeError::Imap(format!("TCP connection failed: {}", e)))?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(&config.host, tcp)
            .await
            .map_err(|e| BridgeError::Imap(format!("TLS handshake failed: {}", e)))?;

        let client = async_imap::Client::new(tls_stream);

        let mut session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|(e, _)| BridgeError::MailboxAuth(e.to_string()))?;

        session
            .select(&config.folder)
            .await
            .map_err(|e| BridgeError::Imap(format!("SELECT failed: {}", e)))?;

        info!("Mailbox folder '{}' selected", config.folder);
        Ok(Self {
            session,
            folder: config.folder.clone(),
        })
    }
}

#[async_trait]
impl MailSource for ImapMailbox {
    /// All currently unseen messages, ascending by uid, attachments parsed.
    async fn fetch_unseen(&mut self) -> Result<Vec<MailMessage>> {
        let uids = self
            .session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| BridgeError::Imap(format!("SEARCH failed: {}", e)))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();

        if uid_list.is_empty() {
            debug!("No unseen messages in '{}'", self.folder);
            return Ok(Vec::new());
        }

        let uid_set = uid_list
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!("Fetching {} unseen message(s): {}", uid_list.len(), uid_set);

        let mut raw_messages = Vec::new();
        {
            let mut fetches = self
                .session
                .uid_fetch(&uid_set, "(UID INTERNALDATE BODY.PEEK[])")
                .await
                .map_err(|e| BridgeError::Imap(format!("FETCH failed: {}", e)))?;

            while let Some(fetch) = fetches.next().await {
                let fetch = fetch.map_err(|e| BridgeError::Imap(format!("FETCH failed: {}", e)))?;
                let uid = match fetch.uid {
                    Some(uid) => uid,
                    None => {
                        warn!("Fetched message without UID; skipping");
                        continue;
                    }
                };
                let body = match fetch.body() {
                    Some(body) => body.to_vec(),
                    None => {
                        warn!("Message uid {} has no body; skipping", uid);
                        continue;
                    }
                };
                let internal_date = fetch.internal_date().map(|d| d.with_timezone(&Utc));
                raw_messages.push((uid, internal_date, body));
            }
        }

        let mut messages = Vec::with_capacity(raw_messages.len());
        for (uid, internal_date, body) in raw_messages {
            match extract_attachments(&body) {
                Ok(parsed) => messages.push(MailMessage {
                    uid,
                    subject: parsed.subject,
                    received_at: internal_date.or(parsed.date),
                    attachments: parsed.attachments,
                }),
                Err(e) => {
                    warn!("Failed to parse message uid {}: {}", uid, e);
                }
            }
        }

        messages.sort_by_key(|m| m.uid);
        Ok(messages)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let mut responses = self
            .session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await
            .map_err(|e| BridgeError::Imap(format!("STORE failed: {}", e)))?;

        while responses.next().await.is_some() {}

        debug!("Marked uid {} as seen", uid);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| BridgeError::Imap(format!("LOGOUT failed: {}", e)))?;
        Ok(())
    }
}
