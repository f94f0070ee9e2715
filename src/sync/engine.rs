//! Run orchestration: acquire lock, select candidates, transfer each
//! attachment, record outcomes, release lock.
//!
//! Failures isolate to the smallest unit they originate in: a terminal
//! attachment failure never aborts the batch; a mailbox- or registry-level
//! fatal error aborts the remaining batch while still releasing the lock.
//! Ledger and log writes happen after each unit of work, so partial
//! progress survives a crash mid-run.

use chrono::Duration;
use sqlx::SqlitePool;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{LogRecorder, LogStatus};
use crate::error::Result;
use crate::ledger::ProcessedLedger;
use crate::lock::RunLock;
use crate::mailbox::{select_candidates, Attachment, MailMessage, MailSource};
use crate::registry::ServerRegistry;
use crate::webdav::Uploader;

use super::summary::{AttachmentOutcome, MessageOutcome, RunOutcome, RunSummary};

/// Placeholder server name for log entries written before a target was
/// selected.
const NO_SERVER: &str = "-";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub subject_keyword: String,
    pub max_attachment_bytes: u64,
    pub max_messages_per_run: usize,
    pub lock_ttl: Duration,
}

#[derive(Default)]
struct RunCounts {
    processed_messages: u32,
    uploaded: u32,
    skipped: u32,
    failed: u32,
}

pub struct SyncEngine<U: Uploader> {
    lock: RunLock,
    ledger: ProcessedLedger,
    registry: ServerRegistry,
    recorder: LogRecorder,
    uploader: U,
    settings: EngineSettings,
}

impl<U: Uploader> SyncEngine<U> {
    pub fn new(pool: SqlitePool, uploader: U, settings: EngineSettings) -> Self {
        Self {
            lock: RunLock::new(pool.clone()),
            ledger: ProcessedLedger::new(pool.clone()),
            registry: ServerRegistry::new(pool.clone()),
            recorder: LogRecorder::new(pool),
            uploader,
            settings,
        }
    }

    /// Execute one run.
    ///
    /// `connect` is only invoked once the lock is held, so a denied run
    /// never opens a mailbox session. The lock is released on every exit
    /// path; on a fatal mid-run error the partial counts are logged before
    /// the error surfaces to the caller.
    pub async fn run<M, F, Fut>(
        &self,
        connect: F,
        server_override: Option<&str>,
    ) -> Result<RunSummary>
    where
        M: MailSource,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M>>,
    {
        let holder_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        if !self
            .lock
            .acquire(&holder_id, self.settings.lock_ttl)
            .await?
        {
            info!("Another sync run is active; skipping this one");
            return Ok(RunSummary::skipped_busy());
        }

        let mut counts = RunCounts::default();
        let result = self
            .run_locked(connect, server_override, &mut counts)
            .await;

        if let Err(e) = self.lock.release(&holder_id).await {
            error!("Failed to release run lock: {}", e);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                let summary = RunSummary {
                    outcome: RunOutcome::Completed,
                    processed_messages: counts.processed_messages,
                    uploaded: counts.uploaded,
                    skipped: counts.skipped,
                    failed: counts.failed,
                    elapsed_ms,
                };
                info!(
                    "Run completed in {} ms: {} message(s) processed, {} uploaded, {} skipped, {} failed",
                    elapsed_ms,
                    summary.processed_messages,
                    summary.uploaded,
                    summary.skipped,
                    summary.failed
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(
                    "Run aborted after {} ms: {} ({} message(s) processed, {} uploaded, {} skipped, {} failed so far)",
                    elapsed_ms, e, counts.processed_messages, counts.uploaded, counts.skipped, counts.failed
                );
                Err(e)
            }
        }
    }

    async fn run_locked<M, F, Fut>(
        &self,
        connect: F,
        server_override: Option<&str>,
        counts: &mut RunCounts,
    ) -> Result<()>
    where
        M: MailSource,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M>>,
    {
        let mut source = connect().await?;

        let candidates = select_candidates(
            &mut source,
            &self.ledger,
            &self.settings.subject_keyword,
            self.settings.max_messages_per_run,
        )
        .await;

        let result = match candidates {
            Ok(candidates) if candidates.is_empty() => {
                info!(
                    "No candidate messages for keyword '{}'",
                    self.settings.subject_keyword
                );
                Ok(())
            }
            Ok(candidates) => {
                info!("Processing {} candidate message(s)", candidates.len());
                self.process_batch(&mut source, &candidates, server_override, counts)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = source.close().await {
            warn!("Mailbox logout failed: {}", e);
        }
        result
    }

    async fn process_batch<M: MailSource>(
        &self,
        source: &mut M,
        candidates: &[MailMessage],
        server_override: Option<&str>,
        counts: &mut RunCounts,
    ) -> Result<()> {
        for message in candidates {
            match self.process_message(message, server_override, counts).await? {
                MessageOutcome::Done { partial } => {
                    let outcome = if partial { "partial" } else { "completed" };
                    self.ledger.mark_processed(message.uid, outcome).await?;
                    counts.processed_messages += 1;

                    // The seen flag is best effort; the ledger entry above
                    // already prevents reprocessing.
                    if let Err(e) = source.mark_seen(message.uid).await {
                        warn!("Failed to mark uid {} seen: {}", message.uid, e);
                    }
                }
                MessageOutcome::RetryPending => {
                    info!(
                        "uid {} had transient failures; left unseen for a later run",
                        message.uid
                    );
                }
            }
        }
        Ok(())
    }

    async fn process_message(
        &self,
        message: &MailMessage,
        server_override: Option<&str>,
        counts: &mut RunCounts,
    ) -> Result<MessageOutcome> {
        info!(
            "Processing uid {} '{}' with {} attachment(s)",
            message.uid,
            message.subject,
            message.attachments.len()
        );

        let mut transient = false;
        let mut terminal = false;

        for attachment in &message.attachments {
            match self
                .process_attachment(attachment, server_override, counts)
                .await?
            {
                AttachmentOutcome::Uploaded | AttachmentOutcome::SkippedOversize => {}
                AttachmentOutcome::FailedTerminal => terminal = true,
                AttachmentOutcome::FailedTransient => transient = true,
            }
        }

        if transient {
            Ok(MessageOutcome::RetryPending)
        } else {
            Ok(MessageOutcome::Done { partial: terminal })
        }
    }

    async fn process_attachment(
        &self,
        attachment: &Attachment,
        server_override: Option<&str>,
        counts: &mut RunCounts,
    ) -> Result<AttachmentOutcome> {
        if attachment.size_bytes > self.settings.max_attachment_bytes {
            warn!(
                "Attachment '{}' exceeds size limit ({} > {} bytes); skipping",
                attachment.filename, attachment.size_bytes, self.settings.max_attachment_bytes
            );
            self.recorder
                .record(
                    &attachment.filename,
                    attachment.size_bytes,
                    NO_SERVER,
                    LogStatus::Skipped,
                    Some("exceeds size limit"),
                )
                .await?;
            counts.skipped += 1;
            return Ok(AttachmentOutcome::SkippedOversize);
        }

        let server = match server_override {
            Some(name) => self.registry.resolve_by_name(name).await?,
            None => self.registry.resolve_default().await?,
        };

        match self.uploader.upload(attachment, &server).await {
            Ok(remote_path) => {
                debug!("Attachment '{}' stored at {}", attachment.filename, remote_path);
                self.recorder
                    .record(
                        &attachment.filename,
                        attachment.size_bytes,
                        &server.name,
                        LogStatus::Success,
                        None,
                    )
                    .await?;
                counts.uploaded += 1;
                Ok(AttachmentOutcome::Uploaded)
            }
            Err(e) => {
                self.recorder
                    .record(
                        &attachment.filename,
                        attachment.size_bytes,
                        &server.name,
                        LogStatus::Failed,
                        Some(&e.to_string()),
                    )
                    .await?;
                counts.failed += 1;
                if e.is_transient() {
                    Ok(AttachmentOutcome::FailedTransient)
                } else {
                    Ok(AttachmentOutcome::FailedTerminal)
                }
            }
        }
    }
}
