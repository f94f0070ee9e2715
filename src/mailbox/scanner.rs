//! Candidate selection over a mailbox transport.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::ledger::ProcessedLedger;

use super::types::MailMessage;

/// Transport seam for the scanner; the production implementation speaks
/// IMAP, tests substitute an in-memory mailbox.
#[async_trait]
pub trait MailSource: Send {
    /// All currently unseen messages, ascending by uid. A finite snapshot
    /// of live mailbox state; not restartable.
    async fn fetch_unseen(&mut self) -> Result<Vec<MailMessage>>;

    /// Set the seen flag on one message.
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// End the mailbox session.
    async fn close(&mut self) -> Result<()>;
}

/// Select up to `limit` candidate messages: unseen, subject containing the
/// keyword case-insensitively, and not already present in the ledger.
///
/// Older mail comes first, so a size-bounded batch makes forward progress
/// under sustained load instead of starving.
pub async fn select_candidates<M: MailSource>(
    source: &mut M,
    ledger: &ProcessedLedger,
    keyword: &str,
    limit: usize,
) -> Result<Vec<MailMessage>> {
    let unseen = source.fetch_unseen().await?;
    let total = unseen.len();

    let needle = keyword.to_lowercase();
    let mut candidates = Vec::new();

    for message in unseen {
        if candidates.len() >= limit {
            break;
        }
        if !message.subject.to_lowercase().contains(&needle) {
            continue;
        }
        // The ledger outranks the mailbox's seen flag: a message whose flag
        // update never persisted must still be filtered out here.
        if ledger.contains(message.uid).await? {
            debug!("uid {} already in ledger; skipping", message.uid);
            continue;
        }
        candidates.push(message);
    }

    debug!(
        "Selected {} candidate(s) of {} unseen message(s)",
        candidates.len(),
        total
    );
    Ok(candidates)
}
