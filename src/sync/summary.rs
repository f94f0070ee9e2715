use serde::Serialize;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Another holder's lock was live; no work was attempted.
    SkippedBusy,
}

/// Terminal state of one attachment within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOutcome {
    Uploaded,
    SkippedOversize,
    /// Not retryable; does not block the message from being marked
    /// processed.
    FailedTerminal,
    /// Retries exhausted on a transient condition; the whole message stays
    /// eligible for a later run.
    FailedTransient,
}

/// Terminal state of one message within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Every attachment reached a terminal outcome; ledger and seen flag
    /// are updated. `partial` records whether any attachment failed
    /// terminally.
    Done { partial: bool },
    /// At least one attachment failed transiently; left unseen and
    /// unledgered.
    RetryPending,
}

/// What one run accomplished, reported to the caller and the log.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub processed_messages: u32,
    pub uploaded: u32,
    pub skipped: u32,
    pub failed: u32,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn skipped_busy() -> Self {
        Self {
            outcome: RunOutcome::SkippedBusy,
            processed_messages: 0,
            uploaded: 0,
            skipped: 0,
            failed: 0,
            elapsed_ms: 0,
        }
    }
}
