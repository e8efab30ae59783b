//! Conversation state for one interactive session.
//!
//! The running turn is the only writer of the transcript; the UI reads
//! snapshots through a [`TranscriptView`].

use crate::agent::{Agent, TurnOutcome};
use crate::signal::{UpdateSignal, Updates};
use ca_llm::{HistoryEntry, Role};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Entries = Arc<RwLock<Vec<HistoryEntry>>>;

/// Append-mostly history owned by the agent loop. Only the last entry can
/// be rewritten.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Entries,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the new entry.
    pub fn push(&self, entry: HistoryEntry) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry);
        entries.len() - 1
    }

    /// Replaces the last entry, or appends when the transcript is empty.
    pub fn set_last(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.last_mut() {
            Some(last) => *last = entry,
            None => entries.push(entry),
        }
    }

    /// Entries `[0, end)`.
    pub fn prefix(&self, end: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries[..end.min(entries.len())].to_vec()
    }

    pub fn last(&self) -> Option<HistoryEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.last().cloned()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn view(&self) -> TranscriptView {
        TranscriptView {
            entries: self.entries.clone(),
        }
    }
}

/// Read-only handle for renderers.
#[derive(Debug, Clone)]
pub struct TranscriptView {
    entries: Entries,
}

impl TranscriptView {
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human, AI and tool entry counts, in that order.
    pub fn role_counts(&self) -> (usize, usize, usize) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .fold((0, 0, 0), |(h, a, t), entry| match entry.role() {
                Role::Human => (h + 1, a, t),
                Role::Ai => (h, a + 1, t),
                Role::Tool => (h, a, t + 1),
            })
    }
}

/// A turn running in the background.
pub struct TurnHandle {
    pub updates: Updates,
    cancel: CancellationToken,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Cancelling the token stops the loop at its next await point; the
    /// reason is recorded in the transcript.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn finish(self) -> TurnOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "agent turn task failed");
                TurnOutcome::Aborted(format!("agent turn task failed: {e}"))
            }
        }
    }
}

pub struct Session {
    pub id: Uuid,
    agent: Arc<Agent>,
    transcript: Transcript,
    turn_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent,
            transcript: Transcript::new(),
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn view(&self) -> TranscriptView {
        self.transcript.view()
    }

    /// Starts a turn for `user_text`. Turns queue behind each other, so the
    /// transcript only ever has one writer.
    pub fn invoke(&self, user_text: impl Into<String>) -> TurnHandle {
        let (signal, updates) = UpdateSignal::channel();
        let cancel = CancellationToken::new();
        let agent = self.agent.clone();
        let transcript = self.transcript.clone();
        let turn_lock = self.turn_lock.clone();
        let token = cancel.clone();
        let user_text = user_text.into();
        let session_id = self.id;

        let task = tokio::spawn(async move {
            let _turn = turn_lock.lock().await;
            let outcome = agent.run_turn(&transcript, user_text, &signal, &token).await;
            tracing::info!(
                %session_id,
                updates = signal.generation(),
                outcome = ?outcome,
                "turn finished"
            );
            outcome
        });

        TurnHandle {
            updates,
            cancel,
            task,
        }
    }

    /// Waits for any running turn, then clears the history.
    pub async fn reset(&mut self) {
        let _turn = self.turn_lock.lock().await;
        self.transcript.clear();
        self.id = Uuid::new_v4();
    }
}
