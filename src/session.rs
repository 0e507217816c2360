//! Per-user entry-collection state machine.
//!
//! A [`SessionManager`] holds at most one in-progress entry per user and
//! advances it one turn at a time: amount, then category, then description.
//! The third turn finalizes the session into an [`EntryDraft`] for the
//! caller to commit — the manager itself never touches the ledger.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::config::EntryConfig;
use crate::ledger::EntryDraft;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdvanceError {
    /// No entry in progress for this user. Recoverable — the caller should
    /// prompt the user to begin one.
    #[error("no entry in progress for user {0}")]
    NotFound(i64),
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Outcome of feeding one turn of text into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceResult {
    /// The amount turn did not parse — session unchanged, ask again.
    RetryAmount,
    /// Amount stored; ask for a category next.
    PromptCategory { choices: Vec<String> },
    /// Category stored; ask for a description next.
    PromptDescription { choices: Vec<String> },
    /// Description stored; the session is gone and the draft is ready to
    /// commit.
    Finalized(EntryDraft),
}

// ── Session ───────────────────────────────────────────────────────────────────

/// In-progress entry for one user.
///
/// Fields fill strictly in order: `amount`, then `category`. The description
/// turn finalizes and removes the session in the same step, so a stored
/// session never carries a description.
#[derive(Debug, Default)]
struct Session {
    amount: Option<u64>,
    category: Option<String>,
}

// ── SessionManager ────────────────────────────────────────────────────────────

/// Owner of all in-progress sessions, keyed by user id.
///
/// The map lives behind a mutex held only for the (synchronous) duration of
/// each turn, so two concurrent turns for the same user cannot interleave
/// field writes. Turns for different users contend only on that brief lock.
pub struct SessionManager {
    /// Known users: chat id -> display name recorded as `person`.
    users: HashMap<i64, String>,
    categories: Vec<String>,
    descriptions: Vec<String>,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionManager {
    pub fn new(users: HashMap<i64, String>, entry: &EntryConfig) -> Self {
        Self {
            users,
            categories: entry.categories.clone(),
            descriptions: entry.descriptions.clone(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// `true` if `user_id` is in the known-user table.
    pub fn is_known(&self, user_id: i64) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Create (or silently replace) an empty session for `user_id`.
    /// A discarded prior session has no ledger effect.
    pub fn begin(&self, user_id: i64) {
        self.lock().insert(user_id, Session::default());
    }

    /// Remove the session for `user_id` if present. Idempotent.
    pub fn cancel(&self, user_id: i64) {
        self.lock().remove(&user_id);
    }

    /// `true` if `user_id` has an entry in progress.
    pub fn has_session(&self, user_id: i64) -> bool {
        self.lock().contains_key(&user_id)
    }

    /// Feed one turn of free text into the user's session.
    pub fn advance(&self, user_id: i64, text: &str) -> Result<AdvanceResult, AdvanceError> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(&user_id)
            .ok_or(AdvanceError::NotFound(user_id))?;

        match (session.amount, session.category.clone()) {
            (None, _) => match parse_amount(text) {
                Some(amount) => {
                    session.amount = Some(amount);
                    Ok(AdvanceResult::PromptCategory { choices: self.categories.clone() })
                }
                None => Ok(AdvanceResult::RetryAmount),
            },
            (Some(_), None) => {
                // Raw text, no validation — categories are free-form labels.
                session.category = Some(text.trim().to_string());
                Ok(AdvanceResult::PromptDescription { choices: self.descriptions.clone() })
            }
            (Some(amount), Some(category)) => {
                sessions.remove(&user_id);
                let person = self
                    .users
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| user_id.to_string());
                Ok(AdvanceResult::Finalized(EntryDraft {
                    amount,
                    category,
                    person,
                    description: text.trim().to_string(),
                }))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Session>> {
        // A poisoned map only means another turn panicked mid-update; the
        // per-field state is still coherent, so recover rather than abort.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse an amount turn: digits only, no signs, dots or separators.
fn parse_amount(text: &str) -> Option<u64> {
    let t = text.trim();
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    t.parse().ok()
}
