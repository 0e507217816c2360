//! Dispatcher — routes inbound turns and commands into the core and renders
//! the core's structured results into outbound replies.
//!
//! This is the boundary layer: transport channels hand every inbound text to
//! [`Dispatcher::handle`] and deliver whatever [`Reply`] comes back. The
//! dispatcher owns the wired core (session manager, ledger store, write
//! serializer) and is the only path through which ledger mutation happens,
//! so the serializer gate cannot be bypassed.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use tracing::{error, warn};

use crate::ledger::{EntryDraft, LedgerStore, Totals};
use crate::serializer::WriteSerializer;
use crate::session::{AdvanceError, AdvanceResult, SessionManager};

// ── Reply ─────────────────────────────────────────────────────────────────────

/// An outbound reply for the channel to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Document { filename: String, bytes: Vec<u8> },
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    sessions: SessionManager,
    store: LedgerStore,
    serializer: WriteSerializer,
}

impl Dispatcher {
    pub fn new(sessions: SessionManager, store: LedgerStore) -> Self {
        Self {
            sessions,
            store,
            serializer: WriteSerializer::new(),
        }
    }

    /// Handle one inbound text from `user_id` and produce the reply.
    ///
    /// Unrecognized users are turned away here — they never reach the
    /// session layer and never touch the ledger.
    pub async fn handle(&self, user_id: i64, text: &str) -> Reply {
        if !self.sessions.is_known(user_id) {
            warn!(user_id, "turn from unknown user");
            return Reply::text("Sorry, I do not know who you are.");
        }

        match parse_command(text) {
            Some(("start", _)) => Reply::text("Welcome!"),
            Some(("add", _)) => self.begin_entry(user_id),
            Some(("cancel", _)) => self.cancel_entry(user_id),
            Some(("total", _)) => self.request_total().await,
            Some(("limit", args)) => self.set_monthly_limit(args).await,
            Some(("export", _)) => self.request_export().await,
            Some((other, _)) => {
                Reply::text(format!("Unknown command /{other}. I know /add, /cancel, /total, /limit and /export."))
            }
            None => self.submit_turn(user_id, text).await,
        }
    }

    /// Begin (or restart) an entry for `user_id`.
    pub fn begin_entry(&self, user_id: i64) -> Reply {
        self.sessions.begin(user_id);
        Reply::text("Please enter the amount you just spent")
    }

    /// Drop any in-progress entry. No ledger effect.
    pub fn cancel_entry(&self, user_id: i64) -> Reply {
        self.sessions.cancel(user_id);
        Reply::text("Okay, forgot everything")
    }

    /// Feed one free-text turn into the user's session; commit on the final
    /// turn.
    pub async fn submit_turn(&self, user_id: i64, text: &str) -> Reply {
        match self.sessions.advance(user_id, text) {
            Err(AdvanceError::NotFound(_)) => {
                Reply::text("No entry in progress — send /add to start one")
            }
            Ok(AdvanceResult::RetryAmount) => {
                Reply::text("Please enter a valid amount (digits only, no dots)")
            }
            Ok(AdvanceResult::PromptCategory { choices }) => {
                Reply::text(format!("Okay! Now select a category:\n{}", render_choices(&choices)))
            }
            Ok(AdvanceResult::PromptDescription { choices }) => {
                Reply::text(format!(
                    "Okay! Now write or select a description:\n{}",
                    render_choices(&choices)
                ))
            }
            Ok(AdvanceResult::Finalized(draft)) => self.commit(draft).await,
        }
    }

    /// Commit a finalized draft through the serializer gate.
    ///
    /// The session is already gone by this point: a backend failure here
    /// drops the draft and the user must re-enter it. Inherited behavior,
    /// kept deliberately — there is no retry or requeue.
    async fn commit(&self, draft: EntryDraft) -> Reply {
        let result = self
            .serializer
            .with_exclusive_access(self.store.append_entry(&draft))
            .await;

        match result {
            Ok(totals) => {
                let mut msg = format!("✅ Added! Total spent this month: {}", totals.total);
                if let Some(limit) = totals.limit {
                    msg.push_str(&format!(
                        "\nRemaining this month: {}",
                        limit.saturating_sub(totals.total)
                    ));
                }
                Reply::Text(msg)
            }
            Err(e) => {
                error!(error = %e, amount = draft.amount, person = %draft.person, "commit failed");
                Reply::text(format!("Error! Try again!\n{e}"))
            }
        }
    }

    /// Compose the total / limit / remaining-allowance message.
    pub async fn request_total(&self) -> Reply {
        let now = Local::now();
        match self.store.total_and_limit_at(now).await {
            Ok(totals) => Reply::Text(totals_message(totals, now)),
            Err(e) => {
                error!(error = %e, "total query failed");
                Reply::text(format!("Error! Try again!\n{e}"))
            }
        }
    }

    /// Overwrite this month's limit. `args` must be a non-negative integer.
    pub async fn set_monthly_limit(&self, args: &str) -> Reply {
        let Ok(value) = args.trim().parse::<u64>() else {
            return Reply::text("Usage: /limit <whole non-negative number>");
        };

        let result = self
            .serializer
            .with_exclusive_access(self.store.set_limit(value))
            .await;

        match result {
            Ok(()) => Reply::text(format!("Monthly limit set to {value}")),
            Err(e) => {
                error!(error = %e, value, "limit update failed");
                Reply::text(format!("Error! Try again!\n{e}"))
            }
        }
    }

    /// Export the current month's partition as a document.
    pub async fn request_export(&self) -> Reply {
        match self.store.export_partition().await {
            Ok((partition, bytes)) => Reply::Document {
                filename: format!("{partition}.pdf"),
                bytes,
            },
            Err(e) => {
                error!(error = %e, "export failed");
                Reply::text(format!("Error! Try again!\n{e}"))
            }
        }
    }
}

// ── Command parsing ───────────────────────────────────────────────────────────

/// Split `/cmd args` into `("cmd", "args")`. Returns `None` for plain text.
/// A `@BotName` suffix on the command (group-chat syntax) is stripped.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (cmd, args) = match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (rest, ""),
    };
    let cmd = cmd.split('@').next().unwrap_or(cmd);
    Some((cmd, args))
}

fn render_choices(choices: &[String]) -> String {
    choices.join(", ")
}

// ── Allowance math ────────────────────────────────────────────────────────────

fn totals_message(totals: Totals, now: DateTime<Local>) -> String {
    let mut msg = format!("Total spent this month: {}", totals.total);
    match totals.limit {
        Some(limit) => {
            let days = days_remaining_in_month(now.date_naive());
            let (remaining, per_day) = allowance(totals.total, limit, days);
            msg.push_str(&format!(
                "\nLimit: {limit}\nRemaining: {remaining} ({per_day} per day for the next {days} days)"
            ));
        }
        None => msg.push_str("\nNo limit set for this month"),
    }
    msg
}

/// Remaining allowance and its per-day share over the rest of the month.
fn allowance(total: u64, limit: u64, days_remaining: u32) -> (u64, u64) {
    let remaining = limit.saturating_sub(total);
    let per_day = match days_remaining {
        0 => remaining,
        d => remaining / d as u64,
    };
    (remaining, per_day)
}

/// Days from `date` (inclusive) through the last day of its month (inclusive).
fn days_remaining_in_month(date: NaiveDate) -> u32 {
    let (year, month) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    let first_of_next = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first of month is always a valid date");
    (first_of_next - date).num_days() as u32
}
