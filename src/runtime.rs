//! Channel runtime — shared scaffolding for transport channels.
//!
//! A [`Channel`] is an independently-runnable transport unit (Telegram today;
//! the design admits others). Channels capture their shared state (the
//! dispatcher `Arc`) at construction, then [`spawn_channels`] runs each one
//! as its own Tokio task. Any channel error cancels the shared
//! [`CancellationToken`] so siblings and the main loop shut down cleanly.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

// ── Channel ───────────────────────────────────────────────────────────────────

/// A boxed, owned future returned by [`Channel::run`].
pub type ChannelFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained, concurrently-runnable transport unit.
///
/// Implementors capture all shared state at construction time.
/// [`Channel::run`] is called once by [`spawn_channels`] and should run until
/// `shutdown` is cancelled or the channel's own work is done.
pub trait Channel: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the channel and return its async run-loop as a boxed future.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture;
}

// ── ChannelSetHandle ──────────────────────────────────────────────────────────

/// Handle to the running channel task set.
///
/// Returned by [`spawn_channels`]; `.join()` blocks until every channel has
/// exited and yields the first error, if any.
pub struct ChannelSetHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl ChannelSetHandle {
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Channel(format!("channel task panicked: {e}"))),
        }
    }
}

// ── spawn_channels ────────────────────────────────────────────────────────────

/// Spawn each [`Channel`] as an independent Tokio task.
///
/// Behaviour on error:
/// - If any channel returns `Err`, `shutdown` is cancelled so all siblings
///   receive the cancellation signal and stop cooperatively.
/// - The manager task drains the remaining channels and returns the first
///   error encountered.
pub fn spawn_channels(
    channels: Vec<Box<dyn Channel>>,
    shutdown: CancellationToken,
) -> ChannelSetHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for channel in channels {
            let id = channel.id().to_string();
            let shutdown = shutdown.clone();
            debug!(channel = %id, "spawning channel");
            set.spawn(channel.run(shutdown));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("channel panicked: {e}");
                    shutdown.cancel();
                    first_err
                        .get_or_insert_with(|| AppError::Channel(format!("channel panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("channel error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    ChannelSetHandle { inner: handle }
}
