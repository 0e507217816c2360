//! Telegram channel — receives turns via the Telegram API, hands them to the
//! dispatcher, and delivers the reply back to the chat.

use std::env;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::InputFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, Reply};
use crate::error::AppError;
use crate::runtime::{Channel, ChannelFuture};

// ── Constants ────────────────────────────────────────────────────────────────

/// Telegram has a 4096 character limit per message.
/// We chunk at 4000 to be safe.
const MAX_MESSAGE_LENGTH: usize = 4000;

// ── TelegramChannel ──────────────────────────────────────────────────────────

/// A Telegram channel instance.
pub struct TelegramChannel {
    channel_id: String,
    dispatcher: Arc<Dispatcher>,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { channel_id: channel_id.into(), dispatcher }
    }
}

impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
        Box::pin(run_telegram(self.channel_id, self.dispatcher, shutdown))
    }
}

// ── run_telegram ─────────────────────────────────────────────────────────────

async fn run_telegram(
    channel_id: String,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let token = match env::var("TELEGRAM_BOT_TOKEN") {
        Ok(t) => t,
        Err(_) => {
            warn!(%channel_id, "TELEGRAM_BOT_TOKEN not set, telegram channel exiting");
            return Ok(());
        }
    };

    info!(%channel_id, "telegram channel starting");

    let bot = Bot::new(token);

    let dispatcher_clone = dispatcher.clone();
    let channel_id_clone = channel_id.clone();

    let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let dispatcher = dispatcher_clone.clone();
        let channel_id = channel_id_clone.clone();
        async move {
            if let Some(text) = msg.text() {
                debug!(%channel_id, chat_id = msg.chat.id.0, "telegram received message");

                let reply = dispatcher.handle(msg.chat.id.0, text).await;
                deliver(&bot, msg.chat.id, reply).await;
            }
            respond(())
        }
    });

    let mut tg_dispatcher = teloxide::dispatching::Dispatcher::builder(bot, handler).build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received — closing telegram channel");
        }
        _ = tg_dispatcher.dispatch() => {
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
        }
    }

    Ok(())
}

/// Deliver one reply to a chat. Failures are logged, never fatal to the
/// channel — the next turn gets a fresh chance.
async fn deliver(bot: &Bot, chat_id: ChatId, reply: Reply) {
    match reply {
        Reply::Text(text) => {
            let text = if text.is_empty() { "(empty reply)".to_string() } else { text };

            // Chunk at MAX_MESSAGE_LENGTH to stay under the Telegram limit.
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(MAX_MESSAGE_LENGTH) {
                let chunk_str: String = chunk.iter().collect();
                if let Err(e) = bot.send_message(chat_id, chunk_str).await {
                    warn!("failed to send telegram reply: {e}");
                }
            }
        }
        Reply::Document { filename, bytes } => {
            let file = InputFile::memory(bytes).file_name(filename);
            if let Err(e) = bot.send_document(chat_id, file).await {
                warn!("failed to send telegram document: {e}");
            }
        }
    }
}
