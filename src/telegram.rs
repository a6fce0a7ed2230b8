//! Telegram Bot integration for ConvertBot
//!
//! Long-polls Telegram and hands every update to the
//! [`CapabilityDispatcher`]. This module owns everything Telegram-specific:
//! downloading uploads, rendering keyboards, and sending results back.
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    net::Download,
    prelude::*,
    types::{FileMeta, InputFile, MessageId, Update},
};

use crate::artifacts::ArtifactStore;
use crate::capabilities::ExternalCapabilities;
use crate::channels::{Channel, ChannelError, OutgoingFile, ResponseButton};
use crate::config::Config;
use crate::dispatcher::{ButtonPress, CapabilityDispatcher, Inbound};
use crate::preflight::PreflightChecker;
use crate::telegram_ui::inline_keyboard;
use crate::verification::SqliteVerificationStore;

/// [`Channel`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn input_file(file: OutgoingFile) -> InputFile {
        InputFile::memory(file.bytes).file_name(file.file_name)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, ChannelError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0)
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn send_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Vec<Vec<ResponseButton>>,
    ) -> Result<i32, ChannelError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(inline_keyboard(buttons))
            .await
            .map(|msg| msg.id.0)
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), ChannelError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::EditFailed(e.to_string()))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChannelError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::DeleteFailed(e.to_string()))
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut req = self.bot.send_document(ChatId(chat_id), Self::input_file(file));
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await
            .map(|_| ())
            .map_err(|e| ChannelError::MediaUploadFailed(e.to_string()))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut req = self.bot.send_photo(ChatId(chat_id), Self::input_file(file));
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await
            .map(|_| ())
            .map_err(|e| ChannelError::MediaUploadFailed(e.to_string()))
    }

    async fn send_voice(
        &self,
        chat_id: i64,
        file: OutgoingFile,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut req = self.bot.send_voice(ChatId(chat_id), Self::input_file(file));
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await
            .map(|_| ())
            .map_err(|e| ChannelError::MediaUploadFailed(e.to_string()))
    }
}

/// Download a Telegram file into memory
async fn download(bot: Bot, meta: FileMeta) -> Result<Vec<u8>, ChannelError> {
    let file = bot
        .get_file(meta.id)
        .await
        .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;
    let mut dst = Vec::with_capacity(file.meta.size as usize);
    bot.download_file(&file.path, &mut dst)
        .await
        .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;
    Ok(dst)
}

/// Stable name for an upload without a file name of its own
fn file_ref(meta: &FileMeta) -> String {
    meta.unique_id.clone()
}

/// Run the Telegram bot
pub async fn run_telegram_bot(config: Config) -> Result<()> {
    tracing::info!("===========================================");
    tracing::info!("  ConvertBot Telegram - Starting...");
    tracing::info!("===========================================");
    tracing::info!("Scratch directory: {:?}", config.scratch_dir);
    tracing::info!("Verification ledger: {:?}", config.ledger_path);

    let artifacts = ArtifactStore::open(&config.scratch_dir)
        .with_context(|| format!("Failed to open scratch directory {:?}", config.scratch_dir))?;
    match artifacts.sweep() {
        Ok(0) => {}
        Ok(count) => tracing::info!("Removed {} leftover scratch files", count),
        Err(e) => tracing::warn!("Failed to sweep scratch directory: {}", e),
    }

    let ledger = SqliteVerificationStore::open(&config.ledger_path)?;
    let capabilities = ExternalCapabilities::from_config(&config, artifacts.clone())?;

    PreflightChecker::new(capabilities.runner().clone())
        .report()
        .await;

    let bot = Bot::new(&config.bot_token);

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!("Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    tracing::info!("Clearing webhook (if any)...");
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let channel = Arc::new(TelegramChannel::new(bot.clone()));
    let dispatcher = Arc::new(
        CapabilityDispatcher::new(Arc::new(ledger), artifacts, Arc::new(capabilities), channel)
            .with_onboarding_links(config.onboarding_links.clone()),
    );

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .endpoint(message_handler)
        )
        .branch(
            Update::filter_callback_query()
                .endpoint(callback_handler)
        );

    tracing::info!("Starting dispatcher with long polling...");
    tracing::info!("===========================================");
    tracing::info!("  Bot is now LIVE - send a file!");
    tracing::info!("===========================================");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in update handler"
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(
    bot: Bot,
    msg: Message,
    dispatcher: Arc<CapabilityDispatcher>,
) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let inbound = Inbound {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    };

    let outcome = if let Some(doc) = msg.document() {
        let file_name = doc
            .file_name
            .clone()
            .unwrap_or_else(|| "file".to_string());
        tracing::info!(">>> Document from user {}: {}", inbound.user_id, file_name);
        dispatcher
            .on_document(&inbound, &file_name, download(bot, doc.file.clone()))
            .await
    } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        tracing::info!(">>> Photo from user {}", inbound.user_id);
        let file_ref = file_ref(&photo.file);
        dispatcher
            .on_photo(&inbound, &file_ref, download(bot, photo.file.clone()))
            .await
    } else if let Some(video) = msg.video() {
        tracing::info!(">>> Video from user {}", inbound.user_id);
        let file_ref = file_ref(&video.file);
        dispatcher
            .on_video(&inbound, &file_ref, download(bot, video.file.clone()))
            .await
    } else if let Some(text) = msg.text() {
        let preview: String = text.chars().take(50).collect();
        tracing::info!(">>> Text from user {}: {:?}", inbound.user_id, preview);
        if let Some(command) = text.strip_prefix('/') {
            if command.split_whitespace().next() == Some("start") {
                dispatcher.on_start(&inbound).await
            } else {
                tracing::debug!("Ignoring command {:?}", text);
                return Ok(());
            }
        } else {
            dispatcher.on_text(&inbound, text).await
        }
    } else {
        tracing::debug!("Ignoring unsupported message from user {}", inbound.user_id);
        return Ok(());
    };

    tracing::debug!("Message {} handled: {:?}", inbound.message_id, outcome);
    Ok(())
}

/// Callback query handler for inline keyboard buttons
async fn callback_handler(
    bot: Bot,
    query: CallbackQuery,
    dispatcher: Arc<CapabilityDispatcher>,
) -> ResponseResult<()> {
    // Stop the button spinner before a possibly long conversion
    bot.answer_callback_query(&query.id).await?;

    let Some(token) = query.data.clone() else {
        return Ok(());
    };
    let user_id = query.from.id.0 as i64;
    let (chat_id, message_id) = match query.message.as_ref() {
        Some(m) => (m.chat().id.0, Some(m.id().0)),
        // Private chat ids equal user ids
        None => (user_id, None),
    };

    tracing::info!("Callback query: user={}, data={}", user_id, token);
    let press = ButtonPress {
        user_id,
        chat_id,
        message_id,
        token,
    };
    let outcome = dispatcher.on_button(&press).await;
    tracing::debug!("Callback handled: {:?}", outcome);
    Ok(())
}
