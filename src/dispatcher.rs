//! Capability Dispatcher
//!
//! Turns inbound chat events into session changes, capability calls and
//! replies. Every entry point runs the same preconditions in order:
//!
//! 1. Verification gate: unverified users get the onboarding prompt and
//!    nothing else happens (the acknowledgment button is the only exception).
//! 2. Per-user permit: a second event for a user with one in flight is
//!    answered with a busy notice.
//! 3. For button presses: a held upload that still exists, then a token the
//!    upload's menu actually offers.
//!
//! Once a capability is invoked, its input and output are disposed on every
//! path, success or failure.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use crate::capabilities::wiki::seed_query;
use crate::capabilities::{
    CapabilityError, CapabilityOutput, CapabilityResult, Capabilities, PdfSource,
};
use crate::channels::{Channel, ChannelError, OutgoingFile};
use crate::config::OnboardingLink;
use crate::intent::{PageRange, TextAction, TextIntent};
use crate::menu::{build_menu, offers, Action, Conversion, FileCategory, VERIFY_TOKEN};
use crate::session::{CurrentArtifact, DispatchPermit, SessionStore};
use crate::telegram_ui::{self, menu_keyboard, onboarding_keyboard};
use crate::verification::VerificationStore;

/// A user message (text or upload)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
}

/// An inline button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPress {
    pub user_id: i64,
    pub chat_id: i64,
    /// Message carrying the pressed button, when still accessible
    pub message_id: Option<i32>,
    pub token: String,
}

/// How an event was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Welcome,
    Onboarding,
    Verified,
    Busy,
    /// Upload stored and a menu with this many entries shown
    MenuOffered(usize),
    /// Upload stored, no menu for its category
    Stored,
    MissingArtifact,
    InvalidAction,
    SplitHint,
    /// This many files sent
    Delivered(usize),
    /// Text result sent
    Replied,
    /// Capability failed; the message was shown to the user
    Failed(String),
    /// Capability succeeded but the result could not be sent
    Undelivered(String),
}

enum Delivery {
    Text,
    Files(usize),
}

#[derive(Clone, Copy)]
enum MediaKind {
    Document,
    Photo,
    Voice,
}

pub struct CapabilityDispatcher {
    verification: Arc<dyn VerificationStore>,
    sessions: SessionStore,
    artifacts: ArtifactStore,
    capabilities: Arc<dyn Capabilities>,
    channel: Arc<dyn Channel>,
    onboarding_links: Vec<OnboardingLink>,
}

impl CapabilityDispatcher {
    pub fn new(
        verification: Arc<dyn VerificationStore>,
        artifacts: ArtifactStore,
        capabilities: Arc<dyn Capabilities>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            verification,
            sessions: SessionStore::new(),
            artifacts,
            capabilities,
            channel,
            onboarding_links: Vec::new(),
        }
    }

    pub fn with_onboarding_links(mut self, links: Vec<OnboardingLink>) -> Self {
        self.onboarding_links = links;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ============ Entry Points ============

    /// `/start`
    pub async fn on_start(&self, inbound: &Inbound) -> DispatchOutcome {
        if !self.is_verified(inbound.user_id) {
            return self.present_onboarding(inbound.chat_id).await;
        }
        self.send(inbound.chat_id, telegram_ui::WELCOME).await;
        DispatchOutcome::Welcome
    }

    /// Free text: page range, URL, or QR/speech fallback
    pub async fn on_text(&self, inbound: &Inbound, text: &str) -> DispatchOutcome {
        if !self.is_verified(inbound.user_id) {
            return self.present_onboarding(inbound.chat_id).await;
        }
        let Some(permit) = self.sessions.try_begin(inbound.user_id) else {
            return self.busy(inbound.chat_id).await;
        };

        let holds_pdf = permit
            .current()
            .map(|c| c.category.is_paginated() && c.path.exists())
            .unwrap_or(false);
        let origin = inbound.message_id.to_string();
        let action = TextIntent::classify(text).resolve(holds_pdf);
        tracing::info!("Text from user {}: {:?}", inbound.user_id, action);

        match action {
            TextAction::SplitPages(range) => self.split(&permit, inbound, range).await,
            TextAction::CaptureUrl(url) => {
                let status = self.post_status(inbound.chat_id, telegram_ui::CAPTURING).await;
                let result = self.capabilities.render_url_to_pdf(&url, &origin).await;
                self.deliver(inbound.chat_id, status, result, None).await
            }
            TextAction::QrCode(text) => {
                let result = self.capabilities.make_qr_image(&text, &origin).await;
                self.deliver(inbound.chat_id, None, result, Some(telegram_ui::CAPTION_QR))
                    .await
            }
            TextAction::Speech(text) => {
                let status = self.post_status(inbound.chat_id, telegram_ui::SPEAKING).await;
                let result = self.capabilities.synthesize_speech(&text, &origin).await;
                self.deliver(inbound.chat_id, status, result, Some(telegram_ui::CAPTION_AUDIO))
                    .await
            }
        }
    }

    /// Uploaded document. `fetch` downloads the content and is only awaited
    /// once the user passed the gate.
    pub async fn on_document<F>(&self, inbound: &Inbound, file_name: &str, fetch: F) -> DispatchOutcome
    where
        F: Future<Output = Result<Vec<u8>, ChannelError>> + Send,
    {
        self.store_upload(inbound, ArtifactKind::Document, file_name, fetch).await
    }

    /// Uploaded photo, named after the transport's file reference
    pub async fn on_photo<F>(&self, inbound: &Inbound, file_ref: &str, fetch: F) -> DispatchOutcome
    where
        F: Future<Output = Result<Vec<u8>, ChannelError>> + Send,
    {
        let file_name = format!("{}.jpg", file_ref);
        self.store_upload(inbound, ArtifactKind::Photo, &file_name, fetch).await
    }

    /// Uploaded video, named after the transport's file reference
    pub async fn on_video<F>(&self, inbound: &Inbound, file_ref: &str, fetch: F) -> DispatchOutcome
    where
        F: Future<Output = Result<Vec<u8>, ChannelError>> + Send,
    {
        let file_name = format!("{}.mp4", file_ref);
        self.store_upload(inbound, ArtifactKind::Video, &file_name, fetch).await
    }

    /// Inline button press
    pub async fn on_button(&self, press: &ButtonPress) -> DispatchOutcome {
        if press.token == VERIFY_TOKEN {
            return self.acknowledge(press).await;
        }
        if !self.is_verified(press.user_id) {
            return self.present_onboarding(press.chat_id).await;
        }
        let Some(permit) = self.sessions.try_begin(press.user_id) else {
            return self.busy(press.chat_id).await;
        };

        let current = match permit.current() {
            Some(current) if current.path.exists() => current,
            Some(current) => {
                tracing::warn!("Held upload vanished: {}", current.path.display());
                permit.take();
                return self.missing(press.chat_id, press.message_id).await;
            }
            None => return self.missing(press.chat_id, press.message_id).await,
        };

        let action = match Action::decode(&press.token) {
            Some(action) if offers(current.category, action) => action,
            _ => {
                tracing::warn!(
                    "Rejected token {:?} for {:?} upload of user {}",
                    press.token,
                    current.category,
                    press.user_id
                );
                // A rejected token still ends the attempt on this upload
                if let Some(previous) = permit.take() {
                    self.release_upload(previous);
                }
                self.reply(press.chat_id, press.message_id, telegram_ui::INVALID_ACTION)
                    .await;
                return DispatchOutcome::InvalidAction;
            }
        };

        let conversion = match action {
            Action::SplitHint => {
                self.reply(press.chat_id, press.message_id, telegram_ui::SPLIT_HINT)
                    .await;
                return DispatchOutcome::SplitHint;
            }
            Action::Convert(conversion) => conversion,
        };

        permit.take();
        let Some(input) = self.artifacts.adopt(current.path.clone(), current.kind) else {
            return self.missing(press.chat_id, press.message_id).await;
        };

        tracing::info!(
            "Running {} for user {} on {}",
            conversion_token(conversion),
            press.user_id,
            current.file_name
        );
        let status = self
            .status_for(press.chat_id, press.message_id, telegram_ui::PROCESSING)
            .await;
        let result = self.convert(conversion, &input, &current).await;
        let outcome = self
            .deliver(press.chat_id, status, result, Some(telegram_ui::CAPTION_CONVERTED))
            .await;
        input.dispose();
        tracing::info!(
            "Finished {} for user {}: {:?}",
            conversion_token(conversion),
            press.user_id,
            outcome
        );
        outcome
    }

    // ============ Preconditions ============

    fn is_verified(&self, user_id: i64) -> bool {
        match self.verification.is_verified(user_id) {
            Ok(verified) => verified,
            Err(e) => {
                tracing::error!("Verification lookup failed for user {}: {}", user_id, e);
                false
            }
        }
    }

    async fn present_onboarding(&self, chat_id: i64) -> DispatchOutcome {
        let buttons = onboarding_keyboard(&self.onboarding_links);
        if let Err(e) = self
            .channel
            .send_buttons(chat_id, telegram_ui::ONBOARDING, buttons)
            .await
        {
            tracing::warn!("Failed to send onboarding prompt to {}: {}", chat_id, e);
        }
        DispatchOutcome::Onboarding
    }

    async fn acknowledge(&self, press: &ButtonPress) -> DispatchOutcome {
        match self.verification.mark_verified(press.user_id) {
            Ok(()) => {
                tracing::info!("User {} verified", press.user_id);
                self.reply(press.chat_id, press.message_id, telegram_ui::VERIFIED)
                    .await;
                DispatchOutcome::Verified
            }
            Err(e) => {
                tracing::error!("Failed to record verification for {}: {}", press.user_id, e);
                self.reply(press.chat_id, press.message_id, telegram_ui::VERIFY_FAILED)
                    .await;
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Always a new message, so a pressed menu stays usable afterwards
    async fn busy(&self, chat_id: i64) -> DispatchOutcome {
        tracing::debug!("Chat {} busy, rejecting event", chat_id);
        self.send(chat_id, telegram_ui::BUSY).await;
        DispatchOutcome::Busy
    }

    async fn missing(&self, chat_id: i64, message_id: Option<i32>) -> DispatchOutcome {
        self.reply(chat_id, message_id, telegram_ui::MISSING_ARTIFACT)
            .await;
        DispatchOutcome::MissingArtifact
    }

    // ============ Uploads ============

    async fn store_upload<F>(
        &self,
        inbound: &Inbound,
        kind: ArtifactKind,
        file_name: &str,
        fetch: F,
    ) -> DispatchOutcome
    where
        F: Future<Output = Result<Vec<u8>, ChannelError>> + Send,
    {
        if !self.is_verified(inbound.user_id) {
            return self.present_onboarding(inbound.chat_id).await;
        }
        let Some(permit) = self.sessions.try_begin(inbound.user_id) else {
            return self.busy(inbound.chat_id).await;
        };

        let bytes = match fetch.await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Download failed for user {}: {}", inbound.user_id, e);
                self.send(inbound.chat_id, telegram_ui::DOWNLOAD_FAILED).await;
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        let origin = inbound.message_id.to_string();
        let artifact = match self.artifacts.acquire(kind, &origin, file_name, &bytes).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!("Failed to store upload {}: {}", file_name, e);
                self.send(inbound.chat_id, telegram_ui::DOWNLOAD_FAILED).await;
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        let category = FileCategory::detect(kind, file_name);
        let current = CurrentArtifact {
            path: artifact.into_path(),
            kind,
            category,
            file_name: file_name.to_string(),
            message_id: inbound.message_id,
        };
        if let Some(previous) = permit.replace(current) {
            self.release_upload(previous);
        }
        tracing::info!(
            "Stored upload from user {}: {} ({:?}, {} bytes)",
            inbound.user_id,
            file_name,
            category,
            bytes.len()
        );

        let menu = build_menu(category);
        if menu.is_empty() {
            return DispatchOutcome::Stored;
        }
        if let Err(e) = self
            .channel
            .send_buttons(inbound.chat_id, &category.menu_title(file_name), menu_keyboard(&menu))
            .await
        {
            tracing::warn!("Failed to send menu to {}: {}", inbound.chat_id, e);
        }
        DispatchOutcome::MenuOffered(menu.len())
    }

    /// Dispose an upload that left the session slot without being used
    fn release_upload(&self, previous: CurrentArtifact) {
        if let Some(artifact) = self.artifacts.adopt(previous.path, previous.kind) {
            artifact.dispose();
        }
    }

    // ============ Capabilities ============

    async fn split(
        &self,
        permit: &DispatchPermit<'_>,
        inbound: &Inbound,
        range: PageRange,
    ) -> DispatchOutcome {
        let Some(current) = permit.take() else {
            return self.missing(inbound.chat_id, None).await;
        };
        let Some(input) = self.artifacts.adopt(current.path, current.kind) else {
            return self.missing(inbound.chat_id, None).await;
        };

        let status = self
            .post_status(inbound.chat_id, &telegram_ui::extracting_pages(range.start, range.end))
            .await;
        let origin = inbound.message_id.to_string();
        let result = self.extract_pages(input.path(), range, &origin).await;
        let outcome = self
            .deliver(inbound.chat_id, status, result, Some(telegram_ui::CAPTION_PAGES))
            .await;
        input.dispose();
        outcome
    }

    async fn extract_pages(&self, input: &Path, range: PageRange, origin: &str) -> CapabilityResult {
        let page_count = self.capabilities.page_count(input).await?;
        let span = range.clamp(page_count).ok_or(CapabilityError::EmptyPageRange {
            start: range.start,
            end: range.end,
            page_count,
        })?;
        self.capabilities.split_pages(input, span, origin).await
    }

    async fn convert(
        &self,
        conversion: Conversion,
        input: &Artifact,
        current: &CurrentArtifact,
    ) -> CapabilityResult {
        let path = input.path();
        let caps = &self.capabilities;
        match conversion {
            Conversion::PdfToWord => caps.to_word_document(path).await,
            Conversion::WikiSummary => {
                let fallback = Path::new(&current.file_name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&current.file_name)
                    .to_string();
                let seed = match caps.first_page_text(path).await {
                    Ok(text) => seed_query(&text, &fallback),
                    Err(e) => {
                        tracing::debug!("No first-page text ({}), using file name", e);
                        fallback
                    }
                };
                caps.summarize_topic(&seed).await
            }
            Conversion::PdfToImages => caps.to_images(path).await,
            Conversion::CompressPdf => caps.compress(path).await,
            Conversion::WordToPdf => caps.to_pdf(path, PdfSource::WordDocument).await,
            Conversion::ImageToPdf => caps.to_pdf(path, PdfSource::Image).await,
            Conversion::Ocr => caps.ocr_text(path).await,
            Conversion::RemoveBackground => caps.remove_background(path).await,
            Conversion::StripMetadata => caps.strip_image_metadata(path).await,
            Conversion::ToPng => caps.to_png(path).await,
            Conversion::ToSticker => caps.to_sticker(path).await,
            Conversion::ToGif => caps.to_gif(path).await,
            Conversion::ToMp3 => caps.extract_audio(path).await,
        }
    }

    // ============ Delivery ============

    /// Send a capability result and clean up the status message.
    /// Output artifacts are disposed whether or not sending succeeds.
    async fn deliver(
        &self,
        chat_id: i64,
        status: Option<i32>,
        result: CapabilityResult,
        caption: Option<&str>,
    ) -> DispatchOutcome {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Capability failed for chat {}: {}", chat_id, e);
                self.reply(chat_id, status, &telegram_ui::conversion_failed(&e.to_string()))
                    .await;
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        match self.send_output(chat_id, output, caption).await {
            Ok(delivery) => {
                if let Some(message_id) = status {
                    if let Err(e) = self.channel.delete_message(chat_id, message_id).await {
                        tracing::debug!("Failed to remove status message: {}", e);
                    }
                }
                match delivery {
                    Delivery::Text => DispatchOutcome::Replied,
                    Delivery::Files(count) => DispatchOutcome::Delivered(count),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to deliver result to chat {}: {}", chat_id, e);
                self.reply(chat_id, status, &telegram_ui::delivery_failed(&e.to_string()))
                    .await;
                DispatchOutcome::Undelivered(e.to_string())
            }
        }
    }

    async fn send_output(
        &self,
        chat_id: i64,
        output: CapabilityOutput,
        caption: Option<&str>,
    ) -> Result<Delivery, ChannelError> {
        match output {
            CapabilityOutput::Text(text) => {
                self.channel.send_text(chat_id, &text).await?;
                Ok(Delivery::Text)
            }
            CapabilityOutput::Document(artifact) => {
                self.send_artifact(chat_id, artifact, MediaKind::Document, caption)
                    .await?;
                Ok(Delivery::Files(1))
            }
            CapabilityOutput::Photo(artifact) => {
                self.send_artifact(chat_id, artifact, MediaKind::Photo, caption)
                    .await?;
                Ok(Delivery::Files(1))
            }
            CapabilityOutput::Voice(artifact) => {
                self.send_artifact(chat_id, artifact, MediaKind::Voice, caption)
                    .await?;
                Ok(Delivery::Files(1))
            }
            CapabilityOutput::Photos(pages) => {
                let count = pages.len();
                // Pages not yet sent are dropped, and so disposed, on failure
                for page in pages {
                    self.send_artifact(chat_id, page, MediaKind::Photo, None).await?;
                }
                Ok(Delivery::Files(count))
            }
        }
    }

    async fn send_artifact(
        &self,
        chat_id: i64,
        artifact: Artifact,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let result = match tokio::fs::read(artifact.path()).await {
            Ok(bytes) => {
                let file = OutgoingFile {
                    file_name: artifact.file_name(),
                    bytes,
                };
                match kind {
                    MediaKind::Document => self.channel.send_document(chat_id, file, caption).await,
                    MediaKind::Photo => self.channel.send_photo(chat_id, file, caption).await,
                    MediaKind::Voice => self.channel.send_voice(chat_id, file, caption).await,
                }
            }
            Err(e) => Err(ChannelError::MediaUploadFailed(format!(
                "{}: {}",
                artifact.path().display(),
                e
            ))),
        };
        artifact.dispose();
        result
    }

    // ============ Messaging ============

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.channel.send_text(chat_id, text).await {
            tracing::warn!("Failed to send message to {}: {}", chat_id, e);
        }
    }

    /// Post a progress message, returning its id for later cleanup
    async fn post_status(&self, chat_id: i64, text: &str) -> Option<i32> {
        match self.channel.send_text(chat_id, text).await {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                tracing::warn!("Failed to post status to {}: {}", chat_id, e);
                None
            }
        }
    }

    /// Turn the pressed menu into a progress message, or post a new one
    async fn status_for(&self, chat_id: i64, message_id: Option<i32>, text: &str) -> Option<i32> {
        if let Some(message_id) = message_id {
            match self.channel.edit_text(chat_id, message_id, text).await {
                Ok(()) => return Some(message_id),
                Err(e) => tracing::debug!("Could not edit menu: {}", e),
            }
        }
        self.post_status(chat_id, text).await
    }

    /// Replace `message_id`'s text when given, otherwise send a new message
    async fn reply(&self, chat_id: i64, message_id: Option<i32>, text: &str) {
        if let Some(message_id) = message_id {
            match self.channel.edit_text(chat_id, message_id, text).await {
                Ok(()) => return,
                Err(e) => tracing::debug!("Could not edit message {}: {}", message_id, e),
            }
        }
        self.send(chat_id, text).await;
    }
}

fn conversion_token(conversion: Conversion) -> &'static str {
    Action::Convert(conversion).token()
}
