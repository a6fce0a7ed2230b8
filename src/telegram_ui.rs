//! Telegram UI Components
//!
//! Inline keyboards and the fixed reply texts shown to users.

use crate::channels::ResponseButton;
use crate::config::OnboardingLink;
use crate::menu::{MenuEntry, VERIFY_TOKEN};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ============ Reply Texts ============

pub const WELCOME: &str = "🚀 Welcome to the Ultimate Converter!\n\n\
    The bot is fully unlocked! Send me any file, image, or link to begin.";

pub const ONBOARDING: &str = "🔒 Verification Required!\n\n\
    To use this bot for free forever, please follow and subscribe to the profiles below.\n\n\
    Once done, press the verify button to unlock all features!";

pub const VERIFIED: &str = "🎉 Welcome to the Family!\n\n\
    You are now verified. All features are unlocked! Send me a file to start converting.";

pub const VERIFY_FAILED: &str = "⚠️ Verification could not be saved. Please try again in a moment.";

pub const MISSING_ARTIFACT: &str = "⚠️ File missing. Please upload the file again.";

pub const INVALID_ACTION: &str = "⚠️ That option is not available for your current file. Please pick one from the latest menu.";

pub const BUSY: &str = "⏳ Still working on your previous request. Please wait until it finishes.";

pub const SPLIT_HINT: &str = "✂️ PDF Splitter: send the page range like 1-5 to extract those pages.";

pub const PROCESSING: &str = "Processing your request... ⚙️";

pub const CAPTURING: &str = "Capturing webpage... 🌐";

pub const SPEAKING: &str = "Converting text to speech... 🗣️";

pub const DOWNLOAD_FAILED: &str = "⚠️ Could not receive your file. Please send it again.";

pub const CAPTION_CONVERTED: &str = "Here is your converted file! ✅";

pub const CAPTION_PAGES: &str = "Pages extracted! ✅";

pub const CAPTION_AUDIO: &str = "Here is your audio! 🎙️";

pub const CAPTION_QR: &str = "QR Code Generation Success! 🔳";

pub fn extracting_pages(start: usize, end: usize) -> String {
    format!("Extracting pages {} to {}... ✂️", start, end)
}

pub fn conversion_failed(error: &str) -> String {
    format!("❌ Error during conversion: {}", error)
}

pub fn delivery_failed(error: &str) -> String {
    format!("❌ Could not send the result: {}", error)
}

// ============ Inline Keyboards ============

/// Conversion menu, two buttons per row
pub fn menu_keyboard(entries: &[MenuEntry]) -> Vec<Vec<ResponseButton>> {
    entries
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|entry| ResponseButton::callback(entry.label, entry.token()))
                .collect()
        })
        .collect()
}

/// Follow links, one per row, then the acknowledgment button
pub fn onboarding_keyboard(links: &[OnboardingLink]) -> Vec<Vec<ResponseButton>> {
    let mut rows: Vec<Vec<ResponseButton>> = links
        .iter()
        .map(|link| vec![ResponseButton::link(&link.label, &link.url)])
        .collect();
    rows.push(vec![ResponseButton::callback(
        "✅ I HAVE FOLLOWED & SUBSCRIBED",
        VERIFY_TOKEN,
    )]);
    rows
}

/// Render buttons as a Telegram inline keyboard. Buttons with an
/// unparseable URL are skipped.
pub fn inline_keyboard(rows: Vec<Vec<ResponseButton>>) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = rows
        .into_iter()
        .map(|row| row.into_iter().filter_map(inline_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn inline_button(button: ResponseButton) -> Option<InlineKeyboardButton> {
    if let Some(data) = button.callback_data {
        return Some(InlineKeyboardButton::callback(button.text, data));
    }
    let url = button.url?;
    match reqwest::Url::parse(&url) {
        Ok(url) => Some(InlineKeyboardButton::url(button.text, url)),
        Err(e) => {
            tracing::warn!("Skipping button {:?}: bad url {}: {}", button.text, url, e);
            None
        }
    }
}
