//! ConvertBot
//!
//! Chat-driven file conversion relay. Users upload a file (or send text),
//! pick a conversion from an inline menu, and get the converted result
//! back. Conversions are delegated to external command-line tools.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► telegram.rs ──► CapabilityDispatcher ──► Capabilities
//!  (polling)                        │                    (soffice, qpdf,
//!                                   ├── VerificationStore  ffmpeg, ...)
//!                                   ├── SessionStore
//!                                   ├── ArtifactStore (scratch files)
//!                                   └── Channel (replies)
//! ```

pub mod artifacts;
pub mod capabilities;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod intent;
pub mod menu;
pub mod preflight;
pub mod session;
pub mod telegram;
pub mod telegram_ui;
pub mod verification;

pub use artifacts::{Artifact, ArtifactKind, ArtifactStore};
pub use capabilities::{
    Capabilities, CapabilityError, CapabilityOutput, CapabilityResult, ExternalCapabilities,
};
pub use channels::{Channel, ChannelError, OutgoingFile, ResponseButton};
pub use config::{Config, OnboardingLink, Tool, ToolPaths};
pub use dispatcher::{ButtonPress, CapabilityDispatcher, DispatchOutcome, Inbound};
pub use intent::{PageRange, PageSpan, TextAction, TextIntent};
pub use menu::{build_menu, Action, Conversion, FileCategory, MenuEntry};
pub use preflight::{PreflightChecker, PreflightResult};
pub use session::{CurrentArtifact, DispatchPermit, SessionStore};
pub use verification::{InMemoryVerificationStore, SqliteVerificationStore, VerificationStore};
