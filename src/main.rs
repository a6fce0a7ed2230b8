//! ConvertBot - Entry Point
//!
//! Runs the Telegram bot. Configuration comes from the environment
//! (optionally a `.env` file).

use convertbot::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("ConvertBot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: convertbot");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN           Telegram bot token (required)");
        println!("  CONVERTBOT_SCRATCH_DIR       Temporary file directory (default: temp_files)");
        println!("  CONVERTBOT_LEDGER_PATH       Verified-user database path");
        println!("  CONVERTBOT_ONBOARDING_LINKS  Follow links, \"Label|url;Label|url\"");
        println!("  CONVERTBOT_LANGUAGE          Wikipedia language (default: en)");
        println!("  CONVERTBOT_OCR_LANGUAGE      Tesseract language (default: eng)");
        println!("  CONVERTBOT_GIF_SECONDS       Seconds of video per GIF (default: 10)");
        println!("  CONVERTBOT_GIF_FPS           GIF frame rate (default: 10)");
        println!("  CONVERTBOT_<TOOL>_BIN        Override a tool path, e.g. CONVERTBOT_QPDF_BIN");
        println!("  RUST_LOG                     Log level (default: info)");
        println!("  LOG_FORMAT                   Set to \"json\" for JSON logs on stderr");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("ConvertBot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    convertbot::telegram::run_telegram_bot(config).await
}
