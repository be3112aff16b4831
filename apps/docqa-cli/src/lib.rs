//! Shared host plumbing for the `docqa` binaries: logging, settings, exit codes.
use std::process::ExitCode;

use docqa_core::config::{Config, Settings};
use docqa_core::ErrorKind;

/// Logs go to stderr so stdout carries only answers and listings.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Layered settings (`config.toml`, `config.<RUST_ENV>.toml`, `APP_*`), with
/// `GOOGLE_API_KEY` as the credential of last resort.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Config::load()?.settings()?;
    apply_credential_fallback(&mut settings, std::env::var("GOOGLE_API_KEY").ok());
    Ok(settings)
}

pub fn apply_credential_fallback(settings: &mut Settings, fallback: Option<String>) {
    let missing = settings.models.api_key.as_deref().map_or(true, |k| k.trim().is_empty());
    if missing {
        settings.models.api_key = fallback.filter(|k| !k.trim().is_empty());
    }
}

/// 2 configuration, 3 not found, 4 invalid input, 5 external service, 1 anything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<docqa_core::Error>().map(docqa_core::Error::kind) {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::InvalidInput) => 4,
        Some(ErrorKind::ExternalService) => 5,
        None => 1,
    }
}

/// Print the error chain and turn it into the process exit code.
pub fn report(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
