use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(bazar_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Not signed in. Run `bazar auth login`, or pass `--as <USER_ID>` (or set BAZAR_USER) in local mode."
    )]
    NotSignedIn,
    #[error(
        "The hosted backend is not configured. Run `bazar config init --supabase-url ... --supabase-anon-key ...` or set SUPABASE_URL and SUPABASE_ANON_KEY."
    )]
    HostedNotConfigured,
}

impl From<bazar_core::Error> for CliError {
    fn from(error: bazar_core::Error) -> Self {
        match error {
            bazar_core::Error::Unauthenticated => Self::NotSignedIn,
            other => Self::Core(other),
        }
    }
}
