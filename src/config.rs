use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Simulated-hardware timings. The waits stand in for physical locker
/// interaction and carry no correctness weight, so every one of them is
/// injectable; tests run with all of them at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTimings {
    /// Simulated parcel insertion before the creation request fires.
    pub insertion: Duration,
    /// How long the submission confirmation stays up before auto-close.
    pub confirmation: Duration,
    /// How long a pickup code or QR payload is displayed before the
    /// status update fires.
    pub code_display: Duration,
    /// Simulated local QR scan.
    pub scan: Duration,
    /// Thank-you screen before a pickup flow auto-closes.
    pub thank_you: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            insertion: Duration::from_millis(5000),
            confirmation: Duration::from_millis(2000),
            code_display: Duration::from_millis(5000),
            scan: Duration::from_millis(2000),
            thank_you: Duration::from_millis(5000),
        }
    }
}

impl FlowTimings {
    /// Zero-duration timings for tests and non-interactive runs.
    pub fn immediate() -> Self {
        Self {
            insertion: Duration::ZERO,
            confirmation: Duration::ZERO,
            code_display: Duration::ZERO,
            scan: Duration::ZERO,
            thank_you: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: Url,
    pub log_level: String,
    pub timings: FlowTimings,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        let _ = dotenvy::dotenv();

        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let backend_url = Url::parse(&backend_url)
            .map_err(|err| ApiError::Decode(format!("invalid BACKEND_URL: {err}")))?;

        Ok(Self {
            backend_url,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            timings: FlowTimings {
                insertion: millis_or_default("INSERTION_DELAY_MS", 5000)?,
                confirmation: millis_or_default("CONFIRMATION_DELAY_MS", 2000)?,
                code_display: millis_or_default("CODE_DISPLAY_DELAY_MS", 5000)?,
                scan: millis_or_default("SCAN_DELAY_MS", 2000)?,
                thank_you: millis_or_default("THANK_YOU_DELAY_MS", 5000)?,
            },
        })
    }
}

fn millis_or_default(key: &str, default: u64) -> Result<Duration, ApiError> {
    let millis = match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|err| ApiError::Decode(format!("invalid {key}: {err}")))?,
        Err(_) => default,
    };
    Ok(Duration::from_millis(millis))
}
