use thiserror::Error;

/// Unified error type for the entire crypto-tracker-core library.
/// Every public fallible function returns `Result<T, CoreError>`.
///
/// Numeric edge cases (division by zero, empty ledgers) are never errors:
/// they resolve to sentinel values inside the analytics code.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage / File ──────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No price provider available for {0}")]
    NoProvider(String),

    #[error("Price not available for {symbol} on {date}")]
    PriceNotAvailable { symbol: String, date: String },

    // ── Ledger ──────────────────────────────────────────────────────
    /// Malformed transaction: non-positive or non-finite quantity/price,
    /// unknown asset, date in the future.
    #[error("Transaction validation failed: {0}")]
    ValidationError(String),

    #[error("Cannot sell {requested} {asset} on {date}: only {available} held")]
    Overdraft {
        asset: String,
        requested: f64,
        available: f64,
        date: String,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors embed the full request URL; keep only the path.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
