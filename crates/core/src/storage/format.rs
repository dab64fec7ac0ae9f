use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::ledger::Ledger;

/// Format tag identifying a CRTK (Crypto Tracker) ledger file.
pub const MAGIC: &str = "CRTK";

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// Just the identifying fields, read before the ledger itself so that a
/// foreign or future file is rejected with a precise error.
#[derive(Deserialize)]
struct FileHeader {
    format: String,
    version: u16,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u16,
    ledger: &'a Ledger,
}

#[derive(Deserialize)]
struct Envelope {
    ledger: Ledger,
}

/// Write a complete ledger file to bytes.
///
/// Layout (pretty-printed JSON):
/// ```text
/// { "format": "CRTK", "version": 1, "ledger": { transactions, settings, price_cache } }
/// ```
pub fn write_file(ledger: &Ledger) -> Result<Vec<u8>, CoreError> {
    let envelope = EnvelopeRef {
        format: MAGIC,
        version: CURRENT_VERSION,
        ledger,
    };
    serde_json::to_vec_pretty(&envelope)
        .map_err(|e| CoreError::Serialization(format!("Failed to serialize ledger: {e}")))
}

/// Parse raw file bytes into a ledger, checking the format tag and version
/// first.
pub fn read_file(data: &[u8]) -> Result<Ledger, CoreError> {
    let header: FileHeader = serde_json::from_slice(data).map_err(|e| {
        CoreError::InvalidFileFormat(format!("Not a CRTK ledger file: {e}"))
    })?;

    if header.format != MAGIC {
        return Err(CoreError::InvalidFileFormat(format!(
            "Unexpected format tag '{}' (expected {MAGIC})",
            header.format
        )));
    }
    if header.version == 0 || header.version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(header.version));
    }

    let envelope: Envelope = serde_json::from_slice(data)
        .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize ledger: {e}")))?;
    Ok(envelope.ledger)
}
