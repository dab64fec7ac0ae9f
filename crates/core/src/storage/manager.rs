use crate::errors::CoreError;
use crate::models::ledger::Ledger;

use super::format;

/// High-level storage operations: save/load the ledger to/from bytes or files.
pub struct StorageManager;

impl StorageManager {
    /// Serialize a ledger to raw bytes (portable, platform-independent).
    ///
    /// Flow: Ledger → serde_json → CRTK envelope bytes
    pub fn save_to_bytes(ledger: &Ledger) -> Result<Vec<u8>, CoreError> {
        format::write_file(ledger)
    }

    /// Deserialize a ledger from raw bytes.
    ///
    /// The file may have been edited by hand: transactions are re-sorted by
    /// date (stable), each cached price series is sorted and deduplicated,
    /// and settings are clamped into range.
    pub fn load_from_bytes(data: &[u8]) -> Result<Ledger, CoreError> {
        let mut ledger = format::read_file(data)?;
        ledger.transactions.sort_by_key(|t| t.date);
        let dropped = ledger.price_cache.normalize();
        if dropped > 0 {
            log::warn!("Dropped {dropped} duplicate or invalid cached prices while loading");
        }
        ledger.settings.sanitize();
        log::debug!(
            "Loaded ledger: {} transactions, {} cached prices",
            ledger.transactions.len(),
            ledger.price_cache.total_entries()
        );
        Ok(ledger)
    }

    /// Save the ledger to a file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(ledger: &Ledger, path: &str) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(ledger)?;
        std::fs::write(path, bytes)?;
        log::info!("Saved ledger to {path}");
        Ok(())
    }

    /// Load the ledger from a file on disk (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str) -> Result<Ledger, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes)
    }
}
