pub mod analytics;
pub mod asset;
pub mod dca;
pub mod history;
pub mod holding;
pub mod ledger;
pub mod performance;
pub mod price;
pub mod settings;
pub mod transaction;
pub mod valuation;
