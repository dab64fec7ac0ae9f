pub mod analytics_service;
pub mod dca_service;
pub mod holdings_service;
pub mod ledger_service;
pub mod performance_service;
pub mod price_service;
pub mod valuation_service;
