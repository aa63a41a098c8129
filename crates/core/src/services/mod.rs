pub mod holdings_service;
pub mod ledger_service;
pub mod refresh_service;
pub mod snapshot_service;
pub mod valuation_service;
