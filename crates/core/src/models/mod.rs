pub mod holding;
pub mod instrument;
pub mod quote;
pub mod settings;
pub mod snapshot;
pub mod transaction;
pub mod valuation;
pub mod vault;
