use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::valuation::HoldingValuation;

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    /// Explicitly requested by the user
    Manual,
    /// End-of-month capture
    Monthly,
    /// End-of-year capture (annual report)
    Yearly,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Manual => write!(f, "Manual"),
            SnapshotKind::Monthly => write!(f, "Monthly"),
            SnapshotKind::Yearly => write!(f, "Yearly"),
        }
    }
}

/// Immutable point-in-time capture of a portfolio valuation.
///
/// Append-only: once persisted it is never edited — a correction is a new
/// snapshot with a later `taken_at`. A zero-valued snapshot of an empty
/// portfolio is valid; the timeline records "nothing invested yet" too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub kind: SnapshotKind,
    pub total_value: f64,
    pub total_invested: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
    pub total_dividends: f64,
    pub diversification_score: f64,
    pub holdings: Vec<HoldingValuation>,
}
