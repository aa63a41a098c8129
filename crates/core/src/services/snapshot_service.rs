use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::snapshot::{PortfolioSnapshot, SnapshotKind};
use crate::models::valuation::PortfolioValuation;
use crate::models::vault::Vault;

/// Captures immutable point-in-time portfolio snapshots.
///
/// Every snapshot is built from a valuation freshly derived from the
/// ledger — never from a previous snapshot, so numeric drift cannot
/// compound. The log is append-only: a correction is a new snapshot
/// with a later `taken_at`. An empty portfolio produces a valid
/// zero-valued snapshot; the timeline records "nothing invested yet"
/// states too.
pub struct SnapshotService;

impl SnapshotService {
    pub fn new() -> Self {
        Self
    }

    /// Append a snapshot of the given valuation to the vault's log.
    pub fn take(
        &self,
        vault: &mut Vault,
        user_id: Uuid,
        kind: SnapshotKind,
        valuation: &PortfolioValuation,
        taken_at: DateTime<Utc>,
    ) -> PortfolioSnapshot {
        let snapshot = PortfolioSnapshot {
            id: Uuid::new_v4(),
            user_id,
            taken_at,
            kind,
            total_value: valuation.current_value,
            total_invested: valuation.total_invested,
            total_return: valuation.total_return,
            total_return_pct: valuation.total_return_pct,
            total_dividends: valuation.total_dividends,
            diversification_score: valuation.diversification_score,
            holdings: valuation.holdings.clone(),
        };
        vault.snapshots.push(snapshot.clone());
        snapshot
    }

    /// A user's snapshots, oldest first.
    pub fn list<'a>(&self, vault: &'a Vault, user_id: Uuid) -> Vec<&'a PortfolioSnapshot> {
        let mut snapshots: Vec<&PortfolioSnapshot> = vault
            .snapshots
            .iter()
            .filter(|s| s.user_id == user_id)
            .collect();
        snapshots.sort_by_key(|s| s.taken_at);
        snapshots
    }
}

impl Default for SnapshotService {
    fn default() -> Self {
        Self::new()
    }
}
