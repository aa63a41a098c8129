// ═══════════════════════════════════════════════════════════════════
// Aggregator Tests — average-cost reduction, dividends, cache
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use semilla_core::errors::CoreError;
use semilla_core::models::instrument::{InstrumentId, InstrumentRegistry};
use semilla_core::models::transaction::{Transaction, TransactionDraft, TransactionKind};
use semilla_core::models::vault::Vault;
use semilla_core::services::holdings_service::HoldingsService;
use semilla_core::services::ledger_service::LedgerService;

fn dt(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn icolcap() -> InstrumentId {
    InstrumentId::new("ICOLCAP")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn raw_tx(
    user: Uuid,
    instrument: InstrumentId,
    kind: TransactionKind,
    units: f64,
    total: f64,
    occurred_at: DateTime<Utc>,
    seq: u64,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        user_id: user,
        instrument_id: instrument,
        kind,
        units,
        price_per_unit: if units > 0.0 { total / units } else { 0.0 },
        total_amount: total,
        currency: "COP".into(),
        exchange_rate_at_entry: None,
        fees: 0.0,
        occurred_at,
        seq,
        note: None,
        milestone_tag: None,
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Average-cost accounting
// ═══════════════════════════════════════════════════════════════════

mod average_cost {
    use super::*;

    #[test]
    fn empty_ledger_derives_nothing() {
        let derivation = HoldingsService::aggregate(&[], "COP").unwrap();
        assert!(derivation.holdings.is_empty());
        assert_eq!(derivation.total_dividends, 0.0);
    }

    #[test]
    fn single_buy() {
        let user = Uuid::new_v4();
        let tx = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 125_000.0, dt(2025, 1, 15, 10), 0);
        let derivation = HoldingsService::aggregate(&[&tx], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 10.0);
        assert_eq!(holding.cost_basis, 125_000.0);
        assert_eq!(holding.average_cost, 12_500.0);
    }

    #[test]
    fn blended_average_across_buys() {
        // buy 10 @ 100, buy 10 @ 200 → 20 units, average cost 150
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let b = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 2_000.0, dt(2025, 2, 1, 10), 1);
        let derivation = HoldingsService::aggregate(&[&a, &b], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 20.0);
        assert_eq!(holding.cost_basis, 3_000.0);
        assert_eq!(holding.average_cost, 150.0);
    }

    #[test]
    fn sell_relieves_basis_at_average_cost() {
        // then sell 5 → 15 units, basis 15 * 150 = 2250
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let b = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 2_000.0, dt(2025, 2, 1, 10), 1);
        let c = raw_tx(user, icolcap(), TransactionKind::Sell, 5.0, 900.0, dt(2025, 3, 1, 10), 2);
        let derivation = HoldingsService::aggregate(&[&a, &b, &c], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 15.0);
        assert_close(holding.cost_basis, 2_250.0);
        assert_close(holding.average_cost, 150.0);
    }

    #[test]
    fn sell_price_does_not_move_average_cost() {
        // selling at any price relieves basis at the blended average
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let cheap = raw_tx(user, icolcap(), TransactionKind::Sell, 2.0, 2.0, dt(2025, 2, 1, 10), 1);
        let derivation = HoldingsService::aggregate(&[&a, &cheap], "COP").unwrap();
        assert_close(derivation.holdings[&icolcap()].average_cost, 100.0);
    }

    #[test]
    fn spec_scenario_icolcap() {
        // buy 10 @ 12,500, buy 5 @ 13,000, sell 3 → 12 units,
        // avg (125000 + 65000) / 15 ≈ 12,666.67, basis ≈ 152,000
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 125_000.0, dt(2025, 1, 10, 10), 0);
        let b = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 65_000.0, dt(2025, 2, 10, 10), 1);
        let c = raw_tx(user, icolcap(), TransactionKind::Sell, 3.0, 42_000.0, dt(2025, 3, 10, 10), 2);
        let derivation = HoldingsService::aggregate(&[&a, &b, &c], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 12.0);
        assert_close(holding.cost_basis, 152_000.0);
        assert_close(holding.average_cost, 12_666.666_666_666_666);
    }

    #[test]
    fn position_sold_to_zero_is_dropped() {
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let b = raw_tx(user, icolcap(), TransactionKind::Sell, 10.0, 1_500.0, dt(2025, 2, 1, 10), 1);
        let derivation = HoldingsService::aggregate(&[&a, &b], "COP").unwrap();
        assert!(derivation.holdings.is_empty());
    }

    #[test]
    fn rebuy_after_full_exit_starts_fresh_basis() {
        let user = Uuid::new_v4();
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let b = raw_tx(user, icolcap(), TransactionKind::Sell, 10.0, 5_000.0, dt(2025, 2, 1, 10), 1);
        let c = raw_tx(user, icolcap(), TransactionKind::Buy, 4.0, 800.0, dt(2025, 3, 1, 10), 2);
        let derivation = HoldingsService::aggregate(&[&a, &b, &c], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 4.0);
        assert_close(holding.cost_basis, 800.0);
        assert_close(holding.average_cost, 200.0);
    }

    #[test]
    fn instruments_are_independent() {
        let user = Uuid::new_v4();
        let voo = InstrumentId::new("VOO");
        let a = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let b = raw_tx(user, voo.clone(), TransactionKind::Buy, 2.0, 4_000.0, dt(2025, 1, 2, 10), 1);
        let derivation = HoldingsService::aggregate(&[&a, &b], "COP").unwrap();
        assert_eq!(derivation.holdings.len(), 2);
        assert_eq!(derivation.holdings[&voo].average_cost, 2_000.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Conservation & ordering
// ═══════════════════════════════════════════════════════════════════

mod conservation {
    use super::*;

    #[test]
    fn basis_equals_sum_of_buys_exactly() {
        // with no sells, cost basis is the exact sum of buy totals —
        // no drift from repeated averaging
        let user = Uuid::new_v4();
        let totals = [125_000.0, 65_000.0, 13_250.5, 999.25, 42_000.0];
        let txs: Vec<Transaction> = totals
            .iter()
            .enumerate()
            .map(|(i, total)| {
                raw_tx(
                    user,
                    icolcap(),
                    TransactionKind::Buy,
                    (i + 1) as f64,
                    *total,
                    dt(2025, 1, 1 + i as u32, 10),
                    i as u64,
                )
            })
            .collect();
        let refs: Vec<&Transaction> = txs.iter().collect();
        let derivation = HoldingsService::aggregate(&refs, "COP").unwrap();
        let expected: f64 = totals.iter().sum();
        assert_eq!(derivation.holdings[&icolcap()].cost_basis, expected);
    }

    #[test]
    fn fees_are_part_of_cost_basis() {
        let user = Uuid::new_v4();
        let mut tx = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 125_500.0, dt(2025, 1, 1, 10), 0);
        tx.price_per_unit = 12_500.0;
        tx.fees = 500.0;
        let derivation = HoldingsService::aggregate(&[&tx], "COP").unwrap();
        assert_eq!(derivation.holdings[&icolcap()].cost_basis, 125_500.0);
    }

    #[test]
    fn replay_order_is_chronological_not_slice_order() {
        // pass the slice shuffled; the reduction must sort by occurred_at
        let user = Uuid::new_v4();
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let sell = raw_tx(user, icolcap(), TransactionKind::Sell, 5.0, 600.0, dt(2025, 2, 1, 10), 1);
        let derivation = HoldingsService::aggregate(&[&sell, &buy], "COP").unwrap();
        assert_eq!(derivation.holdings[&icolcap()].units, 5.0);
    }

    #[test]
    fn same_instant_ties_break_by_sequence() {
        // buy then sell at the same instant: valid only in seq order
        let user = Uuid::new_v4();
        let at = dt(2025, 1, 1, 10);
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 500.0, at, 0);
        let sell = raw_tx(user, icolcap(), TransactionKind::Sell, 5.0, 600.0, at, 1);
        // slice order reversed on purpose
        let derivation = HoldingsService::aggregate(&[&sell, &buy], "COP").unwrap();
        assert!(derivation.holdings.is_empty());
    }

    #[test]
    fn sell_sequenced_before_same_instant_buy_fails() {
        let user = Uuid::new_v4();
        let at = dt(2025, 1, 1, 10);
        let sell = raw_tx(user, icolcap(), TransactionKind::Sell, 5.0, 600.0, at, 0);
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 500.0, at, 1);
        let result = HoldingsService::aggregate(&[&buy, &sell], "COP");
        assert!(matches!(result, Err(CoreError::InsufficientUnits { .. })));
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Dividends
// ═══════════════════════════════════════════════════════════════════

mod dividends {
    use super::*;

    #[test]
    fn dividend_leaves_units_and_basis_unchanged() {
        let user = Uuid::new_v4();
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let div = raw_tx(user, icolcap(), TransactionKind::Dividend, 0.0, 37.5, dt(2025, 2, 1, 10), 1);
        let derivation = HoldingsService::aggregate(&[&buy, &div], "COP").unwrap();
        let holding = &derivation.holdings[&icolcap()];
        assert_eq!(holding.units, 10.0);
        assert_eq!(holding.cost_basis, 1_000.0);
    }

    #[test]
    fn dividends_accumulate_separately() {
        let user = Uuid::new_v4();
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 10.0, 1_000.0, dt(2025, 1, 1, 10), 0);
        let d1 = raw_tx(user, icolcap(), TransactionKind::Dividend, 0.0, 37.5, dt(2025, 2, 1, 10), 1);
        let d2 = raw_tx(user, icolcap(), TransactionKind::Dividend, 0.0, 12.5, dt(2025, 3, 1, 10), 2);
        let derivation = HoldingsService::aggregate(&[&buy, &d1, &d2], "COP").unwrap();
        assert_eq!(derivation.total_dividends, 50.0);
        assert_eq!(derivation.dividends[&icolcap()], 50.0);
    }

    #[test]
    fn dividend_without_holding_still_counts() {
        // a dividend recorded after a full exit is cash flow, not an error
        let user = Uuid::new_v4();
        let div = raw_tx(user, icolcap(), TransactionKind::Dividend, 0.0, 10.0, dt(2025, 2, 1, 10), 0);
        let derivation = HoldingsService::aggregate(&[&div], "COP").unwrap();
        assert!(derivation.holdings.is_empty());
        assert_eq!(derivation.total_dividends, 10.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Currency conversion at entry
// ═══════════════════════════════════════════════════════════════════

mod foreign_entries {
    use super::*;

    #[test]
    fn foreign_buy_converts_at_entry_rate() {
        let user = Uuid::new_v4();
        let mut tx = raw_tx(
            user,
            InstrumentId::new("VOO"),
            TransactionKind::Buy,
            2.0,
            1_100.0,
            dt(2025, 1, 1, 10),
            0,
        );
        tx.currency = "USD".into();
        tx.exchange_rate_at_entry = Some(4_100.0);
        let derivation = HoldingsService::aggregate(&[&tx], "COP").unwrap();
        let holding = &derivation.holdings[&InstrumentId::new("VOO")];
        assert_eq!(holding.cost_basis, 4_510_000.0);
        assert_eq!(holding.average_cost, 2_255_000.0);
    }

    #[test]
    fn foreign_dividend_converts_at_entry_rate() {
        let user = Uuid::new_v4();
        let mut tx = raw_tx(
            user,
            InstrumentId::new("VOO"),
            TransactionKind::Dividend,
            0.0,
            10.0,
            dt(2025, 1, 1, 10),
            0,
        );
        tx.currency = "USD".into();
        tx.exchange_rate_at_entry = Some(4_000.0);
        let derivation = HoldingsService::aggregate(&[&tx], "COP").unwrap();
        assert_eq!(derivation.total_dividends, 40_000.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Invariant violations
// ═══════════════════════════════════════════════════════════════════

mod invariants {
    use super::*;

    #[test]
    fn oversell_fails_with_insufficient_units() {
        let user = Uuid::new_v4();
        let buy = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 500.0, dt(2025, 1, 1, 10), 0);
        let sell = raw_tx(user, icolcap(), TransactionKind::Sell, 6.0, 700.0, dt(2025, 2, 1, 10), 1);
        let result = HoldingsService::aggregate(&[&buy, &sell], "COP");
        match result {
            Err(CoreError::InsufficientUnits {
                instrument,
                requested,
                held,
            }) => {
                assert_eq!(instrument, "ICOLCAP");
                assert_eq!(requested, 6.0);
                assert_eq!(held, 5.0);
            }
            other => panic!("expected InsufficientUnits, got {other:?}"),
        }
    }

    #[test]
    fn negative_units_are_ledger_corruption() {
        let user = Uuid::new_v4();
        let mut tx = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 500.0, dt(2025, 1, 1, 10), 0);
        tx.units = -5.0;
        let result = HoldingsService::aggregate(&[&tx], "COP");
        assert!(matches!(result, Err(CoreError::LedgerCorrupted(_))));
    }

    #[test]
    fn non_finite_units_are_ledger_corruption() {
        let user = Uuid::new_v4();
        let mut tx = raw_tx(user, icolcap(), TransactionKind::Buy, 5.0, 500.0, dt(2025, 1, 1, 10), 0);
        tx.units = f64::NAN;
        let result = HoldingsService::aggregate(&[&tx], "COP");
        assert!(matches!(result, Err(CoreError::LedgerCorrupted(_))));
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Version-keyed derivation cache
// ═══════════════════════════════════════════════════════════════════

mod cache {
    use super::*;

    fn now() -> DateTime<Utc> {
        dt(2026, 1, 1, 12)
    }

    #[test]
    fn derive_reflects_ledger_mutations() {
        let mut vault = Vault::default();
        let registry = InstrumentRegistry::with_default_universe();
        let ledger = LedgerService::new();
        let mut holdings = HoldingsService::new();
        let user = Uuid::new_v4();

        let draft = TransactionDraft::buy(user, icolcap(), 10.0, 12_500.0, dt(2025, 1, 15, 10));
        ledger.append(&mut vault, &registry, draft, now()).unwrap();

        let first = holdings.derive(&vault, user).unwrap();
        assert_eq!(first.holdings[&icolcap()].units, 10.0);

        // repeated read without mutation hits the memo
        let again = holdings.derive(&vault, user).unwrap();
        assert_eq!(again.holdings[&icolcap()].units, 10.0);

        // a mutation bumps the version and invalidates the memo
        let draft = TransactionDraft::buy(user, icolcap(), 5.0, 13_000.0, dt(2025, 2, 15, 10));
        ledger.append(&mut vault, &registry, draft, now()).unwrap();
        let after = holdings.derive(&vault, user).unwrap();
        assert_eq!(after.holdings[&icolcap()].units, 15.0);
    }

    #[test]
    fn derive_is_per_user() {
        let mut vault = Vault::default();
        let registry = InstrumentRegistry::with_default_universe();
        let ledger = LedgerService::new();
        let mut holdings = HoldingsService::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let draft = TransactionDraft::buy(alice, icolcap(), 10.0, 12_500.0, dt(2025, 1, 15, 10));
        ledger.append(&mut vault, &registry, draft, now()).unwrap();

        assert_eq!(holdings.derive(&vault, alice).unwrap().holdings.len(), 1);
        assert!(holdings.derive(&vault, bob).unwrap().holdings.is_empty());
    }
}
