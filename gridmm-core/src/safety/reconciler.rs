//! Periodic reconciler (spec.md §4.5.3): cross-checks the in-memory grid
//! against exchange-reported open orders and position, repairs divergence,
//! and persists a [`ReconciliationRecord`] every pass.

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::{ClientOid, Side};
use crate::exchange::Exchange;
use crate::executor::OrderExecutor;
use crate::grid::Grid;
use crate::persistence::{ReconciliationRecord, TradeStorage};
use crate::position_manager::PositionManager;

/// One position-qty lot's worth of tolerance before a divergence is
/// considered worth repairing (spec.md §4.5.3 "discrepancy > tolerance").
fn position_tolerance(grid: &Grid) -> Decimal {
    let params = grid.params();
    grid.quantity_at(params.price_interval.max(Decimal::ONE)) / Decimal::from(2)
}

/// Run one reconciliation pass. Returns the divergence counts so the caller
/// can decide whether to log at a higher level; always persists a record
/// regardless of whether anything diverged (SPEC_FULL §4.5 addition).
pub async fn reconcile_once(
    symbol: &str,
    grid: &Grid,
    executor: &OrderExecutor,
    exchange: &dyn Exchange,
    manager: &PositionManager,
    storage: &dyn TradeStorage,
    now_millis: i64,
) -> anyhow::Result<ReconciliationRecord> {
    let mut divergences_found = 0u32;
    let mut divergences_repaired = 0u32;

    let remote_orders = exchange
        .get_open_orders(symbol)
        .await
        .map_err(|e| anyhow::anyhow!("reconcile: get_open_orders failed: {e}"))?;
    let remote_client_oids: HashSet<&str> = remote_orders.iter().map(|o| o.client_oid.as_str()).collect();

    // Orders present locally but not remotely: the slot believes it has a
    // resting order the exchange no longer has (spec.md §8 S5).
    for slot in grid.all_slots() {
        if let Some(order_id) = slot.buy_order_id() {
            if !remote_client_oids.contains(order_id.as_str()) {
                warn!(symbol, price = %slot.price, side = "buy", "reconciler: local order missing remotely, clearing");
                slot.canceled(Side::Buy);
                divergences_found += 1;
                divergences_repaired += 1;
            }
        }
        if let Some(order_id) = slot.sell_order_id() {
            if !remote_client_oids.contains(order_id.as_str()) {
                warn!(symbol, price = %slot.price, side = "sell", "reconciler: local order missing remotely, clearing");
                slot.canceled(Side::Sell);
                divergences_found += 1;
                divergences_repaired += 1;
            }
        }
    }

    // Orders present remotely but not locally: foreign or stale, cancel them.
    let price_decimals = grid.params().price_decimals;
    let mut foreign_ids = Vec::new();
    for order in &remote_orders {
        let known = match order.client_oid.parse::<ClientOid>() {
            Ok(oid) => {
                let price = oid.price(price_decimals);
                match oid.side {
                    Side::Buy => grid.get(price).map(|s| s.buy_order_id()).unwrap_or(None),
                    Side::Sell => grid.get(price).map(|s| s.sell_order_id()).unwrap_or(None),
                }
                .as_deref()
                    == Some(order.client_oid.as_str())
            }
            Err(_) => false,
        };
        if !known {
            divergences_found += 1;
            foreign_ids.push(order.exchange_order_id.clone());
        }
    }
    if !foreign_ids.is_empty() {
        let (canceled, _) = executor.batch_cancel(symbol, foreign_ids).await;
        divergences_repaired += canceled.len() as u32;
    }

    // Position-qty discrepancy: redistribute local Filled slots to match
    // the exchange's reported net quantity (spec.md §4.5.3 "same algorithm
    // as Initialize").
    let remote_position = exchange
        .get_position(symbol)
        .await
        .map_err(|e| anyhow::anyhow!("reconcile: get_position failed: {e}"))?;
    let local_net_qty: Decimal = grid
        .filled_slots()
        .iter()
        .map(|s| s.snapshot().position_qty)
        .sum();
    let tolerance = position_tolerance(grid);
    if (remote_position.net_qty - local_net_qty).abs() > tolerance {
        warn!(
            symbol,
            local = %local_net_qty,
            remote = %remote_position.net_qty,
            "reconciler: position qty diverged, redistributing"
        );
        divergences_found += 1;
        for slot in grid.filled_slots() {
            slot.force_clear();
        }
        if remote_position.net_qty > Decimal::ZERO {
            manager.distribute_position(remote_position);
        }
        divergences_repaired += 1;
    }

    info!(symbol, divergences_found, divergences_repaired, "reconciliation pass complete");

    let record = ReconciliationRecord {
        symbol: symbol.to_string(),
        divergences_found,
        divergences_repaired,
        ts_millis: now_millis,
    };
    storage.save_reconciliation(record.clone()).await;
    Ok(record)
}
