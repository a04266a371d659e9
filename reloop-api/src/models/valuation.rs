//! Two-phase component valuation
//!
//! A baseline built from catalog values is available the moment a cell is
//! created. A refined estimate may later replace it; readers either take the
//! latest snapshot or wait for the refinement.

use reloop_common::db::Device;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::watch;
use uuid::Uuid;

/// Key carrying the aggregate in a pricing response
pub const TOTAL_YIELD_KEY: &str = "total_yield_inr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuationPhase {
    /// Catalog values only
    Baseline,
    /// Pricing collaborator answered with at least one usable price
    Refined,
    /// Refinement attempted and abandoned; baseline is final
    Settled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationSnapshot {
    /// Whole-rupee price per component id
    pub prices: HashMap<Uuid, i64>,
    pub total_inr: i64,
    pub phase: ValuationPhase,
}

impl ValuationSnapshot {
    /// ceil(stored value) per component, summed
    pub fn baseline(device: &Device) -> Self {
        let prices: HashMap<Uuid, i64> = device
            .components
            .iter()
            .map(|c| (c.id, c.value.ceil() as i64))
            .collect();
        let total_inr = prices.values().sum();

        Self {
            prices,
            total_inr,
            phase: ValuationPhase::Baseline,
        }
    }

    /// Merge a pricing response over the baseline
    ///
    /// Components whose name maps to a number take ceil(number); all others
    /// keep their baseline. Returns `None` when no component had a numeric
    /// price, in which case the baseline stands.
    pub fn refine(device: &Device, baseline: &ValuationSnapshot, response: &Map<String, Value>) -> Option<Self> {
        let mut prices = HashMap::with_capacity(device.components.len());
        let mut has_valid_data = false;

        for component in &device.components {
            match response.get(&component.name).and_then(Value::as_f64) {
                Some(price) if price.is_finite() => {
                    prices.insert(component.id, price.ceil() as i64);
                    has_valid_data = true;
                }
                _ => {
                    let fallback = baseline
                        .prices
                        .get(&component.id)
                        .copied()
                        .unwrap_or_else(|| component.value.ceil() as i64);
                    prices.insert(component.id, fallback);
                }
            }
        }

        if !has_valid_data {
            return None;
        }

        let total_inr = match response.get(TOTAL_YIELD_KEY).and_then(Value::as_f64) {
            Some(total) if total.is_finite() && total > 0.0 => total.ceil() as i64,
            _ => prices.values().sum(),
        };

        Some(Self {
            prices,
            total_inr,
            phase: ValuationPhase::Refined,
        })
    }

    pub fn price_of(&self, component_id: Uuid) -> Option<i64> {
        self.prices.get(&component_id).copied()
    }
}

/// Updatable valuation cell
///
/// Cloning shares the same underlying value.
#[derive(Debug, Clone)]
pub struct ValuationCell {
    rx: watch::Receiver<ValuationSnapshot>,
}

/// Writer half held by the refinement task
#[derive(Debug)]
pub struct ValuationWriter {
    tx: watch::Sender<ValuationSnapshot>,
}

impl ValuationCell {
    /// New cell holding `baseline`
    pub fn new(baseline: ValuationSnapshot) -> (Self, ValuationWriter) {
        let (tx, rx) = watch::channel(baseline);
        (Self { rx }, ValuationWriter { tx })
    }

    /// Latest snapshot; never empty
    pub fn current(&self) -> ValuationSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the baseline phase is over
    ///
    /// Returns the refined snapshot, or the baseline if refinement was
    /// abandoned or the writer went away.
    pub async fn refined(&self) -> ValuationSnapshot {
        let mut rx = self.rx.clone();
        let refined = rx
            .wait_for(|s| s.phase != ValuationPhase::Baseline)
            .await
            .map(|snapshot| (*snapshot).clone());

        match refined {
            Ok(snapshot) => snapshot,
            Err(_) => self.current(),
        }
    }
}

impl ValuationWriter {
    pub fn publish(self, snapshot: ValuationSnapshot) {
        let _ = self.tx.send(snapshot);
    }

    /// Keep the baseline as the final answer
    pub fn settle(self) {
        self.tx.send_modify(|s| s.phase = ValuationPhase::Settled);
    }
}
