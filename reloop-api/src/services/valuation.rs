//! Valuation service
//!
//! Hands out a `ValuationCell` per session: catalog baseline immediately,
//! replaced in the background by a market estimate when one arrives in time.

use chrono::Utc;
use reloop_common::db::Device;
use reloop_common::events::{EventBus, ReloopEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::pricing_client::PricingOracle;
use crate::models::{ValuationCell, ValuationSnapshot};

/// Valuation prompt for the device's components
pub fn build_pricing_prompt(device: &Device) -> String {
    let component_list = device
        .components
        .iter()
        .map(|c| format!("- {} ({}), current market estimate: ₹{}", c.name, c.kind, c.value))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a gadget valuation expert for the Indian secondary market.
Estimate the realistic resale values in INR for these specific components harvested from a "{}".
Consider the current Indian market conditions, demand, and component condition.
Return ONLY JSON with a mapping of component name to value in INR (as numbers), and a "total_yield_inr" field.

Components:
{}

Example format:
{{
  "Component Name": 2500,
  "Another Component": 4200,
  "total_yield_inr": 6700
}}"#,
        device.name, component_list
    )
}

pub struct ValuationService {
    pricing: Arc<dyn PricingOracle>,
    event_bus: EventBus,
    timeout: Duration,
    cells: RwLock<HashMap<Uuid, ValuationCell>>,
}

impl ValuationService {
    pub fn new(pricing: Arc<dyn PricingOracle>, event_bus: EventBus, timeout: Duration) -> Self {
        Self {
            pricing,
            event_bus,
            timeout,
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Cell for `session_id`, starting refinement on first request
    pub async fn appraise(&self, session_id: Uuid, device: &Device) -> ValuationCell {
        if let Some(cell) = self.cells.read().await.get(&session_id) {
            return cell.clone();
        }

        let mut cells = self.cells.write().await;
        if let Some(cell) = cells.get(&session_id) {
            return cell.clone();
        }

        let baseline = ValuationSnapshot::baseline(device);
        let (cell, writer) = ValuationCell::new(baseline.clone());
        cells.insert(session_id, cell.clone());
        drop(cells);

        if device.components.is_empty() {
            writer.settle();
            return cell;
        }

        let pricing = Arc::clone(&self.pricing);
        let event_bus = self.event_bus.clone();
        let timeout = self.timeout;
        let device = device.clone();

        tokio::spawn(async move {
            let prompt = build_pricing_prompt(&device);
            let reply = tokio::time::timeout(timeout, pricing.estimate_prices(&prompt)).await;

            let refined = match reply {
                Ok(Ok(map)) => ValuationSnapshot::refine(&device, &baseline, &map),
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %session_id, error = %e, "AI valuation failed, keeping catalog values");
                    None
                }
                Err(_) => {
                    tracing::info!(session_id = %session_id, "Valuation request timed out, keeping catalog values");
                    None
                }
            };

            match refined {
                Some(snapshot) => {
                    tracing::info!(
                        session_id = %session_id,
                        total_inr = snapshot.total_inr,
                        "Market valuation refined"
                    );
                    let total_inr = snapshot.total_inr;
                    writer.publish(snapshot);
                    event_bus.emit_lossy(ReloopEvent::ValuationRefined {
                        session_id,
                        total_inr,
                        timestamp: Utc::now(),
                    });
                }
                None => writer.settle(),
            }
        });

        cell
    }

    /// Cached cell, if the session has been appraised
    pub async fn cell(&self, session_id: Uuid) -> Option<ValuationCell> {
        self.cells.read().await.get(&session_id).cloned()
    }

    pub async fn forget(&self, session_id: Uuid) {
        self.cells.write().await.remove(&session_id);
    }
}
