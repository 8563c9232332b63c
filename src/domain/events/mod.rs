//! Domain events
use serde::Serialize;

use crate::domain::aggregates::Order;

/// Lifecycle notifications fanned out to live shop subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OrderEvent {
    NewOrder(Order),
}

impl OrderEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewOrder(_) => "new_order",
        }
    }

    pub fn shop_id(&self) -> i64 {
        match self {
            Self::NewOrder(order) => order.shop_id,
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            Self::NewOrder(order) => order.id,
        }
    }

    /// The JSON body subscribers receive: the order itself.
    pub fn payload(&self) -> serde_json::Result<String> {
        match self {
            Self::NewOrder(order) => serde_json::to_string(order),
        }
    }
}
