//! Order lifecycle events.
//!
//! The ledger publishes to a tokio broadcast channel; collaborators such as
//! notifications or seller dashboards subscribe. Publishing never blocks and
//! never fails the operation that produced the event: with no subscribers the
//! event is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use marketplace_core::order::OrderNumber;
use marketplace_core::pricing::OrderTotals;
use marketplace_core::{OrderId, OrderStatus, UserId};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// Something that happened to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrderEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        order_id: OrderId,
        order_number: OrderNumber,
        user_id: UserId,
        totals: OrderTotals,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled {
        order_id: OrderId,
        order_number: OrderNumber,
        user_id: UserId,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        order_id: OrderId,
        order_number: OrderNumber,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    },
}

impl OrderEvent {
    /// Short event name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "order.created",
            Self::Cancelled { .. } => "order.cancelled",
            Self::StatusChanged { .. } => "order.status_changed",
        }
    }

    #[must_use]
    pub const fn order_number(&self) -> &OrderNumber {
        match self {
            Self::Created { order_number, .. }
            | Self::Cancelled { order_number, .. }
            | Self::StatusChanged { order_number, .. } => order_number,
        }
    }
}

/// In-process publish/subscribe for [`OrderEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<OrderEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event to current subscribers.
    pub fn publish(&self, event: OrderEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(event));
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OrderEvent>> {
        self.sender.subscribe()
    }

    /// Log every event until the bus is dropped.
    #[must_use]
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => tracing::info!(
                        event = event.name(),
                        order_number = %event.order_number(),
                        "Order event"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Order event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(OrderEvent::StatusChanged {
            order_id: OrderId::new(1),
            order_number: OrderNumber::from_stored("RE-AAAA-BBBB-CCCC".to_string()),
            from: OrderStatus::Pending,
            to: OrderStatus::Processing,
            at: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "order.status_changed");
        assert_eq!(event.order_number().as_str(), "RE-AAAA-BBBB-CCCC");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(OrderEvent::Cancelled {
            order_id: OrderId::new(1),
            order_number: OrderNumber::from_stored("RE-1".to_string()),
            user_id: UserId::new(1),
            note: None,
            at: Utc::now(),
        });
    }
}
