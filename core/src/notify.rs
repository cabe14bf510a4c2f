// verdant/src/notify.rs

//! Fire-and-forget order lifecycle events.

use crate::models::{Order, OrderStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
  pub order_id: Uuid,
  pub order_number: String,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub message: String,
}

impl OrderEvent {
  pub fn for_order(order: &Order, message: impl Into<String>) -> Self {
    Self {
      order_id: order.id,
      order_number: order.order_number.clone(),
      user_id: order.user_id,
      status: order.status,
      message: message.into(),
    }
  }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
  async fn publish(&self, event: OrderEvent) -> anyhow::Result<()>;
}

/// Publishes and logs failure. Never fails the caller.
pub async fn publish_quietly(sink: &dyn NotificationSink, event: OrderEvent) {
  let order_id = event.order_id;
  if let Err(e) = sink.publish(event).await {
    warn!(%order_id, error = %e, "failed to publish order event");
  }
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
  async fn publish(&self, event: OrderEvent) -> anyhow::Result<()> {
    info!(
      order_id = %event.order_id,
      order_number = %event.order_number,
      user_id = %event.user_id,
      status = %event.status,
      "{}",
      event.message
    );
    Ok(())
  }
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
  sender: broadcast::Sender<OrderEvent>,
}

impl BroadcastSink {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self { sender }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
    self.sender.subscribe()
  }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
  async fn publish(&self, event: OrderEvent) -> anyhow::Result<()> {
    // Sending with no subscribers is not a failure.
    match self.sender.send(event) {
      Ok(receivers) => debug!(receivers, "order event broadcast"),
      Err(_) => debug!("order event dropped, no subscribers"),
    }
    Ok(())
  }
}
