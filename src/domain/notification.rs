use super::actor::ActorId;
use super::order::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    PaymentSubmitted,
    PaymentVerified,
    PaymentRejected,
    OrderShipped,
    OrderPreparing,
    ReadyForPickup,
    DriverAssigned,
    OrderDelivering,
    OrderCompleted,
    OrderCancelled,
    RefundRequested,
    RideOfferReceived,
    RideAccepted,
    RideCompleted,
    RideCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::PaymentSubmitted => "payment_submitted",
            NotificationKind::PaymentVerified => "payment_verified",
            NotificationKind::PaymentRejected => "payment_rejected",
            NotificationKind::OrderShipped => "order_shipped",
            NotificationKind::OrderPreparing => "order_preparing",
            NotificationKind::ReadyForPickup => "ready_for_pickup",
            NotificationKind::DriverAssigned => "driver_assigned",
            NotificationKind::OrderDelivering => "order_delivering",
            NotificationKind::OrderCompleted => "order_completed",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::RefundRequested => "refund_requested",
            NotificationKind::RideOfferReceived => "ride_offer_received",
            NotificationKind::RideAccepted => "ride_accepted",
            NotificationKind::RideCompleted => "ride_completed",
            NotificationKind::RideCancelled => "ride_cancelled",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound event. Delivery is somebody else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub target: ActorId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub related_order: OrderId,
}

impl Notification {
    pub fn new(target: ActorId, kind: NotificationKind, related_order: OrderId) -> Self {
        Self {
            target,
            kind,
            payload: serde_json::Value::Null,
            related_order,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Deduplication key: one event per order, kind, recipient and payload.
    pub fn event_key(&self) -> String {
        let key = format!("{}:{}:{}", self.related_order, self.kind, self.target);
        if self.payload.is_null() {
            key
        } else {
            format!("{key}:{}", self.payload)
        }
    }
}
