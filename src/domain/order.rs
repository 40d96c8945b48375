use super::actor::{Actor, ActorId, Role};
use crate::error::OrderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What kind of goods a cart line is. Drives delivery fee, grace period and
/// the fulfilment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Physical,
    Service,
    FoodDelivery,
}

impl FromStr for ItemCategory {
    type Err = OrderError;

    /// Accepts the storefront's category labels as well as the canonical names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "physical" | "barang" => Ok(ItemCategory::Physical),
            "service" | "jasa" => Ok(ItemCategory::Service),
            "food_delivery" | "niaga food" | "makan" => Ok(ItemCategory::FoodDelivery),
            other => Err(OrderError::InvalidOrder(format!(
                "unknown item category '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub seller_id: ActorId,
    pub name: String,
    pub unit_price: u64,
    pub quantity: u32,
    pub category: ItemCategory,
    /// Pledged completion time for service items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation_days: Option<u32>,
}

impl OrderItem {
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }

    pub fn checked_line_total(&self) -> Option<u64> {
        self.unit_price.checked_mul(u64::from(self.quantity))
    }
}

/// A voucher as applied to a placed order. The discount is bound to the
/// anchor item that carried the code at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub discount_amount: u64,
    pub anchor_item_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    WaitingPayment,
    PaymentRejected,
    WaitingVerification,
    Processed,
    BeingPrepared,
    ReadyForPickup,
    Shipped,
    Delivering,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::PaymentRejected => "payment_rejected",
            OrderStatus::WaitingVerification => "waiting_verification",
            OrderStatus::Processed => "processed",
            OrderStatus::BeingPrepared => "being_prepared",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Goods have left the seller; cancellation is no longer possible.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivering)
    }

    /// Valid successors of this status for the given fulfilment path.
    pub fn successors(&self, fulfilment: Fulfilment) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match (self, fulfilment) {
            (WaitingPayment, _) => &[WaitingVerification, Processed, Cancelled],
            (PaymentRejected, _) => &[WaitingVerification, Processed, Cancelled],
            (WaitingVerification, _) => &[Processed, PaymentRejected, Cancelled],
            (Processed, Fulfilment::Courier) => &[Shipped, Cancelled],
            (Processed, Fulfilment::FoodDelivery) => &[BeingPrepared, Cancelled],
            (BeingPrepared, Fulfilment::FoodDelivery) => &[ReadyForPickup, Cancelled],
            (ReadyForPickup, Fulfilment::FoodDelivery) => &[Delivering, Cancelled],
            (Shipped, Fulfilment::Courier) => &[Completed],
            (Delivering, Fulfilment::FoodDelivery) => &[Completed],
            _ => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus, fulfilment: Fulfilment) -> bool {
        self.successors(fulfilment).contains(&next)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the goods reach the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fulfilment {
    /// Shipped by the seller (physical goods and services).
    Courier,
    /// Prepared by the seller and carried by a driver.
    FoodDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Manual transfer verified by an admin against an opaque proof reference.
    Transfer { proof: String },
    /// Debited from the buyer's wallet balance and held until settlement.
    Wallet,
}

/// Everything needed to persist a new order, already priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub buyer_id: ActorId,
    pub items: Vec<OrderItem>,
    pub delivery_fee: u64,
    pub voucher: Option<Voucher>,
    pub note: Option<String>,
    pub delivery_address: Option<String>,
    pub total_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: ActorId,
    pub items: Vec<OrderItem>,
    pub delivery_fee: u64,
    pub voucher: Option<Voucher>,
    pub note: Option<String>,
    pub delivery_address: Option<String>,
    pub status: OrderStatus,
    pub driver_id: Option<ActorId>,
    pub total_price: u64,
    pub payment: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub funds_released: bool,
    pub is_reviewed: bool,
    /// Soft-delete flag set by the buyer; never affects settlement.
    #[serde(default)]
    pub hidden: bool,
}

impl Order {
    pub fn from_draft(id: OrderId, draft: OrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            buyer_id: draft.buyer_id,
            items: draft.items,
            delivery_fee: draft.delivery_fee,
            voucher: draft.voucher,
            note: draft.note,
            delivery_address: draft.delivery_address,
            status: OrderStatus::WaitingPayment,
            driver_id: None,
            total_price: draft.total_price,
            payment: None,
            created_at: now,
            paid_at: None,
            verified_at: None,
            shipped_at: None,
            completed_at: None,
            cancelled_at: None,
            funds_released: false,
            is_reviewed: false,
            hidden: false,
        }
    }

    /// Checkout rejects carts whose totals overflow, so the saturating sums
    /// here and in `seller_subtotals` are exact for placed orders.
    pub fn subtotal(&self) -> u64 {
        self.items
            .iter()
            .map(OrderItem::line_total)
            .fold(0, u64::saturating_add)
    }

    pub fn fulfilment(&self) -> Fulfilment {
        if self
            .items
            .iter()
            .any(|item| item.category == ItemCategory::FoodDelivery)
        {
            Fulfilment::FoodDelivery
        } else {
            Fulfilment::Courier
        }
    }

    /// Line totals grouped by seller, in a stable order.
    pub fn seller_subtotals(&self) -> BTreeMap<ActorId, u64> {
        let mut subtotals = BTreeMap::new();
        for item in &self.items {
            let subtotal = subtotals.entry(item.seller_id.clone()).or_insert(0u64);
            *subtotal = subtotal.saturating_add(item.line_total());
        }
        subtotals
    }

    pub fn sells(&self, seller: &ActorId) -> bool {
        self.items.iter().any(|item| &item.seller_id == seller)
    }

    /// Whether `actor` is a party to this order in the role it claims.
    pub fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Buyer => self.buyer_id == actor.id,
            Role::Seller => self.sells(&actor.id),
            Role::Driver => self.driver_id.as_ref() == Some(&actor.id),
            Role::Admin | Role::System => true,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.status.can_transition_to(next, self.fulfilment())
    }

    fn latest_timestamp(&self) -> DateTime<Utc> {
        [
            self.paid_at,
            self.verified_at,
            self.shipped_at,
            self.completed_at,
            self.cancelled_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, |latest, at| latest.max(at))
    }

    /// Clamps `now` so timestamps never go backwards on this order.
    pub fn monotonic(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.latest_timestamp())
    }

    /// Applies `next` and records the timestamp that belongs to it. Every
    /// timestamp is written at most once.
    pub fn enter(&mut self, next: OrderStatus, now: DateTime<Utc>) {
        let at = self.monotonic(now);
        let slot = match next {
            OrderStatus::WaitingVerification => Some(&mut self.paid_at),
            OrderStatus::Processed => Some(&mut self.verified_at),
            OrderStatus::Shipped | OrderStatus::Delivering => Some(&mut self.shipped_at),
            OrderStatus::Completed => Some(&mut self.completed_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            _ => None,
        };
        if let Some(slot) = slot {
            slot.get_or_insert(at);
        }
        self.status = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(seller: &str, price: u64, quantity: u32, category: ItemCategory) -> OrderItem {
        OrderItem {
            product_id: format!("{seller}-{price}"),
            seller_id: ActorId::new(seller),
            name: "item".to_string(),
            unit_price: price,
            quantity,
            category,
            estimation_days: None,
        }
    }

    fn order(items: Vec<OrderItem>) -> Order {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let draft = OrderDraft {
            buyer_id: ActorId::new("buyer"),
            total_price: items.iter().map(OrderItem::line_total).sum(),
            items,
            delivery_fee: 0,
            voucher: None,
            note: None,
            delivery_address: None,
        };
        Order::from_draft(OrderId::from("o-1"), draft, now)
    }

    #[test]
    fn test_category_labels() {
        assert_eq!("Jasa".parse::<ItemCategory>().unwrap(), ItemCategory::Service);
        assert_eq!(
            "Niaga Food".parse::<ItemCategory>().unwrap(),
            ItemCategory::FoodDelivery
        );
        assert_eq!(
            "Makan".parse::<ItemCategory>().unwrap(),
            ItemCategory::FoodDelivery
        );
        assert!("Pulsa".parse::<ItemCategory>().is_err());
    }

    #[test]
    fn test_seller_subtotals() {
        let order = order(vec![
            item("s1", 1000, 2, ItemCategory::Physical),
            item("s2", 500, 1, ItemCategory::Physical),
            item("s1", 300, 1, ItemCategory::Physical),
        ]);
        let subtotals = order.seller_subtotals();
        assert_eq!(subtotals[&ActorId::new("s1")], 2300);
        assert_eq!(subtotals[&ActorId::new("s2")], 500);
        assert_eq!(order.subtotal(), 2800);
    }

    #[test]
    fn test_fulfilment_paths() {
        let courier = order(vec![item("s1", 1000, 1, ItemCategory::Physical)]);
        assert_eq!(courier.fulfilment(), Fulfilment::Courier);
        assert!(!courier.can_transition_to(OrderStatus::Shipped));

        let food = order(vec![
            item("s1", 1000, 1, ItemCategory::Physical),
            item("s2", 1000, 1, ItemCategory::FoodDelivery),
        ]);
        assert_eq!(food.fulfilment(), Fulfilment::FoodDelivery);
        assert!(
            OrderStatus::Processed
                .can_transition_to(OrderStatus::BeingPrepared, Fulfilment::FoodDelivery)
        );
        assert!(
            !OrderStatus::Processed.can_transition_to(OrderStatus::Shipped, Fulfilment::FoodDelivery)
        );
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for fulfilment in [Fulfilment::Courier, Fulfilment::FoodDelivery] {
            assert!(OrderStatus::Completed.successors(fulfilment).is_empty());
            assert!(OrderStatus::Cancelled.successors(fulfilment).is_empty());
        }
    }

    #[test]
    fn test_enter_sets_timestamp_once_and_monotonic() {
        let mut order = order(vec![item("s1", 1000, 1, ItemCategory::Physical)]);
        let created = order.created_at;

        // A clock running behind never moves timestamps backwards.
        order.enter(OrderStatus::WaitingVerification, created - Duration::hours(1));
        assert_eq!(order.paid_at, Some(created));

        order.enter(OrderStatus::PaymentRejected, created + Duration::hours(1));
        order.enter(OrderStatus::WaitingVerification, created + Duration::hours(2));
        assert_eq!(order.paid_at, Some(created));
        assert_eq!(order.status, OrderStatus::WaitingVerification);
    }

    #[test]
    fn test_party_membership() {
        let mut order = order(vec![item("s1", 1000, 1, ItemCategory::FoodDelivery)]);
        assert!(order.is_party(&Actor::buyer("buyer")));
        assert!(!order.is_party(&Actor::buyer("someone")));
        assert!(order.is_party(&Actor::seller("s1")));
        assert!(!order.is_party(&Actor::seller("s2")));
        assert!(!order.is_party(&Actor::driver("d1")));
        order.driver_id = Some(ActorId::new("d1"));
        assert!(order.is_party(&Actor::driver("d1")));
        assert!(order.is_party(&Actor::admin("root")));
    }
}
