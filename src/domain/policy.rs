//! Pure pricing, settlement and deadline rules.
//!
//! Nothing in here touches storage or the clock; callers pass `now` in.

use super::actor::ActorId;
use super::cart::{Cart, CartItem};
use super::money::Rate;
use super::order::{ItemCategory, Order, OrderStatus, Voucher};
use crate::error::{OrderError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Marketplace fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Subtotals strictly below this pay `low_admin_fee`.
    pub admin_fee_threshold: u64,
    pub low_admin_fee: u64,
    pub high_admin_fee: u64,
    /// Flat fee charged once per order containing food-delivery items.
    pub delivery_fee: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            admin_fee_threshold: 15_000,
            low_admin_fee: 500,
            high_admin_fee: 2_000,
            delivery_fee: 3_000,
        }
    }
}

impl FeePolicy {
    pub fn admin_fee(&self, subtotal: u64) -> u64 {
        if subtotal < self.admin_fee_threshold {
            self.low_admin_fee
        } else {
            self.high_admin_fee
        }
    }

    pub fn delivery_fee<'a, I>(&self, items: I) -> u64
    where
        I: IntoIterator<Item = &'a ItemCategory>,
    {
        if items
            .into_iter()
            .any(|category| *category == ItemCategory::FoodDelivery)
        {
            self.delivery_fee
        } else {
            0
        }
    }
}

/// Looks up the voucher for `applied_code` among the currently selected lines.
///
/// The discount is capped at the anchor seller's selected subtotal, so it
/// never exceeds the order subtotal and the seller absorbing it never goes
/// negative.
pub fn voucher_discount(items: &[CartItem], applied_code: Option<&str>) -> Option<Voucher> {
    let code = applied_code?.trim();
    if code.is_empty() {
        return None;
    }
    let anchor = items.iter().find(|line| {
        line.selected
            && line
                .voucher
                .as_ref()
                .is_some_and(|voucher| voucher.code == code)
    })?;
    let amount = anchor.voucher.as_ref()?.amount;
    let seller_subtotal: u64 = items
        .iter()
        .filter(|line| line.selected && line.item.seller_id == anchor.item.seller_id)
        .map(|line| line.item.line_total())
        .fold(0, u64::saturating_add);
    let discount = amount.min(seller_subtotal);
    (discount > 0).then(|| Voucher {
        code: code.to_string(),
        discount_amount: discount,
        anchor_item_id: anchor.item.product_id.clone(),
    })
}

/// `subtotal + delivery_fee - discount`, with the discount floored at the subtotal.
/// `None` when the sum does not fit in a `u64`.
pub fn total_price(subtotal: u64, delivery_fee: u64, discount: u64) -> Option<u64> {
    subtotal.saturating_sub(discount).checked_add(delivery_fee)
}

/// Prices a cart's selected lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub subtotal: u64,
    pub delivery_fee: u64,
    pub voucher: Option<Voucher>,
    pub total_price: u64,
}

///
/// Fails with `InvalidOrder` when a line total or the order total overflows.
pub fn quote(cart: &Cart, fees: &FeePolicy) -> Result<Quote> {
    let overflow = || OrderError::InvalidOrder("order total overflows".to_string());
    let subtotal = cart.selected().try_fold(0u64, |sum, line| {
        line.item
            .checked_line_total()
            .and_then(|total| sum.checked_add(total))
            .ok_or_else(overflow)
    })?;
    let delivery_fee = fees.delivery_fee(cart.selected().map(|line| &line.item.category));
    let voucher = voucher_discount(&cart.items, cart.voucher_code.as_deref());
    let discount = voucher.as_ref().map_or(0, |v| v.discount_amount);
    let total_price = total_price(subtotal, delivery_fee, discount).ok_or_else(overflow)?;
    Ok(Quote {
        subtotal,
        delivery_fee,
        voucher,
        total_price,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerShare {
    pub seller: ActorId,
    /// Seller's line totals less any voucher it absorbs.
    pub subtotal: u64,
    pub admin_fee: u64,
    pub net_income: u64,
}

/// How an order's total is split at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub sellers: Vec<SellerShare>,
    pub driver_fee: u64,
}

impl Settlement {
    pub fn admin_fees(&self) -> u64 {
        self.sellers.iter().map(|share| share.admin_fee).sum()
    }

    pub fn seller_income(&self) -> u64 {
        self.sellers.iter().map(|share| share.net_income).sum()
    }

    /// Always equals the order's total price.
    pub fn distributed(&self) -> u64 {
        self.seller_income() + self.admin_fees() + self.driver_fee
    }
}

/// Splits the order between its sellers, the driver and the platform.
///
/// The voucher discount comes out of the anchor item's seller before that
/// seller's admin fee is computed; the fee never exceeds the subtotal it is
/// charged on.
pub fn settlement(order: &Order, fees: &FeePolicy) -> Settlement {
    let anchor_seller = order.voucher.as_ref().and_then(|voucher| {
        order
            .items
            .iter()
            .find(|item| item.product_id == voucher.anchor_item_id)
            .map(|item| (item.seller_id.clone(), voucher.discount_amount))
    });

    let sellers = order
        .seller_subtotals()
        .into_iter()
        .map(|(seller, gross)| {
            let discount = match &anchor_seller {
                Some((anchor, discount)) if *anchor == seller => *discount,
                _ => 0,
            };
            let subtotal = gross.saturating_sub(discount);
            let admin_fee = fees.admin_fee(subtotal).min(subtotal);
            SellerShare {
                seller,
                subtotal,
                admin_fee,
                net_income: subtotal - admin_fee,
            }
        })
        .collect();

    Settlement {
        sellers,
        driver_fee: order.delivery_fee,
    }
}

/// Auto-completion grace periods and service deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlinePolicy {
    pub physical_grace_hours: u32,
    pub service_grace_hours: u32,
    pub food_grace_hours: u32,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            physical_grace_hours: 72,
            service_grace_hours: 24,
            food_grace_hours: 24,
        }
    }
}

impl DeadlinePolicy {
    pub fn grace_for(&self, category: ItemCategory) -> Duration {
        let hours = match category {
            ItemCategory::Physical => self.physical_grace_hours,
            ItemCategory::Service => self.service_grace_hours,
            ItemCategory::FoodDelivery => self.food_grace_hours,
        };
        Duration::hours(i64::from(hours))
    }

    /// The longest grace period among the order's items.
    pub fn grace(&self, order: &Order) -> Duration {
        order
            .items
            .iter()
            .map(|item| self.grace_for(item.category))
            .max()
            .unwrap_or_else(|| self.grace_for(ItemCategory::Physical))
    }

    /// When the sweeper may complete a dispatched order on the buyer's behalf.
    pub fn auto_complete_at(&self, order: &Order) -> Option<DateTime<Utc>> {
        if !order.status.is_dispatched() {
            return None;
        }
        order.shipped_at.map(|shipped| shipped + self.grace(order))
    }

    pub fn is_due(&self, order: &Order, now: DateTime<Utc>) -> bool {
        self.auto_complete_at(order).is_some_and(|due| due <= now)
    }
}

/// Pledged completion deadline of a service order: verification time plus
/// the longest estimation among its service items.
pub fn service_deadline(order: &Order) -> Option<DateTime<Utc>> {
    let days = order
        .items
        .iter()
        .filter(|item| item.category == ItemCategory::Service)
        .filter_map(|item| item.estimation_days)
        .max()?;
    order
        .verified_at
        .map(|verified| verified + Duration::hours(24 * i64::from(days)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeadlineStatus {
    NotApplicable,
    OnTrack { deadline: DateTime<Utc> },
    Overdue { deadline: DateTime<Utc> },
}

pub fn deadline_status(order: &Order, now: DateTime<Utc>) -> DeadlineStatus {
    let open = matches!(order.status, OrderStatus::Processed | OrderStatus::Shipped);
    match service_deadline(order) {
        Some(deadline) if open && now > deadline => DeadlineStatus::Overdue { deadline },
        Some(deadline) if open => DeadlineStatus::OnTrack { deadline },
        _ => DeadlineStatus::NotApplicable,
    }
}

/// Ride-hailing policy. Kept apart from the marketplace fees: rides pay a
/// commission on the whole fare instead of a stepped admin fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidePolicy {
    pub offer_window_secs: u32,
    pub commission: Rate,
}

impl Default for RidePolicy {
    fn default() -> Self {
        Self {
            offer_window_secs: 15,
            commission: Rate::new(dec!(0.10)).unwrap_or(Rate::ZERO),
        }
    }
}

impl RidePolicy {
    pub fn offer_window(&self) -> Duration {
        Duration::seconds(i64::from(self.offer_window_secs))
    }

    pub fn ride_fee(&self, fare: u64) -> u64 {
        self.commission.apply(fare)
    }
}
