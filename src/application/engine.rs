use crate::config::PolicyConfig;
use crate::domain::actor::{Actor, ActorId, Role};
use crate::domain::cart::Cart;
use crate::domain::ledger::{LedgerBatch, PostingKey};
use crate::domain::money::Amount;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::{
    Fulfilment, ItemCategory, Order, OrderDraft, OrderId, OrderStatus, PaymentMethod,
};
use crate::domain::policy::{self, DeadlineStatus, FeePolicy, Quote};
use crate::domain::ports::{ClockRef, NotifierRef, OrderStore, ProductStats, RepositoryRef};
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::btree_map::IntoKeys;
use tracing::{debug, info, warn};

/// Who asked for an order to be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Buyer,
    Timer,
}

/// The order state machine.
///
/// Every mutation reads the order, checks the actor and the transition, then
/// hands a mutator to the store's compare-and-swap so the status write and
/// any ledger postings commit as one unit. Notifications and sold counters
/// follow on a best-effort basis.
pub struct OrderEngine {
    repo: RepositoryRef,
    notifier: NotifierRef,
    clock: ClockRef,
    config: PolicyConfig,
}

impl OrderEngine {
    /// Creates a new `OrderEngine`.
    ///
    /// # Arguments
    ///
    /// * `repo` - Persistence for orders, the ledger and product stats.
    /// * `notifier` - Receives outbound events.
    /// * `clock` - The single time source for timestamps and deadlines.
    /// * `config` - Fee and deadline policy.
    pub fn new(
        repo: RepositoryRef,
        notifier: NotifierRef,
        clock: ClockRef,
        config: PolicyConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn quote(&self, cart: &Cart) -> Result<Quote> {
        policy::quote(cart, &self.config.fees)
    }

    pub async fn order(&self, id: &OrderId) -> Result<Order> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    /// Places the selected lines of `cart` as a new order.
    pub async fn create_order(&self, actor: &Actor, cart: Cart) -> Result<Order> {
        if actor.role != Role::Buyer || actor.id != cart.buyer_id {
            return Err(OrderError::Unauthorized(format!(
                "{} cannot check out for {}",
                actor.id, cart.buyer_id
            )));
        }
        validate_cart(&cart)?;

        let quote = self.quote(&cart)?;
        let draft = OrderDraft {
            buyer_id: cart.buyer_id.clone(),
            items: cart.selected().map(|line| line.item.clone()).collect(),
            delivery_fee: quote.delivery_fee,
            voucher: quote.voucher,
            note: cart.note.filter(|note| !note.trim().is_empty()),
            delivery_address: cart.delivery_address,
            total_price: quote.total_price,
        };

        let order = self.repo.create(draft, self.now()).await?;
        info!(
            order_id = %order.id,
            buyer = %order.buyer_id,
            total = order.total_price,
            "order placed"
        );
        self.notify(sellers(&order), NotificationKind::OrderPlaced, &order)
            .await;
        Ok(order)
    }

    /// Attaches a transfer proof and queues the order for verification.
    pub async fn submit_payment_proof(
        &self,
        actor: &Actor,
        id: &OrderId,
        proof: &str,
    ) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        let proof = proof.trim();
        if proof.is_empty() {
            return Err(OrderError::MissingProof);
        }
        ensure_transition(&order, OrderStatus::WaitingVerification)?;

        let proof = proof.to_string();
        let order = self
            .transition(
                id,
                order.status,
                OrderStatus::WaitingVerification,
                move |order, _, _| {
                    order.payment = Some(PaymentMethod::Transfer { proof });
                    Ok(())
                },
            )
            .await?;
        self.notify(
            [ActorId::admin_desk()],
            NotificationKind::PaymentSubmitted,
            &order,
        )
        .await;
        Ok(order)
    }

    /// Pays from the buyer's wallet. The debited total sits outside every
    /// balance until settlement, and the order skips manual verification.
    pub async fn pay_with_wallet(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        if !matches!(
            order.status,
            OrderStatus::WaitingPayment | OrderStatus::PaymentRejected
        ) {
            return Err(OrderError::transition(order.status, OrderStatus::Processed));
        }

        let order = self
            .transition(
                id,
                order.status,
                OrderStatus::Processed,
                |order, batch, now| {
                    if let Ok(total) = Amount::new(order.total_price) {
                        batch.debit(
                            order.buyer_id.clone(),
                            total,
                            PostingKey::order(&order.id, "escrow"),
                            now,
                        );
                    }
                    order.payment = Some(PaymentMethod::Wallet);
                    let at = order.monotonic(now);
                    order.paid_at.get_or_insert(at);
                    Ok(())
                },
            )
            .await?;
        self.notify(sellers(&order), NotificationKind::PaymentVerified, &order)
            .await;
        Ok(order)
    }

    pub async fn verify_payment(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Admin, Role::System])?;
        ensure_status(&order, OrderStatus::WaitingVerification, OrderStatus::Processed)?;

        let order = self
            .transition(
                id,
                OrderStatus::WaitingVerification,
                OrderStatus::Processed,
                |_, _, _| Ok(()),
            )
            .await?;
        let targets = sellers(&order).chain([order.buyer_id.clone()]);
        self.notify(targets, NotificationKind::PaymentVerified, &order)
            .await;
        Ok(order)
    }

    /// Rejects the transfer proof; the buyer has to submit a new one.
    pub async fn reject_payment(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Admin])?;
        ensure_status(
            &order,
            OrderStatus::WaitingVerification,
            OrderStatus::PaymentRejected,
        )?;

        let order = self
            .transition(
                id,
                OrderStatus::WaitingVerification,
                OrderStatus::PaymentRejected,
                |order, _, _| {
                    order.payment = None;
                    Ok(())
                },
            )
            .await?;
        self.notify(
            [order.buyer_id.clone()],
            NotificationKind::PaymentRejected,
            &order,
        )
        .await;
        Ok(order)
    }

    /// Courier orders: the seller hands the goods to the courier.
    pub async fn ship(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        self.seller_step(actor, id, OrderStatus::Processed, OrderStatus::Shipped)
            .await
    }

    /// Food orders: the seller starts cooking.
    pub async fn start_preparing(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        self.seller_step(actor, id, OrderStatus::Processed, OrderStatus::BeingPrepared)
            .await
    }

    /// Food orders: the food waits for the driver.
    pub async fn mark_ready(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        self.seller_step(
            actor,
            id,
            OrderStatus::BeingPrepared,
            OrderStatus::ReadyForPickup,
        )
        .await
    }

    async fn seller_step(
        &self,
        actor: &Actor,
        id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Seller])?;
        ensure_status(&order, from, to)?;
        ensure_transition(&order, to)?;

        let order = self.transition(id, from, to, |_, _, _| Ok(())).await?;
        let kind = match to {
            OrderStatus::Shipped => NotificationKind::OrderShipped,
            OrderStatus::BeingPrepared => NotificationKind::OrderPreparing,
            _ => NotificationKind::ReadyForPickup,
        };
        let targets = [order.buyer_id.clone()]
            .into_iter()
            .chain(order.driver_id.clone());
        self.notify(targets, kind, &order).await;
        Ok(order)
    }

    /// A driver takes a food order. Only the first driver wins.
    pub async fn assign_driver(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        if actor.role != Role::Driver {
            return Err(OrderError::Unauthorized(format!(
                "{} is not a driver",
                actor.id
            )));
        }
        let order = self.order(id).await?;
        if order.fulfilment() != Fulfilment::FoodDelivery {
            return Err(OrderError::transition(order.status, "driver_assigned"));
        }
        if order.driver_id.is_some() {
            return Err(OrderError::AlreadyAssigned);
        }
        if !matches!(
            order.status,
            OrderStatus::Processed | OrderStatus::BeingPrepared | OrderStatus::ReadyForPickup
        ) {
            return Err(OrderError::transition(order.status, "driver_assigned"));
        }

        let driver = actor.id.clone();
        let result = self
            .transition(id, order.status, order.status, move |order, _, _| {
                if order.driver_id.is_some() {
                    return Err(OrderError::AlreadyAssigned);
                }
                order.driver_id = Some(driver);
                Ok(())
            })
            .await;

        let order = match result {
            Ok(order) => order,
            Err(e @ OrderError::StaleState { .. }) => {
                if self.order(id).await?.driver_id.is_some() {
                    return Err(OrderError::AlreadyAssigned);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let targets = sellers(&order).chain([order.buyer_id.clone()]);
        self.notify(targets, NotificationKind::DriverAssigned, &order)
            .await;
        Ok(order)
    }

    /// The assigned driver picks the food up and sets off.
    pub async fn start_delivery(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Driver])?;
        ensure_status(&order, OrderStatus::ReadyForPickup, OrderStatus::Delivering)?;

        let order = self
            .transition(
                id,
                OrderStatus::ReadyForPickup,
                OrderStatus::Delivering,
                |_, _, _| Ok(()),
            )
            .await?;
        let targets = sellers(&order).chain([order.buyer_id.clone()]);
        self.notify(targets, NotificationKind::OrderDelivering, &order)
            .await;
        Ok(order)
    }

    /// The buyer confirms receipt, releasing funds to sellers and driver.
    pub async fn confirm_receipt(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        self.complete(order, Completion::Buyer).await
    }

    /// Completes a dispatched order whose grace period has run out.
    pub async fn auto_complete(&self, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        self.complete(order, Completion::Timer).await
    }

    async fn complete(&self, order: Order, trigger: Completion) -> Result<Order> {
        if order.funds_released || order.status == OrderStatus::Completed {
            return Err(OrderError::AlreadySettled);
        }
        ensure_transition(&order, OrderStatus::Completed)?;

        let fees = self.config.fees.clone();
        let deadlines = self.config.deadlines.clone();
        let result = self
            .transition(
                &order.id,
                order.status,
                OrderStatus::Completed,
                move |order, batch, now| {
                    if trigger == Completion::Timer && !deadlines.is_due(order, now) {
                        return Err(OrderError::transition(
                            order.status,
                            "completed before grace period ends",
                        ));
                    }
                    settle(order, batch, &fees, now)
                },
            )
            .await;

        // A concurrent completion that won the swap reads as already settled.
        let completed = match result {
            Ok(completed) => completed,
            Err(e @ OrderError::StaleState { .. }) => {
                if self.order(&order.id).await?.funds_released {
                    return Err(OrderError::AlreadySettled);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        info!(
            order_id = %completed.id,
            trigger = ?trigger,
            total = completed.total_price,
            "funds released"
        );

        let targets = [completed.buyer_id.clone()]
            .into_iter()
            .chain(sellers(&completed))
            .chain(completed.driver_id.clone());
        self.notify(targets, NotificationKind::OrderCompleted, &completed)
            .await;
        for item in &completed.items {
            if let Err(e) = self.repo.record_sale(&item.product_id, item.quantity).await {
                warn!(product_id = %item.product_id, error = %e, "failed to update sold counter");
            }
        }
        Ok(completed)
    }

    /// Cancels an order that has not been dispatched yet. Wallet payments
    /// are credited back to the buyer in the same unit.
    pub async fn cancel(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer, Role::Admin])?;
        if order.status.is_dispatched() || order.status.is_terminal() {
            return Err(OrderError::CannotCancel(order.status));
        }

        let order = self
            .transition(
                id,
                order.status,
                OrderStatus::Cancelled,
                |order, batch, now| {
                    if order.payment == Some(PaymentMethod::Wallet) {
                        batch.credit_value(
                            order.buyer_id.clone(),
                            order.total_price,
                            PostingKey::order(&order.id, "refund"),
                            now,
                        );
                    }
                    Ok(())
                },
            )
            .await?;
        let targets = [order.buyer_id.clone()]
            .into_iter()
            .chain(sellers(&order))
            .chain(order.driver_id.clone());
        self.notify(targets, NotificationKind::OrderCancelled, &order)
            .await;
        Ok(order)
    }

    pub async fn mark_reviewed(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        if order.status != OrderStatus::Completed {
            return Err(OrderError::transition(order.status, "reviewed"));
        }
        if order.is_reviewed {
            return Err(OrderError::AlreadyReviewed);
        }

        self.transition(
            id,
            OrderStatus::Completed,
            OrderStatus::Completed,
            |order, _, _| {
                if order.is_reviewed {
                    return Err(OrderError::AlreadyReviewed);
                }
                order.is_reviewed = true;
                Ok(())
            },
        )
        .await
    }

    /// Soft-deletes a finished order from the buyer's history.
    pub async fn hide(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        if !order.status.is_terminal() {
            return Err(OrderError::transition(order.status, "hidden"));
        }

        self.transition(id, order.status, order.status, |order, _, _| {
            order.hidden = true;
            Ok(())
        })
        .await
    }

    pub async fn deadline_status(&self, id: &OrderId) -> Result<DeadlineStatus> {
        let order = self.order(id).await?;
        Ok(policy::deadline_status(&order, self.now()))
    }

    /// Hands an overdue service order to the admins. There is no state or
    /// ledger change; disputes are resolved outside the system.
    pub async fn request_refund(&self, actor: &Actor, id: &OrderId) -> Result<DeadlineStatus> {
        let order = self.order(id).await?;
        authorize(&order, actor, &[Role::Buyer])?;
        let status = policy::deadline_status(&order, self.now());
        let DeadlineStatus::Overdue { deadline } = status else {
            return Err(OrderError::transition(order.status, "refund_requested"));
        };

        info!(order_id = %order.id, %deadline, "refund requested");
        self.emit(
            Notification::new(
                ActorId::admin_desk(),
                NotificationKind::RefundRequested,
                order.id.clone(),
            )
            .with_payload(json!({
                "buyer": order.buyer_id,
                "deadline": deadline,
                "total_price": order.total_price,
            })),
        )
        .await;
        Ok(status)
    }

    /// Dispatched orders whose grace period has elapsed at `now`.
    pub async fn due_for_auto_completion(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let dispatched = self
            .repo
            .list_by_status(&[OrderStatus::Shipped, OrderStatus::Delivering])
            .await?;
        Ok(dispatched
            .into_iter()
            .filter(|order| self.config.deadlines.is_due(order, now))
            .collect())
    }

    async fn transition<F>(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        apply: F,
    ) -> Result<Order>
    where
        F: FnOnce(&mut Order, &mut LedgerBatch, DateTime<Utc>) -> Result<()> + Send + 'static,
    {
        let now = self.now();
        let result = self
            .repo
            .compare_and_swap_status(
                id,
                expected,
                next,
                Box::new(move |order, batch| {
                    apply(order, batch, now)?;
                    order.enter(next, now);
                    Ok(())
                }),
            )
            .await;

        match &result {
            Ok(_) => info!(order_id = %id, from = %expected, to = %next, "order transition"),
            Err(e) if e.is_benign() => {
                warn!(order_id = %id, from = %expected, to = %next, error = %e, "transition lost")
            }
            Err(e) => debug!(order_id = %id, from = %expected, to = %next, error = %e, "transition refused"),
        }
        result
    }

    async fn notify<I>(&self, targets: I, kind: NotificationKind, order: &Order)
    where
        I: IntoIterator<Item = ActorId>,
    {
        let payload = json!({
            "status": order.status,
            "total_price": order.total_price,
        });
        let mut seen = Vec::new();
        for target in targets {
            if seen.contains(&target) {
                continue;
            }
            seen.push(target.clone());
            self.emit(
                Notification::new(target, kind, order.id.clone()).with_payload(payload.clone()),
            )
            .await;
        }
    }

    async fn emit(&self, notification: Notification) {
        let key = notification.event_key();
        if let Err(e) = self.notifier.emit(notification).await {
            warn!(event = %key, error = %e, "failed to emit notification");
        }
    }
}

fn validate_cart(cart: &Cart) -> Result<()> {
    let mut selected = cart.selected().peekable();
    if selected.peek().is_none() {
        return Err(OrderError::InvalidOrder(
            "no items selected for checkout".to_string(),
        ));
    }
    let mut has_food = false;
    for line in selected {
        if line.item.quantity == 0 {
            return Err(OrderError::InvalidOrder(format!(
                "quantity of '{}' must be positive",
                line.item.product_id
            )));
        }
        has_food |= line.item.category == ItemCategory::FoodDelivery;
    }
    let has_address = cart
        .delivery_address
        .as_deref()
        .is_some_and(|address| !address.trim().is_empty());
    if has_food && !has_address {
        return Err(OrderError::InvalidOrder(
            "food delivery requires a delivery address".to_string(),
        ));
    }
    Ok(())
}

fn authorize(order: &Order, actor: &Actor, roles: &[Role]) -> Result<()> {
    if !roles.contains(&actor.role) {
        return Err(OrderError::Unauthorized(format!(
            "role {} may not perform this action",
            actor.role
        )));
    }
    if !order.is_party(actor) {
        return Err(OrderError::Unauthorized(format!(
            "{} is not a party to order {}",
            actor.id, order.id
        )));
    }
    Ok(())
}

fn ensure_status(order: &Order, expected: OrderStatus, next: OrderStatus) -> Result<()> {
    if order.status == expected {
        Ok(())
    } else {
        Err(OrderError::transition(order.status, next))
    }
}

fn ensure_transition(order: &Order, next: OrderStatus) -> Result<()> {
    if order.can_transition_to(next) {
        Ok(())
    } else {
        Err(OrderError::transition(order.status, next))
    }
}

/// Stages settlement postings. Runs inside the completion's atomic unit, so
/// the `funds_released` check and the credits cannot interleave with another
/// completion.
fn settle(
    order: &mut Order,
    batch: &mut LedgerBatch,
    fees: &FeePolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    if order.funds_released {
        return Err(OrderError::AlreadySettled);
    }
    let split = policy::settlement(order, fees);
    for share in &split.sellers {
        batch.credit_value(
            share.seller.clone(),
            share.net_income,
            PostingKey::order(&order.id, "seller").for_actor(&share.seller),
            now,
        );
        batch.credit_value(
            ActorId::platform(),
            share.admin_fee,
            PostingKey::order(&order.id, "admin-fee").for_actor(&share.seller),
            now,
        );
    }
    let courier = order.driver_id.clone().unwrap_or_else(ActorId::platform);
    batch.credit_value(
        courier,
        split.driver_fee,
        PostingKey::order(&order.id, "delivery-fee"),
        now,
    );
    order.funds_released = true;
    Ok(())
}

fn sellers(order: &Order) -> IntoKeys<ActorId, u64> {
    order.seller_subtotals().into_keys()
}
