use super::actor::ActorId;
use super::ledger::{LedgerBatch, Posting, PostingKey, PostingOutcome};
use super::money::{Amount, Balance};
use super::notification::Notification;
use super::order::{Order, OrderDraft, OrderId, OrderStatus};
use super::ride::{RideOrder, RideRequest, RideStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Edits an order inside the store's atomic unit and stages ledger postings
/// that commit together with it.
pub type OrderMutator = Box<dyn FnOnce(&mut Order, &mut LedgerBatch) -> Result<()> + Send>;

/// Same as [`OrderMutator`] for ride orders. The mutator sets the new status.
pub type RideMutator = Box<dyn FnOnce(&mut RideOrder, &mut LedgerBatch) -> Result<()> + Send>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `waiting_payment` with a fresh id.
    async fn create(&self, draft: OrderDraft, now: DateTime<Utc>) -> Result<Order>;
    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Runs `mutator` and moves the order to `next` only if its stored status
    /// is still `expected`, otherwise fails with `StaleState`. The order write
    /// and every staged posting are applied together or not at all.
    async fn compare_and_swap_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        mutator: OrderMutator,
    ) -> Result<Order>;

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn create_ride(&self, request: RideRequest, now: DateTime<Utc>) -> Result<RideOrder>;
    async fn get_ride(&self, id: &OrderId) -> Result<Option<RideOrder>>;

    /// Applies `mutator` if the stored status is still `expected`.
    async fn update_ride(
        &self,
        id: &OrderId,
        expected: RideStatus,
        mutator: RideMutator,
    ) -> Result<RideOrder>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Applies every posting of `batch` whose key has not been seen before,
    /// atomically. Returns the postings that were actually applied.
    async fn commit(&self, batch: LedgerBatch) -> Result<Vec<Posting>>;
    async fn balance(&self, actor: &ActorId) -> Result<Balance>;
    async fn balances(&self) -> Result<Vec<(ActorId, Balance)>>;
    async fn postings(&self, actor: &ActorId) -> Result<Vec<Posting>>;
    async fn posting(&self, key: &PostingKey) -> Result<Option<Posting>>;

    async fn credit(
        &self,
        actor: &ActorId,
        amount: Amount,
        key: PostingKey,
        at: DateTime<Utc>,
    ) -> Result<PostingOutcome> {
        let mut batch = LedgerBatch::new();
        batch.credit(actor.clone(), amount, key, at);
        Ok(outcome(self.commit(batch).await?))
    }

    /// Fails with `InsufficientFunds` rather than going negative.
    async fn debit(
        &self,
        actor: &ActorId,
        amount: Amount,
        key: PostingKey,
        at: DateTime<Utc>,
    ) -> Result<PostingOutcome> {
        let mut batch = LedgerBatch::new();
        batch.debit(actor.clone(), amount, key, at);
        Ok(outcome(self.commit(batch).await?))
    }
}

fn outcome(applied: Vec<Posting>) -> PostingOutcome {
    if applied.is_empty() {
        PostingOutcome::Replayed
    } else {
        PostingOutcome::Applied
    }
}

/// Per-product aggregates. Best effort, not part of settlement's atomic unit.
#[async_trait]
pub trait ProductStats: Send + Sync {
    async fn record_sale(&self, product_id: &str, quantity: u32) -> Result<()>;
    async fn sold(&self, product_id: &str) -> Result<u64>;
}

/// Everything the application layer persists through.
pub trait Repository: OrderStore + RideStore + LedgerStore + ProductStats {}

impl<T> Repository for T where T: OrderStore + RideStore + LedgerStore + ProductStats {}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// At-least-once; implementations must tolerate duplicates.
    async fn emit(&self, notification: Notification) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type RepositoryRef = Arc<dyn Repository>;
pub type NotifierRef = Arc<dyn NotificationSink>;
pub type ClockRef = Arc<dyn Clock>;
