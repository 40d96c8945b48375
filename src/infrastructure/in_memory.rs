use crate::domain::actor::ActorId;
use crate::domain::ledger::{LedgerBatch, LedgerPlan, Posting, PostingKey};
use crate::domain::money::Balance;
use crate::domain::order::{Order, OrderDraft, OrderId, OrderStatus};
use crate::domain::ports::{
    LedgerStore, OrderMutator, OrderStore, ProductStats, RideMutator, RideStore,
};
use crate::domain::ride::{RideOrder, RideRequest, RideStatus};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    rides: HashMap<OrderId, RideOrder>,
    balances: HashMap<ActorId, Balance>,
    postings: Vec<Posting>,
    posting_keys: HashSet<PostingKey>,
    sold: HashMap<String, u64>,
}

impl State {
    fn plan(&self, batch: LedgerBatch) -> Result<LedgerPlan> {
        batch.plan(
            |actor| self.balances.get(actor).copied().unwrap_or_default(),
            |key| self.posting_keys.contains(key),
        )
    }

    fn apply(&mut self, plan: LedgerPlan) -> Vec<Posting> {
        self.balances.extend(plan.balances);
        for posting in &plan.postings {
            self.posting_keys.insert(posting.key.clone());
        }
        self.postings.extend(plan.postings.iter().cloned());
        plan.postings
    }
}

/// A thread-safe in-memory store implementing every port.
///
/// One `RwLock` guards orders, rides and the ledger together, so a status
/// swap and its postings form a single atomic unit. Clones share state.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create(&self, draft: OrderDraft, now: DateTime<Utc>) -> Result<Order> {
        let order = Order::from_draft(OrderId::generate(), draft, now);
        let mut state = self.state.write().await;
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(id).cloned())
    }

    async fn compare_and_swap_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        mutator: OrderMutator,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let current = state
            .orders
            .get(id)
            .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
        if current.status != expected {
            return Err(OrderError::stale(expected, current.status));
        }

        let mut order = current.clone();
        let mut batch = LedgerBatch::new();
        mutator(&mut order, &mut batch)?;
        order.status = next;

        // Nothing is written unless the whole unit validates.
        let plan = state.plan(batch)?;
        state.apply(plan);
        state.orders.insert(id.clone(), order.clone());
        Ok(order)
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| statuses.contains(&order.status))
            .cloned()
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.values().cloned().collect())
    }
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn create_ride(&self, request: RideRequest, now: DateTime<Utc>) -> Result<RideOrder> {
        let ride = RideOrder::new(OrderId::generate(), request, now);
        let mut state = self.state.write().await;
        state.rides.insert(ride.id.clone(), ride.clone());
        Ok(ride)
    }

    async fn get_ride(&self, id: &OrderId) -> Result<Option<RideOrder>> {
        let state = self.state.read().await;
        Ok(state.rides.get(id).cloned())
    }

    async fn update_ride(
        &self,
        id: &OrderId,
        expected: RideStatus,
        mutator: RideMutator,
    ) -> Result<RideOrder> {
        let mut state = self.state.write().await;
        let current = state
            .rides
            .get(id)
            .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
        if current.status != expected {
            return Err(OrderError::stale(expected, current.status));
        }

        let mut ride = current.clone();
        let mut batch = LedgerBatch::new();
        mutator(&mut ride, &mut batch)?;

        let plan = state.plan(batch)?;
        state.apply(plan);
        state.rides.insert(id.clone(), ride.clone());
        Ok(ride)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit(&self, batch: LedgerBatch) -> Result<Vec<Posting>> {
        let mut state = self.state.write().await;
        let plan = state.plan(batch)?;
        Ok(state.apply(plan))
    }

    async fn balance(&self, actor: &ActorId) -> Result<Balance> {
        let state = self.state.read().await;
        Ok(state.balances.get(actor).copied().unwrap_or_default())
    }

    async fn balances(&self) -> Result<Vec<(ActorId, Balance)>> {
        let state = self.state.read().await;
        let mut balances: Vec<_> = state
            .balances
            .iter()
            .map(|(actor, balance)| (actor.clone(), *balance))
            .collect();
        balances.sort();
        Ok(balances)
    }

    async fn postings(&self, actor: &ActorId) -> Result<Vec<Posting>> {
        let state = self.state.read().await;
        Ok(state
            .postings
            .iter()
            .filter(|posting| &posting.actor == actor)
            .cloned()
            .collect())
    }

    async fn posting(&self, key: &PostingKey) -> Result<Option<Posting>> {
        let state = self.state.read().await;
        Ok(state
            .postings
            .iter()
            .find(|posting| &posting.key == key)
            .cloned())
    }
}

#[async_trait]
impl ProductStats for InMemoryStore {
    async fn record_sale(&self, product_id: &str, quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        *state.sold.entry(product_id.to_string()).or_insert(0) += u64::from(quantity);
        Ok(())
    }

    async fn sold(&self, product_id: &str) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.sold.get(product_id).copied().unwrap_or(0))
    }
}
