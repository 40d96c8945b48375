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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for order documents.
pub const CF_ORDERS: &str = "orders";
/// Column Family for ride documents.
pub const CF_RIDES: &str = "rides";
/// Column Family for actor balances.
pub const CF_BALANCES: &str = "balances";
/// Column Family for ledger postings, keyed by posting key.
pub const CF_POSTINGS: &str = "postings";
/// Column Family for per-product sold counters.
pub const CF_PRODUCTS: &str = "products";

const COLUMN_FAMILIES: [&str; 5] = [CF_ORDERS, CF_RIDES, CF_BALANCES, CF_POSTINGS, CF_PRODUCTS];

/// A persistent store implementation using RocksDB.
///
/// Every read-modify-write runs under one writer lock and lands as a single
/// `WriteBatch`, so an order's status swap and its ledger postings are
/// atomic on disk as well.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| OrderError::Storage(format!("column family '{name}' not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn stage<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn stored_balance(&self, actor: &ActorId) -> Result<Balance> {
        Ok(self
            .read(CF_BALANCES, actor.as_str().as_bytes())?
            .unwrap_or_default())
    }

    fn key_applied(&self, key: &PostingKey) -> Result<bool> {
        let cf = self.cf(CF_POSTINGS)?;
        Ok(self.db.get_pinned_cf(cf, key.as_str().as_bytes())?.is_some())
    }

    /// Resolves `batch` against what is on disk. Storage errors surface
    /// instead of being read as "no balance".
    fn plan(&self, batch: LedgerBatch) -> Result<LedgerPlan> {
        let mut balances = std::collections::HashMap::new();
        let mut applied = std::collections::HashSet::new();
        for posting in batch.postings() {
            if !balances.contains_key(&posting.actor) {
                balances.insert(posting.actor.clone(), self.stored_balance(&posting.actor)?);
            }
            if self.key_applied(&posting.key)? {
                applied.insert(posting.key.clone());
            }
        }
        batch.plan(
            |actor| balances.get(actor).copied().unwrap_or_default(),
            |key| applied.contains(key),
        )
    }

    fn stage_plan(&self, batch: &mut WriteBatch, plan: &LedgerPlan) -> Result<()> {
        for (actor, balance) in &plan.balances {
            self.stage(batch, CF_BALANCES, actor.as_str().as_bytes(), balance)?;
        }
        for posting in &plan.postings {
            self.stage(batch, CF_POSTINGS, posting.key.as_str().as_bytes(), posting)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn create(&self, draft: OrderDraft, now: DateTime<Utc>) -> Result<Order> {
        let order = Order::from_draft(OrderId::generate(), draft, now);
        let _guard = self.writer.lock().await;
        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_ORDERS, order.id.as_str().as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(order)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        self.read(CF_ORDERS, id.as_str().as_bytes())
    }

    async fn compare_and_swap_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        mutator: OrderMutator,
    ) -> Result<Order> {
        let _guard = self.writer.lock().await;
        let mut order: Order = self
            .read(CF_ORDERS, id.as_str().as_bytes())?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
        if order.status != expected {
            return Err(OrderError::stale(expected, order.status));
        }

        let mut ledger = LedgerBatch::new();
        mutator(&mut order, &mut ledger)?;
        order.status = next;
        let plan = self.plan(ledger)?;

        let mut batch = WriteBatch::default();
        self.stage_plan(&mut batch, &plan)?;
        self.stage(&mut batch, CF_ORDERS, id.as_str().as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(order)
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        Ok(self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|order| statuses.contains(&order.status))
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.scan(CF_ORDERS)
    }
}

#[async_trait]
impl RideStore for RocksDBStore {
    async fn create_ride(&self, request: RideRequest, now: DateTime<Utc>) -> Result<RideOrder> {
        let ride = RideOrder::new(OrderId::generate(), request, now);
        let _guard = self.writer.lock().await;
        let mut batch = WriteBatch::default();
        self.stage(&mut batch, CF_RIDES, ride.id.as_str().as_bytes(), &ride)?;
        self.db.write(batch)?;
        Ok(ride)
    }

    async fn get_ride(&self, id: &OrderId) -> Result<Option<RideOrder>> {
        self.read(CF_RIDES, id.as_str().as_bytes())
    }

    async fn update_ride(
        &self,
        id: &OrderId,
        expected: RideStatus,
        mutator: RideMutator,
    ) -> Result<RideOrder> {
        let _guard = self.writer.lock().await;
        let mut ride: RideOrder = self
            .read(CF_RIDES, id.as_str().as_bytes())?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
        if ride.status != expected {
            return Err(OrderError::stale(expected, ride.status));
        }

        let mut ledger = LedgerBatch::new();
        mutator(&mut ride, &mut ledger)?;
        let plan = self.plan(ledger)?;

        let mut batch = WriteBatch::default();
        self.stage_plan(&mut batch, &plan)?;
        self.stage(&mut batch, CF_RIDES, id.as_str().as_bytes(), &ride)?;
        self.db.write(batch)?;
        Ok(ride)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn commit(&self, ledger: LedgerBatch) -> Result<Vec<Posting>> {
        let _guard = self.writer.lock().await;
        let plan = self.plan(ledger)?;
        let mut batch = WriteBatch::default();
        self.stage_plan(&mut batch, &plan)?;
        self.db.write(batch)?;
        Ok(plan.postings)
    }

    async fn balance(&self, actor: &ActorId) -> Result<Balance> {
        self.stored_balance(actor)
    }

    async fn balances(&self) -> Result<Vec<(ActorId, Balance)>> {
        let cf = self.cf(CF_BALANCES)?;
        let mut balances = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let actor = ActorId::new(String::from_utf8_lossy(&key).into_owned());
            balances.push((actor, serde_json::from_slice(&value)?));
        }
        balances.sort();
        Ok(balances)
    }

    async fn postings(&self, actor: &ActorId) -> Result<Vec<Posting>> {
        let mut postings: Vec<Posting> = self
            .scan::<Posting>(CF_POSTINGS)?
            .into_iter()
            .filter(|posting| &posting.actor == actor)
            .collect();
        postings.sort_by(|a, b| a.at.cmp(&b.at));
        Ok(postings)
    }

    async fn posting(&self, key: &PostingKey) -> Result<Option<Posting>> {
        self.read(CF_POSTINGS, key.as_str().as_bytes())
    }
}

#[async_trait]
impl ProductStats for RocksDBStore {
    async fn record_sale(&self, product_id: &str, quantity: u32) -> Result<()> {
        let _guard = self.writer.lock().await;
        let sold: u64 = self
            .read(CF_PRODUCTS, product_id.as_bytes())?
            .unwrap_or(0);
        let mut batch = WriteBatch::default();
        self.stage(
            &mut batch,
            CF_PRODUCTS,
            product_id.as_bytes(),
            &(sold + u64::from(quantity)),
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn sold(&self, product_id: &str) -> Result<u64> {
        Ok(self.read(CF_PRODUCTS, product_id.as_bytes())?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::order::{ItemCategory, OrderItem};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn draft() -> OrderDraft {
        OrderDraft {
            buyer_id: ActorId::new("buyer"),
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                seller_id: ActorId::new("seller"),
                name: "Batik".to_string(),
                unit_price: 20_000,
                quantity: 1,
                category: ItemCategory::Physical,
                estimation_days: None,
            }],
            delivery_fee: 0,
            voucher: None,
            note: None,
            delivery_address: None,
            total_price: 20_000,
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_order_swap_with_postings() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = store.create(draft(), now()).await.unwrap();

        let swapped = store
            .compare_and_swap_status(
                &order.id,
                OrderStatus::WaitingPayment,
                OrderStatus::Processed,
                Box::new(|order, batch| {
                    batch.credit(
                        ActorId::new("seller"),
                        Amount::new(order.total_price)?,
                        PostingKey::order(&order.id, "seller"),
                        order.created_at,
                    );
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(swapped.status, OrderStatus::Processed);

        let stale = store
            .compare_and_swap_status(
                &order.id,
                OrderStatus::WaitingPayment,
                OrderStatus::Processed,
                Box::new(|_, _| Ok(())),
            )
            .await;
        assert!(matches!(stale, Err(OrderError::StaleState { .. })));

        assert_eq!(
            store.balance(&ActorId::new("seller")).await.unwrap(),
            Balance::new(20_000)
        );
        assert_eq!(
            OrderStore::get(&store, &order.id).await.unwrap().unwrap().status,
            OrderStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        let actor = ActorId::new("buyer");
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store
                .credit(&actor, Amount::new(5_000).unwrap(), PostingKey::wallet("t-1", "top-up"), now())
                .await
                .unwrap();
            store.record_sale("p1", 4).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.balance(&actor).await.unwrap(), Balance::new(5_000));
        assert_eq!(store.balances().await.unwrap(), vec![(actor.clone(), Balance::new(5_000))]);
        assert_eq!(store.postings(&actor).await.unwrap().len(), 1);
        assert_eq!(store.sold("p1").await.unwrap(), 4);
    }
}
