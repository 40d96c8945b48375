#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use niaga::application::engine::OrderEngine;
use niaga::application::rides::RideDispatcher;
use niaga::application::sweeper::AutoCompletionTimer;
use niaga::config::PolicyConfig;
use niaga::domain::actor::{Actor, ActorId};
use niaga::domain::cart::{Cart, CartItem, ItemVoucher};
use niaga::domain::order::{ItemCategory, Order, OrderItem};
use niaga::infrastructure::clock::ManualClock;
use niaga::infrastructure::in_memory::InMemoryStore;
use niaga::infrastructure::notifier::InMemoryOutbox;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub struct Marketplace {
    pub engine: Arc<OrderEngine>,
    pub rides: Arc<RideDispatcher>,
    pub timer: AutoCompletionTimer,
    pub store: InMemoryStore,
    pub outbox: InMemoryOutbox,
    pub clock: ManualClock,
}

pub fn marketplace() -> Marketplace {
    let store = InMemoryStore::new();
    let outbox = InMemoryOutbox::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
    let config = PolicyConfig::default();
    let engine = Arc::new(OrderEngine::new(
        Arc::new(store.clone()),
        Arc::new(outbox.clone()),
        Arc::new(clock.clone()),
        config.clone(),
    ));
    let rides = Arc::new(RideDispatcher::new(
        Arc::new(store.clone()),
        Arc::new(outbox.clone()),
        Arc::new(clock.clone()),
        config.rides,
    ));
    let timer = AutoCompletionTimer::new(engine.clone());
    Marketplace {
        engine,
        rides,
        timer,
        store,
        outbox,
        clock,
    }
}

pub fn item(product: &str, seller: &str, price: u64, quantity: u32, category: ItemCategory) -> CartItem {
    CartItem {
        item: OrderItem {
            product_id: product.to_string(),
            seller_id: ActorId::new(seller),
            name: product.to_string(),
            unit_price: price,
            quantity,
            category,
            estimation_days: None,
        },
        selected: true,
        voucher: None,
    }
}

pub fn with_voucher(mut line: CartItem, code: &str, amount: u64) -> CartItem {
    line.voucher = Some(ItemVoucher {
        code: code.to_string(),
        amount,
    });
    line
}

pub fn cart(buyer: &str, items: Vec<CartItem>) -> Cart {
    Cart {
        buyer_id: ActorId::new(buyer),
        items,
        voucher_code: None,
        note: None,
        delivery_address: Some("Jl. Merdeka 17".to_string()),
    }
}

/// Places, pays, verifies and ships a single-seller courier order.
pub async fn shipped_order(market: &Marketplace, buyer: &str, seller: &str, price: u64) -> Order {
    let buyer = Actor::buyer(buyer);
    let order = market
        .engine
        .create_order(
            &buyer,
            cart(
                buyer.id.as_str(),
                vec![item("barang", seller, price, 1, ItemCategory::Physical)],
            ),
        )
        .await
        .unwrap();
    market
        .engine
        .submit_payment_proof(&buyer, &order.id, "https://proof/1.jpg")
        .await
        .unwrap();
    market
        .engine
        .verify_payment(&Actor::admin("admin"), &order.id)
        .await
        .unwrap();
    market
        .engine
        .ship(&Actor::seller(seller), &order.id)
        .await
        .unwrap()
}

/// Writes `lines` as a JSON-lines script.
pub fn write_script(path: &Path, lines: &[&str]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.flush()
}
