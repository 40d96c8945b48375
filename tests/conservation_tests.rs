mod common;

use common::{cart, item, marketplace, with_voucher};
use niaga::domain::actor::{Actor, ActorId};
use niaga::domain::order::{ItemCategory, OrderStatus};
use niaga::domain::policy::{self, FeePolicy};
use niaga::domain::ports::LedgerStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SELLERS: [&str; 3] = ["toko-a", "toko-b", "toko-c"];
const CATEGORIES: [ItemCategory; 3] = [
    ItemCategory::Physical,
    ItemCategory::Service,
    ItemCategory::FoodDelivery,
];

#[tokio::test]
async fn test_random_orders_conserve_total_price() {
    let mut rng = StdRng::seed_from_u64(0x6e69_6167);
    let market = marketplace();
    let buyer = Actor::buyer("pembeli");
    let driver = Actor::driver("kurir");
    let mut paid = 0u64;

    for n in 0..50 {
        let lines: Vec<_> = (0..rng.gen_range(1..=4))
            .map(|i| {
                let line = item(
                    &format!("p{n}-{i}"),
                    SELLERS[rng.gen_range(0..SELLERS.len())],
                    rng.gen_range(1..=40) * 1_000,
                    rng.gen_range(1..=3),
                    CATEGORIES[rng.gen_range(0..CATEGORIES.len())],
                );
                if i == 0 && rng.gen_bool(0.5) {
                    with_voucher(line, "PROMO", rng.gen_range(1..=30) * 1_000)
                } else {
                    line
                }
            })
            .collect();
        let mut checkout = cart("pembeli", lines);
        checkout.voucher_code = Some("PROMO".to_string());

        let order = market.engine.create_order(&buyer, checkout).await.unwrap();
        let split = policy::settlement(&order, &FeePolicy::default());
        assert_eq!(split.distributed(), order.total_price, "order {n}");

        let engine = &market.engine;
        engine
            .submit_payment_proof(&buyer, &order.id, "proof")
            .await
            .unwrap();
        engine
            .verify_payment(&Actor::admin("admin"), &order.id)
            .await
            .unwrap();
        let seller = Actor::seller(order.items[0].seller_id.as_str());
        if order.delivery_fee > 0 {
            engine.start_preparing(&seller, &order.id).await.unwrap();
            engine.assign_driver(&driver, &order.id).await.unwrap();
            engine.mark_ready(&seller, &order.id).await.unwrap();
            engine.start_delivery(&driver, &order.id).await.unwrap();
        } else {
            engine.ship(&seller, &order.id).await.unwrap();
        }
        let done = engine.confirm_receipt(&buyer, &order.id).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        paid += done.total_price;
    }

    let credited: u64 = market
        .store
        .balances()
        .await
        .unwrap()
        .into_iter()
        .map(|(_, balance)| balance.value())
        .sum();
    assert_eq!(credited, paid);
    assert!(market.store.balance(&ActorId::platform()).await.unwrap().value() > 0);
}
