mod common;

use chrono::Duration;
use common::{cart, item, marketplace, shipped_order};
use niaga::domain::actor::{Actor, ActorId};
use niaga::domain::order::{ItemCategory, OrderStatus};
use niaga::domain::ports::LedgerStore;
use niaga::domain::ride::{RidePayment, RideRequest, RideStatus};
use niaga::error::OrderError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accept_offer_has_one_winner() {
    let market = marketplace();
    let rider = Actor::buyer("sari");
    let ride = market
        .rides
        .request_ride(
            &rider,
            RideRequest {
                passenger_id: rider.id.clone(),
                pickup: "Gambir".to_string(),
                destination: "Blok M".to_string(),
                payment: RidePayment::Manual,
            },
        )
        .await
        .unwrap();
    for (driver, price) in [("d1", 25_000), ("d2", 23_000)] {
        market
            .rides
            .submit_offer(&Actor::driver(driver), &ride.id, price)
            .await
            .unwrap();
    }

    let handles: Vec<_> = ["d1", "d2"]
        .into_iter()
        .map(|driver| {
            let rides = market.rides.clone();
            let rider = rider.clone();
            let id = ride.id.clone();
            tokio::spawn(async move {
                rides
                    .accept_offer(&rider, &id, &ActorId::new(driver))
                    .await
            })
        })
        .collect();

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(OrderError::AlreadyAssigned) => lost += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((won, lost), (1, 1));

    let stored = market.rides.ride(&ride.id).await.unwrap();
    assert_eq!(stored.status, RideStatus::Accepted);
    assert!(stored.driver_id.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_driver_assignment_has_one_winner() {
    let market = marketplace();
    let buyer = Actor::buyer("ani");
    let order = market
        .engine
        .create_order(
            &buyer,
            cart("ani", vec![item("bakso", "warung", 20_000, 2, ItemCategory::FoodDelivery)]),
        )
        .await
        .unwrap();
    market
        .engine
        .submit_payment_proof(&buyer, &order.id, "proof")
        .await
        .unwrap();
    market
        .engine
        .verify_payment(&Actor::admin("admin"), &order.id)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = market.engine.clone();
            let id = order.id.clone();
            tokio::spawn(async move {
                engine
                    .assign_driver(&Actor::driver(format!("driver-{n}")), &id)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, OrderError::AlreadyAssigned), "{e}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buyer_confirmation_racing_timer_settles_once() {
    let market = marketplace();
    let mut orders = Vec::new();
    for n in 0..10 {
        orders.push(shipped_order(&market, &format!("buyer-{n}"), "toko", 16_000).await);
    }
    market.clock.advance(Duration::days(3));

    let mut handles = Vec::new();
    for order in &orders {
        let engine = market.engine.clone();
        let id = order.id.clone();
        let buyer = Actor::buyer(order.buyer_id.as_str());
        handles.push(tokio::spawn(async move {
            engine.confirm_receipt(&buyer, &id).await.map(|_| ())
        }));
    }
    let sweep = {
        let engine = market.engine.clone();
        tokio::spawn(async move {
            niaga::application::sweeper::AutoCompletionTimer::new(engine)
                .sweep()
                .await
        })
    };
    let report = market.timer.sweep().await.unwrap();

    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            assert!(e.is_benign(), "{e}");
        }
    }
    let concurrent = sweep.await.unwrap().unwrap();
    assert_eq!(report.failed + concurrent.failed, 0);

    for order in &orders {
        let stored = market.engine.order(&order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert!(stored.funds_released);
    }
    let seller = market.store.balance(&ActorId::new("toko")).await.unwrap();
    assert_eq!(seller.value(), 10 * 14_000);
    let platform = market.store.balance(&ActorId::platform()).await.unwrap();
    assert_eq!(platform.value(), 10 * 2_000);
}
