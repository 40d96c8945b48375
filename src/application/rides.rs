use crate::domain::actor::{Actor, ActorId, Role};
use crate::domain::ledger::PostingKey;
use crate::domain::money::Amount;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::OrderId;
use crate::domain::policy::RidePolicy;
use crate::domain::ports::{ClockRef, NotifierRef, RepositoryRef, RideMutator, RideStore};
use crate::domain::ride::{DriverOffer, RidePayment, RideOrder, RideRequest, RideStatus};
use crate::error::{OrderError, Result};
use serde_json::json;
use tracing::{info, warn};

/// Driver matching for ride orders.
///
/// Offers accumulate while a ride is pending; the passenger picks one inside
/// the acceptance window and the first accepted offer wins.
pub struct RideDispatcher {
    repo: RepositoryRef,
    notifier: NotifierRef,
    clock: ClockRef,
    policy: RidePolicy,
}

impl RideDispatcher {
    pub fn new(
        repo: RepositoryRef,
        notifier: NotifierRef,
        clock: ClockRef,
        policy: RidePolicy,
    ) -> Self {
        Self {
            repo,
            notifier,
            clock,
            policy,
        }
    }

    pub async fn ride(&self, id: &OrderId) -> Result<RideOrder> {
        self.repo
            .get_ride(id)
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    pub async fn request_ride(&self, actor: &Actor, request: RideRequest) -> Result<RideOrder> {
        if actor.role != Role::Buyer || actor.id != request.passenger_id {
            return Err(OrderError::Unauthorized(format!(
                "{} cannot request a ride for {}",
                actor.id, request.passenger_id
            )));
        }
        if request.pickup.trim().is_empty() || request.destination.trim().is_empty() {
            return Err(OrderError::InvalidOrder(
                "pickup and destination are required".to_string(),
            ));
        }

        let ride = self.repo.create_ride(request, self.clock.now()).await?;
        info!(ride_id = %ride.id, passenger = %ride.passenger_id, "ride requested");
        Ok(ride)
    }

    /// Records a driver's price. A driver re-offering replaces their old offer
    /// and restarts its acceptance window.
    pub async fn submit_offer(&self, actor: &Actor, id: &OrderId, price: u64) -> Result<RideOrder> {
        require_role(actor, Role::Driver)?;
        let price = Amount::new(price)?;
        let offer = DriverOffer {
            driver_id: actor.id.clone(),
            price: price.value(),
            created_at: self.clock.now(),
        };

        let ride = self
            .update(
                id,
                RideStatus::Pending,
                Box::new(move |ride, _| {
                    ride.upsert_offer(offer);
                    Ok(())
                }),
            )
            .await?;
        self.emit(
            Notification::new(
                ride.passenger_id.clone(),
                NotificationKind::RideOfferReceived,
                ride.id.clone(),
            )
            .with_payload(json!({ "driver": actor.id, "price": price.value() })),
        )
        .await;
        Ok(ride)
    }

    /// Offers the passenger can still accept right now.
    pub async fn visible_offers(&self, actor: &Actor, id: &OrderId) -> Result<Vec<DriverOffer>> {
        let ride = self.ride(id).await?;
        authorize_passenger(&ride, actor, &[Role::Buyer, Role::Admin])?;
        if ride.status != RideStatus::Pending {
            return Ok(Vec::new());
        }
        Ok(ride.visible_offers(self.clock.now(), self.policy.offer_window()))
    }

    /// Assigns the ride to `driver` at the offered price. Wallet rides are
    /// paid in the same unit; manual rides wait for an admin.
    pub async fn accept_offer(
        &self,
        actor: &Actor,
        id: &OrderId,
        driver: &ActorId,
    ) -> Result<RideOrder> {
        let ride = self.ride(id).await?;
        authorize_passenger(&ride, actor, &[Role::Buyer])?;
        if ride.driver_id.is_some() {
            return Err(OrderError::AlreadyAssigned);
        }

        let now = self.clock.now();
        let window = self.policy.offer_window();
        let candidate = driver.clone();
        let result = self
            .update(
                id,
                RideStatus::Pending,
                Box::new(move |ride, batch| {
                    if ride.driver_id.is_some() {
                        return Err(OrderError::AlreadyAssigned);
                    }
                    let offer = ride
                        .offer_from(&candidate)
                        .cloned()
                        .ok_or_else(|| OrderError::NotFound(format!("offer from {candidate}")))?;
                    if !offer.is_visible(now, window) {
                        return Err(OrderError::OfferExpired(candidate));
                    }

                    ride.status = match ride.payment {
                        RidePayment::Wallet => {
                            batch.debit(
                                ride.passenger_id.clone(),
                                Amount::new(offer.price)?,
                                PostingKey::ride(&ride.id, "fare"),
                                now,
                            );
                            RideStatus::Verified
                        }
                        RidePayment::Manual => RideStatus::Accepted,
                    };
                    ride.driver_id = Some(offer.driver_id);
                    ride.fare = Some(offer.price);
                    ride.accepted_at = Some(now);
                    Ok(())
                }),
            )
            .await;

        let ride = match result {
            Ok(ride) => ride,
            Err(e @ OrderError::StaleState { .. }) => {
                if self.ride(id).await?.driver_id.is_some() {
                    return Err(OrderError::AlreadyAssigned);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        for target in [ride.passenger_id.clone(), driver.clone()] {
            self.emit(Notification::new(
                target,
                NotificationKind::RideAccepted,
                ride.id.clone(),
            ))
            .await;
        }
        Ok(ride)
    }

    /// Admin confirmation of a fare paid outside the platform.
    pub async fn confirm_payment(&self, actor: &Actor, id: &OrderId) -> Result<RideOrder> {
        require_role(actor, Role::Admin)?;
        self.update(
            id,
            RideStatus::Accepted,
            Box::new(|ride, _| {
                ride.status = RideStatus::Verified;
                Ok(())
            }),
        )
        .await
    }

    /// The assigned driver finishes the trip and is credited the fare less the
    /// platform commission.
    pub async fn complete_ride(&self, actor: &Actor, id: &OrderId) -> Result<RideOrder> {
        require_role(actor, Role::Driver)?;
        let ride = self.ride(id).await?;
        if ride.driver_id.as_ref() != Some(&actor.id) {
            return Err(OrderError::Unauthorized(format!(
                "{} is not the driver of ride {}",
                actor.id, ride.id
            )));
        }
        if ride.funds_released {
            return Err(OrderError::AlreadySettled);
        }

        let now = self.clock.now();
        let policy = self.policy.clone();
        let result = self
            .update(
                id,
                RideStatus::Verified,
                Box::new(move |ride, batch| {
                    if ride.funds_released {
                        return Err(OrderError::AlreadySettled);
                    }
                    let fare = ride.fare.unwrap_or(0);
                    let fee = policy.ride_fee(fare);
                    if let Some(driver) = ride.driver_id.clone() {
                        let key = PostingKey::ride(&ride.id, "driver");
                        batch.credit_value(driver, fare - fee, key, now);
                    }
                    batch.credit_value(
                        ActorId::platform(),
                        fee,
                        PostingKey::ride(&ride.id, "commission"),
                        now,
                    );
                    ride.funds_released = true;
                    ride.status = RideStatus::Completed;
                    ride.completed_at = Some(now);
                    Ok(())
                }),
            )
            .await;

        let ride = match result {
            Ok(ride) => ride,
            Err(e @ OrderError::StaleState { .. }) => {
                if self.ride(id).await?.funds_released {
                    return Err(OrderError::AlreadySettled);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        info!(ride_id = %ride.id, fare = ride.fare.unwrap_or(0), "ride settled");
        self.emit(Notification::new(
            ride.passenger_id.clone(),
            NotificationKind::RideCompleted,
            ride.id.clone(),
        ))
        .await;
        Ok(ride)
    }

    /// Passenger cancellation before completion. A wallet fare already
    /// debited is credited back.
    pub async fn cancel_ride(&self, actor: &Actor, id: &OrderId) -> Result<RideOrder> {
        let ride = self.ride(id).await?;
        authorize_passenger(&ride, actor, &[Role::Buyer, Role::Admin])?;
        if ride.status.is_terminal() {
            return Err(OrderError::transition(ride.status, RideStatus::Cancelled));
        }

        let now = self.clock.now();
        let ride = self
            .update(
                id,
                ride.status,
                Box::new(move |ride, batch| {
                    if ride.payment == RidePayment::Wallet && ride.status == RideStatus::Verified {
                        batch.credit_value(
                            ride.passenger_id.clone(),
                            ride.fare.unwrap_or(0),
                            PostingKey::ride(&ride.id, "refund"),
                            now,
                        );
                    }
                    ride.status = RideStatus::Cancelled;
                    ride.cancelled_at = Some(now);
                    Ok(())
                }),
            )
            .await?;
        let targets = [ride.passenger_id.clone()]
            .into_iter()
            .chain(ride.driver_id.clone());
        for target in targets {
            self.emit(Notification::new(
                target,
                NotificationKind::RideCancelled,
                ride.id.clone(),
            ))
            .await;
        }
        Ok(ride)
    }

    async fn update(
        &self,
        id: &OrderId,
        expected: RideStatus,
        mutator: RideMutator,
    ) -> Result<RideOrder> {
        let ride = self.repo.update_ride(id, expected, mutator).await?;
        if ride.status != expected {
            info!(ride_id = %id, from = %expected, to = %ride.status, "ride transition");
        }
        Ok(ride)
    }

    async fn emit(&self, notification: Notification) {
        let key = notification.event_key();
        if let Err(e) = self.notifier.emit(notification).await {
            warn!(event = %key, error = %e, "failed to emit notification");
        }
    }
}

fn require_role(actor: &Actor, role: Role) -> Result<()> {
    if actor.role == role {
        Ok(())
    } else {
        Err(OrderError::Unauthorized(format!(
            "{} must act as {role}",
            actor.id
        )))
    }
}

fn authorize_passenger(ride: &RideOrder, actor: &Actor, roles: &[Role]) -> Result<()> {
    let allowed = roles.contains(&actor.role)
        && (actor.role == Role::Admin || actor.id == ride.passenger_id);
    if allowed {
        Ok(())
    } else {
        Err(OrderError::Unauthorized(format!(
            "{} is not the passenger of ride {}",
            actor.id, ride.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::notifier::InMemoryOutbox;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn dispatcher() -> (RideDispatcher, InMemoryStore, ManualClock) {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap());
        let rides = RideDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryOutbox::new()),
            Arc::new(clock.clone()),
            RidePolicy::default(),
        );
        (rides, store, clock)
    }

    fn request(payment: RidePayment) -> RideRequest {
        RideRequest {
            passenger_id: ActorId::new("rider"),
            pickup: "Stasiun".to_string(),
            destination: "Kampus".to_string(),
            payment,
        }
    }

    #[tokio::test]
    async fn test_offers_expire_after_window() {
        let (rides, _, clock) = dispatcher();
        let rider = Actor::buyer("rider");
        let ride = rides.request_ride(&rider, request(RidePayment::Manual)).await.unwrap();

        rides.submit_offer(&Actor::driver("d1"), &ride.id, 12_000).await.unwrap();
        clock.advance(Duration::seconds(10));
        rides.submit_offer(&Actor::driver("d2"), &ride.id, 11_000).await.unwrap();
        assert_eq!(rides.visible_offers(&rider, &ride.id).await.unwrap().len(), 2);

        clock.advance(Duration::seconds(5));
        let visible = rides.visible_offers(&rider, &ride.id).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].driver_id, ActorId::new("d2"));

        let expired = rides.accept_offer(&rider, &ride.id, &ActorId::new("d1")).await;
        assert!(matches!(expired, Err(OrderError::OfferExpired(_))));
    }

    #[tokio::test]
    async fn test_manual_ride_waits_for_admin() {
        let (rides, store, _) = dispatcher();
        let rider = Actor::buyer("rider");
        let driver = Actor::driver("d1");
        let ride = rides.request_ride(&rider, request(RidePayment::Manual)).await.unwrap();
        rides.submit_offer(&driver, &ride.id, 20_000).await.unwrap();

        let accepted = rides.accept_offer(&rider, &ride.id, &driver.id).await.unwrap();
        assert_eq!(accepted.status, RideStatus::Accepted);
        assert!(matches!(
            rides.complete_ride(&driver, &ride.id).await,
            Err(OrderError::StaleState { .. })
        ));

        rides.confirm_payment(&Actor::admin("root"), &ride.id).await.unwrap();
        let done = rides.complete_ride(&driver, &ride.id).await.unwrap();
        assert_eq!(done.status, RideStatus::Completed);
        assert_eq!(store.balance(&driver.id).await.unwrap().value(), 18_000);
        assert_eq!(store.balance(&ActorId::platform()).await.unwrap().value(), 2_000);

        assert!(matches!(
            rides.complete_ride(&driver, &ride.id).await,
            Err(OrderError::AlreadySettled)
        ));
    }

    #[tokio::test]
    async fn test_wallet_ride_debits_on_accept_and_refunds_on_cancel() {
        let (rides, store, _) = dispatcher();
        let rider = Actor::buyer("rider");
        store
            .credit(
                &rider.id,
                Amount::new(50_000).unwrap(),
                PostingKey::wallet("rider", "top-up"),
                Utc::now(),
            )
            .await
            .unwrap();
        let ride = rides.request_ride(&rider, request(RidePayment::Wallet)).await.unwrap();
        rides.submit_offer(&Actor::driver("d1"), &ride.id, 15_000).await.unwrap();

        let accepted = rides
            .accept_offer(&rider, &ride.id, &ActorId::new("d1"))
            .await
            .unwrap();
        assert_eq!(accepted.status, RideStatus::Verified);
        assert_eq!(store.balance(&rider.id).await.unwrap().value(), 35_000);

        rides.cancel_ride(&rider, &ride.id).await.unwrap();
        assert_eq!(store.balance(&rider.id).await.unwrap().value(), 50_000);
    }

    #[tokio::test]
    async fn test_wallet_ride_without_funds_stays_pending() {
        let (rides, _, _) = dispatcher();
        let rider = Actor::buyer("rider");
        let ride = rides.request_ride(&rider, request(RidePayment::Wallet)).await.unwrap();
        rides.submit_offer(&Actor::driver("d1"), &ride.id, 15_000).await.unwrap();

        let result = rides.accept_offer(&rider, &ride.id, &ActorId::new("d1")).await;
        assert!(matches!(result, Err(OrderError::InsufficientFunds { .. })));
        let stored = rides.ride(&ride.id).await.unwrap();
        assert_eq!(stored.status, RideStatus::Pending);
        assert_eq!(stored.driver_id, None);
    }

    #[tokio::test]
    async fn test_only_drivers_offer() {
        let (rides, _, _) = dispatcher();
        let rider = Actor::buyer("rider");
        let ride = rides.request_ride(&rider, request(RidePayment::Manual)).await.unwrap();
        let result = rides.submit_offer(&rider, &ride.id, 10_000).await;
        assert!(matches!(result, Err(OrderError::Unauthorized(_))));
        let zero = rides.submit_offer(&Actor::driver("d1"), &ride.id, 0).await;
        assert!(matches!(zero, Err(OrderError::InvalidAmount)));
    }
}
