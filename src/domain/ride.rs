use super::actor::ActorId;
use super::order::OrderId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// Collecting driver offers.
    Pending,
    /// A driver is assigned; the fare still has to be paid manually.
    Accepted,
    /// A driver is assigned and the fare is secured.
    Verified,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::Verified => "verified",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RidePayment {
    /// Fare is debited from the passenger's wallet on acceptance.
    Wallet,
    /// Fare is paid outside the platform and confirmed by an admin.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOffer {
    pub driver_id: ActorId,
    pub price: u64,
    pub created_at: DateTime<Utc>,
}

impl DriverOffer {
    pub fn is_visible(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now < self.created_at + window
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideRequest {
    pub passenger_id: ActorId,
    pub pickup: String,
    pub destination: String,
    pub payment: RidePayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideOrder {
    pub id: OrderId,
    pub passenger_id: ActorId,
    pub pickup: String,
    pub destination: String,
    pub payment: RidePayment,
    pub status: RideStatus,
    pub offers: Vec<DriverOffer>,
    pub driver_id: Option<ActorId>,
    /// Price of the accepted offer.
    pub fare: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub funds_released: bool,
}

impl RideOrder {
    pub fn new(id: OrderId, request: RideRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            passenger_id: request.passenger_id,
            pickup: request.pickup,
            destination: request.destination,
            payment: request.payment,
            status: RideStatus::Pending,
            offers: Vec::new(),
            driver_id: None,
            fare: None,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            funds_released: false,
        }
    }

    /// Records an offer; a driver re-offering replaces their earlier one.
    pub fn upsert_offer(&mut self, offer: DriverOffer) {
        self.offers.retain(|existing| existing.driver_id != offer.driver_id);
        self.offers.push(offer);
    }

    pub fn offer_from(&self, driver: &ActorId) -> Option<&DriverOffer> {
        self.offers.iter().find(|offer| &offer.driver_id == driver)
    }

    pub fn visible_offers(&self, now: DateTime<Utc>, window: Duration) -> Vec<DriverOffer> {
        self.offers
            .iter()
            .filter(|offer| offer.is_visible(now, window))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ride() -> RideOrder {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        RideOrder::new(
            OrderId::from("r-1"),
            RideRequest {
                passenger_id: ActorId::new("passenger"),
                pickup: "Stasiun".to_string(),
                destination: "Kampus".to_string(),
                payment: RidePayment::Wallet,
            },
            now,
        )
    }

    #[test]
    fn test_reoffer_replaces_previous() {
        let mut ride = ride();
        let at = ride.created_at;
        ride.upsert_offer(DriverOffer {
            driver_id: ActorId::new("d1"),
            price: 20_000,
            created_at: at,
        });
        ride.upsert_offer(DriverOffer {
            driver_id: ActorId::new("d1"),
            price: 18_000,
            created_at: at + Duration::seconds(5),
        });
        assert_eq!(ride.offers.len(), 1);
        assert_eq!(ride.offer_from(&ActorId::new("d1")).unwrap().price, 18_000);
    }

    #[test]
    fn test_offer_visibility_window() {
        let mut ride = ride();
        let at = ride.created_at;
        ride.upsert_offer(DriverOffer {
            driver_id: ActorId::new("d1"),
            price: 20_000,
            created_at: at,
        });
        let window = Duration::seconds(15);
        assert_eq!(ride.visible_offers(at + Duration::seconds(14), window).len(), 1);
        assert!(ride.visible_offers(at + Duration::seconds(15), window).is_empty());
    }
}
