use crate::domain::actor::{Actor, ActorId, Role};
use crate::domain::cart::Cart;
use crate::domain::ride::RidePayment;
use serde::Deserialize;

/// One line of a command script.
///
/// `order` and `ride` fields name the alias given at checkout or ride
/// request; an unknown alias is taken as a literal id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    TopUp {
        actor: ActorId,
        amount: u64,
        reference: String,
    },
    Withdraw {
        actor: ActorId,
        amount: u64,
        reference: String,
    },
    Checkout {
        order: String,
        cart: Cart,
    },
    SubmitProof {
        order: String,
        buyer: ActorId,
        proof: String,
    },
    PayWithWallet {
        order: String,
        buyer: ActorId,
    },
    /// Without an `admin` the approval is automated and runs as the system actor.
    Verify {
        order: String,
        #[serde(default)]
        admin: Option<ActorId>,
    },
    Reject {
        order: String,
        admin: ActorId,
    },
    Ship {
        order: String,
        seller: ActorId,
    },
    Prepare {
        order: String,
        seller: ActorId,
    },
    Ready {
        order: String,
        seller: ActorId,
    },
    AssignDriver {
        order: String,
        driver: ActorId,
    },
    Deliver {
        order: String,
        driver: ActorId,
    },
    Confirm {
        order: String,
        buyer: ActorId,
    },
    Cancel {
        order: String,
        actor: ActorId,
        #[serde(default = "buyer_role")]
        role: Role,
    },
    Review {
        order: String,
        buyer: ActorId,
    },
    Hide {
        order: String,
        buyer: ActorId,
    },
    RequestRefund {
        order: String,
        buyer: ActorId,
    },
    RequestRide {
        ride: String,
        passenger: ActorId,
        pickup: String,
        destination: String,
        payment: RidePayment,
    },
    Offer {
        ride: String,
        driver: ActorId,
        price: u64,
    },
    AcceptOffer {
        ride: String,
        passenger: ActorId,
        driver: ActorId,
    },
    ConfirmRidePayment {
        ride: String,
        admin: ActorId,
    },
    CompleteRide {
        ride: String,
        driver: ActorId,
    },
    CancelRide {
        ride: String,
        passenger: ActorId,
    },
    /// Moves the script clock forward.
    AdvanceClock {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
        #[serde(default)]
        seconds: i64,
    },
    /// Runs one auto-completion sweep at the current script time.
    Sweep,
}

fn buyer_role() -> Role {
    Role::Buyer
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::TopUp { .. } => "top_up",
            Command::Withdraw { .. } => "withdraw",
            Command::Checkout { .. } => "checkout",
            Command::SubmitProof { .. } => "submit_proof",
            Command::PayWithWallet { .. } => "pay_with_wallet",
            Command::Verify { .. } => "verify",
            Command::Reject { .. } => "reject",
            Command::Ship { .. } => "ship",
            Command::Prepare { .. } => "prepare",
            Command::Ready { .. } => "ready",
            Command::AssignDriver { .. } => "assign_driver",
            Command::Deliver { .. } => "deliver",
            Command::Confirm { .. } => "confirm",
            Command::Cancel { .. } => "cancel",
            Command::Review { .. } => "review",
            Command::Hide { .. } => "hide",
            Command::RequestRefund { .. } => "request_refund",
            Command::RequestRide { .. } => "request_ride",
            Command::Offer { .. } => "offer",
            Command::AcceptOffer { .. } => "accept_offer",
            Command::ConfirmRidePayment { .. } => "confirm_ride_payment",
            Command::CompleteRide { .. } => "complete_ride",
            Command::CancelRide { .. } => "cancel_ride",
            Command::AdvanceClock { .. } => "advance_clock",
            Command::Sweep => "sweep",
        }
    }
}

pub(super) fn as_role(id: &ActorId, role: Role) -> Actor {
    Actor {
        id: id.clone(),
        role,
    }
}
