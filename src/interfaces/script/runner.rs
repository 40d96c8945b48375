use super::command::{Command, as_role};
use super::command_reader::CommandReader;
use crate::application::engine::OrderEngine;
use crate::application::rides::RideDispatcher;
use crate::application::sweeper::AutoCompletionTimer;
use crate::application::wallet::WalletService;
use crate::config::PolicyConfig;
use crate::domain::actor::{Actor, ActorId, Role};
use crate::domain::money::{Amount, Balance};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{NotifierRef, RepositoryRef};
use crate::domain::ride::RideRequest;
use crate::error::Result;
use crate::infrastructure::clock::ManualClock;
use chrono::Duration;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, error};

/// Totals of a script run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub failed: usize,
}

/// A placed order as reported at the end of a run, keyed by its script alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub name: String,
    pub order: Order,
}

/// Replays a command script against the services on a script-controlled
/// clock.
pub struct ScriptRunner {
    engine: Arc<OrderEngine>,
    rides: RideDispatcher,
    wallet: WalletService,
    timer: AutoCompletionTimer,
    clock: ManualClock,
    orders: HashMap<String, OrderId>,
    ride_aliases: HashMap<String, OrderId>,
}

impl ScriptRunner {
    pub fn new(
        repo: RepositoryRef,
        notifier: NotifierRef,
        clock: ManualClock,
        config: PolicyConfig,
    ) -> Self {
        let rides = RideDispatcher::new(
            repo.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
            config.rides.clone(),
        );
        let wallet = WalletService::new(repo.clone(), Arc::new(clock.clone()));
        let engine = Arc::new(OrderEngine::new(
            repo,
            notifier,
            Arc::new(clock.clone()),
            config,
        ));
        let timer = AutoCompletionTimer::new(engine.clone());
        Self {
            engine,
            rides,
            wallet,
            timer,
            clock,
            orders: HashMap::new(),
            ride_aliases: HashMap::new(),
        }
    }

    /// Runs every command of `source`. A command that fails is logged and
    /// skipped; the run only stops on an unreadable source.
    pub async fn run<R: BufRead>(&mut self, source: R) -> RunSummary {
        let mut summary = RunSummary::default();
        for (line, command) in CommandReader::new(source).commands() {
            let result = match command {
                Ok(command) => {
                    let name = command.name();
                    self.execute(command)
                        .await
                        .inspect(|()| debug!(line, command = name, "applied"))
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    error!(line, error = %e, "command failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::TopUp {
                actor,
                amount,
                reference,
            } => {
                self.wallet
                    .top_up(&actor, Amount::new(amount)?, &reference)
                    .await?;
            }
            Command::Withdraw {
                actor,
                amount,
                reference,
            } => {
                self.wallet
                    .withdraw(&actor, Amount::new(amount)?, &reference)
                    .await?;
            }
            Command::Checkout { order, cart } => {
                let buyer = Actor::buyer(cart.buyer_id.as_str());
                let placed = self.engine.create_order(&buyer, cart).await?;
                self.orders.insert(order, placed.id);
            }
            Command::SubmitProof {
                order,
                buyer,
                proof,
            } => {
                let id = self.order_id(&order);
                self.engine
                    .submit_payment_proof(&as_role(&buyer, Role::Buyer), &id, &proof)
                    .await?;
            }
            Command::PayWithWallet { order, buyer } => {
                let id = self.order_id(&order);
                self.engine
                    .pay_with_wallet(&as_role(&buyer, Role::Buyer), &id)
                    .await?;
            }
            Command::Verify { order, admin } => {
                let id = self.order_id(&order);
                let approver =
                    admin.map_or_else(Actor::system, |admin| as_role(&admin, Role::Admin));
                self.engine.verify_payment(&approver, &id).await?;
            }
            Command::Reject { order, admin } => {
                let id = self.order_id(&order);
                self.engine
                    .reject_payment(&as_role(&admin, Role::Admin), &id)
                    .await?;
            }
            Command::Ship { order, seller } => {
                let id = self.order_id(&order);
                self.engine
                    .ship(&as_role(&seller, Role::Seller), &id)
                    .await?;
            }
            Command::Prepare { order, seller } => {
                let id = self.order_id(&order);
                self.engine
                    .start_preparing(&as_role(&seller, Role::Seller), &id)
                    .await?;
            }
            Command::Ready { order, seller } => {
                let id = self.order_id(&order);
                self.engine
                    .mark_ready(&as_role(&seller, Role::Seller), &id)
                    .await?;
            }
            Command::AssignDriver { order, driver } => {
                let id = self.order_id(&order);
                self.engine
                    .assign_driver(&as_role(&driver, Role::Driver), &id)
                    .await?;
            }
            Command::Deliver { order, driver } => {
                let id = self.order_id(&order);
                self.engine
                    .start_delivery(&as_role(&driver, Role::Driver), &id)
                    .await?;
            }
            Command::Confirm { order, buyer } => {
                let id = self.order_id(&order);
                self.engine
                    .confirm_receipt(&as_role(&buyer, Role::Buyer), &id)
                    .await?;
            }
            Command::Cancel { order, actor, role } => {
                let id = self.order_id(&order);
                self.engine.cancel(&as_role(&actor, role), &id).await?;
            }
            Command::Review { order, buyer } => {
                let id = self.order_id(&order);
                self.engine
                    .mark_reviewed(&as_role(&buyer, Role::Buyer), &id)
                    .await?;
            }
            Command::Hide { order, buyer } => {
                let id = self.order_id(&order);
                self.engine.hide(&as_role(&buyer, Role::Buyer), &id).await?;
            }
            Command::RequestRefund { order, buyer } => {
                let id = self.order_id(&order);
                self.engine
                    .request_refund(&as_role(&buyer, Role::Buyer), &id)
                    .await?;
            }
            Command::RequestRide {
                ride,
                passenger,
                pickup,
                destination,
                payment,
            } => {
                let actor = as_role(&passenger, Role::Buyer);
                let request = RideRequest {
                    passenger_id: passenger,
                    pickup,
                    destination,
                    payment,
                };
                let created = self.rides.request_ride(&actor, request).await?;
                self.ride_aliases.insert(ride, created.id);
            }
            Command::Offer {
                ride,
                driver,
                price,
            } => {
                let id = self.ride_id(&ride);
                self.rides
                    .submit_offer(&as_role(&driver, Role::Driver), &id, price)
                    .await?;
            }
            Command::AcceptOffer {
                ride,
                passenger,
                driver,
            } => {
                let id = self.ride_id(&ride);
                self.rides
                    .accept_offer(&as_role(&passenger, Role::Buyer), &id, &driver)
                    .await?;
            }
            Command::ConfirmRidePayment { ride, admin } => {
                let id = self.ride_id(&ride);
                self.rides
                    .confirm_payment(&as_role(&admin, Role::Admin), &id)
                    .await?;
            }
            Command::CompleteRide { ride, driver } => {
                let id = self.ride_id(&ride);
                self.rides
                    .complete_ride(&as_role(&driver, Role::Driver), &id)
                    .await?;
            }
            Command::CancelRide { ride, passenger } => {
                let id = self.ride_id(&ride);
                self.rides
                    .cancel_ride(&as_role(&passenger, Role::Buyer), &id)
                    .await?;
            }
            Command::AdvanceClock {
                days,
                hours,
                seconds,
            } => {
                self.clock.advance(
                    Duration::days(days) + Duration::hours(hours) + Duration::seconds(seconds),
                );
            }
            Command::Sweep => {
                self.timer.sweep().await?;
            }
        }
        Ok(())
    }

    pub async fn balances(&self) -> Result<Vec<(ActorId, Balance)>> {
        self.wallet.balances().await
    }

    /// Every order placed by the script, sorted by alias.
    pub async fn order_rows(&self) -> Result<Vec<OrderRow>> {
        let mut rows = Vec::with_capacity(self.orders.len());
        for (name, id) in &self.orders {
            let order = self.engine.order(id).await?;
            rows.push(OrderRow {
                name: name.clone(),
                order,
            });
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn order_id(&self, name: &str) -> OrderId {
        self.orders
            .get(name)
            .cloned()
            .unwrap_or_else(|| OrderId::from(name))
    }

    fn ride_id(&self, name: &str) -> OrderId {
        self.ride_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| OrderId::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::infrastructure::in_memory::InMemoryStore;
    use crate::infrastructure::notifier::InMemoryOutbox;
    use chrono::{TimeZone, Utc};

    fn runner() -> ScriptRunner {
        ScriptRunner::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryOutbox::new()),
            ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            PolicyConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_script_settles_order_and_continues_past_failures() {
        let script = r#"
{"cmd":"checkout","order":"o1","cart":{"buyer_id":"b1","items":[{"product_id":"p1","seller_id":"s1","name":"Buku","unit_price":20000,"quantity":1,"category":"physical"}]}}
{"cmd":"confirm","order":"o1","buyer":"b1"}
{"cmd":"submit_proof","order":"o1","buyer":"b1","proof":"trf.jpg"}
{"cmd":"verify","order":"o1","admin":"root"}
{"cmd":"ship","order":"o1","seller":"s1"}
{"cmd":"advance_clock","days":3}
{"cmd":"sweep"}
"#;
        let mut runner = runner();
        let summary = runner.run(script.as_bytes()).await;
        assert_eq!(summary, RunSummary { applied: 6, failed: 1 });

        let rows = runner.order_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order.status, OrderStatus::Completed);
        assert!(rows[0].order.funds_released);

        let balances = runner.balances().await.unwrap();
        assert_eq!(
            balances,
            vec![
                (ActorId::platform(), Balance::new(2_000)),
                (ActorId::new("s1"), Balance::new(18_000)),
            ]
        );
    }

    #[tokio::test]
    async fn test_verify_without_admin_runs_as_system() {
        let script = r#"
{"cmd":"checkout","order":"o1","cart":{"buyer_id":"b1","items":[{"product_id":"p1","seller_id":"s1","name":"Buku","unit_price":20000,"quantity":1,"category":"physical"}]}}
{"cmd":"submit_proof","order":"o1","buyer":"b1","proof":"trf.jpg"}
{"cmd":"verify","order":"o1"}
"#;
        let mut runner = runner();
        let summary = runner.run(script.as_bytes()).await;
        assert_eq!(summary, RunSummary { applied: 3, failed: 0 });

        let rows = runner.order_rows().await.unwrap();
        assert_eq!(rows[0].order.status, OrderStatus::Processed);
        assert!(rows[0].order.verified_at.is_some());
    }
}
