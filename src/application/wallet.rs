use crate::domain::actor::ActorId;
use crate::domain::ledger::{Posting, PostingKey, PostingOutcome};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{ClockRef, LedgerStore, RepositoryRef};
use crate::error::Result;
use tracing::info;

/// Buyer and driver wallets over the ledger.
///
/// Every movement carries the caller's `reference` (bank transfer id,
/// withdrawal ticket) so a retried request is applied once.
pub struct WalletService {
    repo: RepositoryRef,
    clock: ClockRef,
}

impl WalletService {
    pub fn new(repo: RepositoryRef, clock: ClockRef) -> Self {
        Self { repo, clock }
    }

    pub async fn top_up(
        &self,
        actor: &ActorId,
        amount: Amount,
        reference: &str,
    ) -> Result<PostingOutcome> {
        let key = PostingKey::wallet(reference, "top-up").for_actor(actor);
        let outcome = self
            .repo
            .credit(actor, amount, key, self.clock.now())
            .await?;
        info!(actor = %actor, amount = amount.value(), ?outcome, "wallet top-up");
        Ok(outcome)
    }

    /// Fails with `InsufficientFunds` when the wallet cannot cover `amount`.
    pub async fn withdraw(
        &self,
        actor: &ActorId,
        amount: Amount,
        reference: &str,
    ) -> Result<PostingOutcome> {
        let key = PostingKey::wallet(reference, "withdraw").for_actor(actor);
        let outcome = self
            .repo
            .debit(actor, amount, key, self.clock.now())
            .await?;
        info!(actor = %actor, amount = amount.value(), ?outcome, "wallet withdrawal");
        Ok(outcome)
    }

    pub async fn balance(&self, actor: &ActorId) -> Result<Balance> {
        self.repo.balance(actor).await
    }

    pub async fn postings(&self, actor: &ActorId) -> Result<Vec<Posting>> {
        self.repo.postings(actor).await
    }

    pub async fn balances(&self) -> Result<Vec<(ActorId, Balance)>> {
        self.repo.balances().await
    }
}
