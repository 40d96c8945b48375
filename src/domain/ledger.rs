use super::actor::ActorId;
use super::money::{Amount, Balance};
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Idempotency key of a posting: `{scope}/{reference}:{purpose}`, optionally
/// followed by `:{actor}`.
///
/// References and actor ids are escaped, so caller-supplied text can never
/// reproduce a key owned by another order, ride or wallet movement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingKey(pub String);

impl PostingKey {
    pub fn order(id: impl fmt::Display, purpose: &str) -> Self {
        Self::scoped("order", id, purpose)
    }

    pub fn ride(id: impl fmt::Display, purpose: &str) -> Self {
        Self::scoped("ride", id, purpose)
    }

    /// A wallet movement keyed by the caller's transfer or ticket reference.
    pub fn wallet(reference: impl fmt::Display, purpose: &str) -> Self {
        Self::scoped("wallet", reference, purpose)
    }

    pub fn for_actor(mut self, actor: &ActorId) -> Self {
        self.0.push(':');
        self.0.push_str(&escape(actor.as_str()));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn scoped(scope: &str, reference: impl fmt::Display, purpose: &str) -> Self {
        Self(format!("{scope}/{}:{purpose}", escape(&reference.to_string())))
    }
}

fn escape(part: &str) -> String {
    part.replace('%', "%25")
        .replace(':', "%3A")
        .replace('/', "%2F")
}

impl fmt::Display for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// An append-only ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub key: PostingKey,
    pub actor: ActorId,
    pub direction: Direction,
    pub amount: Amount,
    pub at: DateTime<Utc>,
}

impl Posting {
    /// Signed effect on the actor's balance.
    pub fn signed(&self) -> i128 {
        match self.direction {
            Direction::Credit => i128::from(self.amount.value()),
            Direction::Debit => -i128::from(self.amount.value()),
        }
    }
}

/// Whether a posting changed a balance or replayed an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingOutcome {
    Applied,
    Replayed,
}

/// Postings staged inside one atomic unit. Stores validate and apply the
/// whole batch or none of it.
#[derive(Debug, Default, Clone)]
pub struct LedgerBatch {
    postings: Vec<Posting>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, actor: ActorId, amount: Amount, key: PostingKey, at: DateTime<Utc>) {
        self.postings.push(Posting {
            key,
            actor,
            direction: Direction::Credit,
            amount,
            at,
        });
    }

    pub fn debit(&mut self, actor: ActorId, amount: Amount, key: PostingKey, at: DateTime<Utc>) {
        self.postings.push(Posting {
            key,
            actor,
            direction: Direction::Debit,
            amount,
            at,
        });
    }

    /// Credits `value` if it is non-zero.
    pub fn credit_value(
        &mut self,
        actor: ActorId,
        value: u64,
        key: PostingKey,
        at: DateTime<Utc>,
    ) {
        if let Ok(amount) = Amount::new(value) {
            self.credit(actor, amount, key, at);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Resolves the batch against current balances and already-applied keys.
    ///
    /// Replayed keys, including duplicates within the batch, are dropped.
    /// Returns the postings to append and the resulting balances of every
    /// touched actor, or `InsufficientFunds` if any debit would go negative
    /// and `BalanceOverflow` if any credit would not fit.
    pub fn plan<B, K>(self, balance_of: B, key_applied: K) -> Result<LedgerPlan>
    where
        B: Fn(&ActorId) -> Balance,
        K: Fn(&PostingKey) -> bool,
    {
        let mut seen = HashSet::new();
        let mut balances: BTreeMap<ActorId, Balance> = BTreeMap::new();
        let mut applied = Vec::new();

        for posting in self.postings {
            if key_applied(&posting.key) || !seen.insert(posting.key.clone()) {
                continue;
            }
            let current = *balances
                .entry(posting.actor.clone())
                .or_insert_with(|| balance_of(&posting.actor));
            let next = match posting.direction {
                Direction::Credit => current.credit(posting.amount).ok_or_else(|| {
                    OrderError::BalanceOverflow {
                        actor: posting.actor.clone(),
                    }
                })?,
                Direction::Debit => {
                    current
                        .debit(posting.amount)
                        .ok_or_else(|| OrderError::InsufficientFunds {
                            actor: posting.actor.clone(),
                            requested: posting.amount.value(),
                            available: current,
                        })?
                }
            };
            balances.insert(posting.actor.clone(), next);
            applied.push(posting);
        }

        Ok(LedgerPlan {
            postings: applied,
            balances,
        })
    }
}

/// A validated batch ready to be written.
#[derive(Debug, Default)]
pub struct LedgerPlan {
    pub postings: Vec<Posting>,
    pub balances: BTreeMap<ActorId, Balance>,
}
