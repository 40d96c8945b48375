//! Application layer orchestrating the domain through the ports.
//!
//! `OrderEngine` is the order state machine, `RideDispatcher` matches drivers
//! to ride orders, `AutoCompletionTimer` settles orders the buyer never
//! confirmed and `WalletService` moves money in and out of wallets.

pub mod engine;
pub mod rides;
pub mod sweeper;
pub mod wallet;
