//! Domain layer: entities, value objects, pure policy and the ports the
//! application layer depends on.

pub mod actor;
pub mod cart;
pub mod ledger;
pub mod money;
pub mod notification;
pub mod order;
pub mod policy;
pub mod ports;
pub mod ride;
