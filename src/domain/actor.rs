use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of anybody who can hold a balance or act on an order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Reserved account collecting admin and ride fees.
    pub const PLATFORM: &'static str = "platform";
    /// Reserved actor used by scheduled jobs.
    pub const SYSTEM: &'static str = "system";
    /// Shared inbox of the admin team.
    pub const ADMIN_DESK: &'static str = "admin";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn platform() -> Self {
        Self::new(Self::PLATFORM)
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM)
    }

    pub fn admin_desk() -> Self {
        Self::new(Self::ADMIN_DESK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Driver,
    Admin,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Driver => "driver",
            Role::Admin => "admin",
            Role::System => "system",
        };
        f.write_str(name)
    }
}

/// The authenticated caller of a mutating operation.
///
/// The role is trusted as asserted by the identity layer; party membership
/// is still checked against the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId::new(id),
            role,
        }
    }

    pub fn buyer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Buyer)
    }

    pub fn seller(id: impl Into<String>) -> Self {
        Self::new(id, Role::Seller)
    }

    pub fn driver(id: impl Into<String>) -> Self {
        Self::new(id, Role::Driver)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn system() -> Self {
        Self {
            id: ActorId::system(),
            role: Role::System,
        }
    }
}
