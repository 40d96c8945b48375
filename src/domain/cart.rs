use super::actor::ActorId;
use super::order::OrderItem;
use serde::{Deserialize, Serialize};

/// A voucher carried by a single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVoucher {
    pub code: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub item: OrderItem,
    #[serde(default = "selected_by_default")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher: Option<ItemVoucher>,
}

fn selected_by_default() -> bool {
    true
}

/// A checkout request: the buyer's cart with the voucher code they typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub buyer_id: ActorId,
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

impl Cart {
    pub fn selected(&self) -> impl Iterator<Item = &CartItem> {
        self.items.iter().filter(|line| line.selected)
    }

    /// Drops a line entirely, as removing it from the cart does.
    pub fn remove(&mut self, product_id: &str) {
        self.items.retain(|line| line.item.product_id != product_id);
    }

    pub fn deselect(&mut self, product_id: &str) {
        for line in &mut self.items {
            if line.item.product_id == product_id {
                line.selected = false;
            }
        }
    }
}
