//! Change Records
//!
//! Immutable descriptions of one primary mutation, replayed on
//! secondaries. Payloads always carry the resulting entity state so a
//! secondary never has to merge anything itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{CartLine, DocumentStore, Order, Product};

/// Sequence number assigned by the primary to each change
pub type Sequence = u64;

/// The mutation a record replays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOp {
    /// Product created; payload is the new product
    AddProduct(Product),
    /// Product updated; payload is the fully merged product
    UpdateProduct(Product),
    /// Product deleted; payload is the product as it was removed
    DeleteProduct(Product),
    /// Order placed
    AddOrder(Order),
    /// A user's cart changed; payload is the whole resulting cart
    #[serde(rename_all = "camelCase")]
    SetCart { user_id: String, lines: Vec<CartLine> },
}

impl ChangeOp {
    /// Operation name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOp::AddProduct(_) => "ADD_PRODUCT",
            ChangeOp::UpdateProduct(_) => "UPDATE_PRODUCT",
            ChangeOp::DeleteProduct(_) => "DELETE_PRODUCT",
            ChangeOp::AddOrder(_) => "ADD_ORDER",
            ChangeOp::SetCart { .. } => "SET_CART",
        }
    }

    /// Identifier of the touched entity
    pub fn entity_id(&self) -> String {
        match self {
            ChangeOp::AddProduct(p) | ChangeOp::UpdateProduct(p) | ChangeOp::DeleteProduct(p) => {
                p.id.to_string()
            }
            ChangeOp::AddOrder(o) => o.order_id.to_string(),
            ChangeOp::SetCart { user_id, .. } => user_id.clone(),
        }
    }
}

/// What happened when a record was applied to a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Update or delete whose target is not on the replica
    Dropped,
}

/// One replicated mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    seq: Sequence,
    created_at: DateTime<Utc>,
    op: ChangeOp,
}

impl ChangeRecord {
    pub fn new(seq: Sequence, op: ChangeOp) -> Self {
        Self {
            seq,
            created_at: Utc::now(),
            op,
        }
    }

    pub fn seq(&self) -> Sequence {
        self.seq
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn op(&self) -> &ChangeOp {
        &self.op
    }

    /// Replay this change on a replica's in-memory tables
    pub fn apply_to(&self, store: &mut DocumentStore) -> ApplyOutcome {
        let applied = match &self.op {
            ChangeOp::AddProduct(product) => {
                store.append_product(product.clone());
                true
            }
            ChangeOp::UpdateProduct(product) => store.replace_product(product),
            ChangeOp::DeleteProduct(product) => store.remove_product(product.id),
            ChangeOp::AddOrder(order) => {
                store.append_order(order.clone());
                true
            }
            ChangeOp::SetCart { user_id, lines } => {
                store.set_cart(user_id, lines.clone());
                true
            }
        };

        if applied {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Dropped
        }
    }
}

impl std::fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} {}", self.seq, self.op.kind(), self.op.entity_id())
    }
}
