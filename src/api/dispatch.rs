//! Command Dispatch
//!
//! Every catalog operation as a tagged command. The REST routes and the
//! `/rpc` ingress both end up here, so the two surfaces cannot drift.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ReplicationMode;
use crate::coordinator::PrimaryCoordinator;
use crate::error::{Error, Result};
use crate::store::model::deserialize_user_id;
use crate::store::{OrderItemRequest, ProductDraft, ProductFilter, ProductPatch};

/// A catalog operation, as sent to `/rpc`:
/// `{"op": "createProduct", "fields": {...}}`
#[derive(Debug, Deserialize)]
#[serde(
    tag = "op",
    content = "fields",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    CreateProduct(ProductDraft),
    UpdateProduct {
        id: u64,
        #[serde(flatten)]
        patch: ProductPatch,
    },
    DeleteProduct {
        id: u64,
    },
    GetProduct {
        id: u64,
    },
    ListProducts(ProductFilter),
    CreateOrder(OrderRequest),
    OrdersForUser {
        user_id: String,
    },
    AddToCart {
        user_id: String,
        product_id: u64,
        quantity: u32,
    },
    RemoveFromCart {
        user_id: String,
        product_id: u64,
    },
    Cart {
        user_id: String,
    },
}

/// Order placement body. `items` is checked by hand so a missing or
/// non-array value yields a validation error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default, deserialize_with = "deserialize_user_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub items: Option<Value>,
}

impl OrderRequest {
    pub fn parse_items(self) -> Result<(Option<String>, Vec<OrderItemRequest>)> {
        let items = match self.items {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::Validation("Invalid items array".into())),
        };
        let items = items
            .into_iter()
            .map(serde_json::from_value::<OrderItemRequest>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Validation(format!("Invalid order item: {}", e)))?;
        Ok((self.user_id, items))
    }
}

/// Result of a dispatched command
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// A new entity was created
    pub created: bool,
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self { created: false, body }
    }

    fn created(body: Value) -> Self {
        Self { created: true, body }
    }
}

/// Confirmation returned after a product delete
pub fn delete_message(mode: ReplicationMode) -> &'static str {
    match mode {
        ReplicationMode::Sync => "Product deleted successfully",
        ReplicationMode::Async => "Product removed from primary. Will replicate asynchronously.",
    }
}

/// Run a command against the coordinator
pub async fn dispatch(coordinator: &PrimaryCoordinator, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::CreateProduct(draft) => {
            Reply::created(serde_json::to_value(coordinator.create_product(draft).await?)?)
        }
        Command::UpdateProduct { id, patch } => {
            Reply::ok(serde_json::to_value(coordinator.update_product(id, patch).await?)?)
        }
        Command::DeleteProduct { id } => {
            let removed = coordinator.delete_product(id).await?;
            Reply::ok(json!({
                "message": delete_message(coordinator.mode()),
                "product": removed,
            }))
        }
        Command::GetProduct { id } => {
            Reply::ok(serde_json::to_value(coordinator.get_product(id).await?)?)
        }
        Command::ListProducts(filter) => {
            Reply::ok(serde_json::to_value(coordinator.list_products(&filter).await)?)
        }
        Command::CreateOrder(request) => {
            let (user_id, items) = request.parse_items()?;
            Reply::created(serde_json::to_value(coordinator.create_order(user_id, items).await?)?)
        }
        Command::OrdersForUser { user_id } => {
            Reply::ok(serde_json::to_value(coordinator.orders_for_user(&user_id).await)?)
        }
        Command::AddToCart { user_id, product_id, quantity } => Reply::ok(serde_json::to_value(
            coordinator.add_to_cart(&user_id, product_id, quantity).await?,
        )?),
        Command::RemoveFromCart { user_id, product_id } => Reply::ok(serde_json::to_value(
            coordinator.remove_from_cart(&user_id, product_id).await?,
        )?),
        Command::Cart { user_id } => Reply::ok(serde_json::to_value(coordinator.cart(&user_id).await)?),
    };
    Ok(reply)
}
