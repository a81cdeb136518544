//! Catalog Entity Types
//!
//! Products, orders and cart lines as they are stored, replicated and
//! serialized to snapshots and API responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// A catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub in_stock: bool,
}

/// Fields supplied when creating a product
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub in_stock: bool,
}

impl ProductDraft {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("product name cannot be empty".into()));
        }
        validate_price(self.price)
    }

    /// Materialize the draft under an assigned id
    pub fn into_product(self, id: u64) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            category: self.category,
            in_stock: self.in_stock,
        }
    }
}

/// Partial product update; `None` fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("product name cannot be empty".into()));
            }
        }
        match self.price {
            Some(price) => validate_price(price),
            None => Ok(()),
        }
    }

    /// Shallow-merge the provided fields onto `product`
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
        if let Some(in_stock) = self.in_stock {
            product.in_stock = in_stock;
        }
    }
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(Error::Validation(format!("invalid price {}", price)));
    }
    Ok(())
}

/// Product listing filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    /// Category, compared case-insensitively
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = &self.category {
            if !product.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(in_stock) = self.in_stock {
            if product.in_stock != in_stock {
                return false;
            }
        }
        true
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
}

/// One resolved order line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product as it was when the order was placed
    pub product: Product,
    pub quantity: u32,
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: u64,
    #[serde(default, deserialize_with = "deserialize_user_id")]
    pub user_id: Option<String>,
    pub items: Vec<OrderLine>,
    pub total_price: f64,
    pub status: OrderStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Requested order line before product resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: u64,
    pub quantity: u32,
}

/// One line of a user's cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: u64,
    pub quantity: u32,
}

/// Highest ids ever issued, so deleted ids are never handed out again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdWatermarks {
    pub product: u64,
    pub order: u64,
}

/// Everything a store holds; the unit written to and read from a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub carts: BTreeMap<String, Vec<CartLine>>,
    #[serde(default)]
    pub watermarks: IdWatermarks,
}

/// User ids arrive as strings or bare numbers; both are stored as strings
pub fn deserialize_user_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "userId must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pen() -> Product {
        Product {
            id: 1,
            name: "Pen".into(),
            description: "Blue ink".into(),
            price: 1.5,
            category: "Office".into(),
            in_stock: true,
        }
    }

    #[test]
    fn test_patch_keeps_unspecified_fields() {
        let mut product = pen();
        let patch = ProductPatch {
            price: Some(2.25),
            in_stock: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut product);

        assert_eq!(product.price, 2.25);
        assert!(!product.in_stock);
        assert_eq!(product.name, "Pen");
        assert_eq!(product.category, "Office");
    }

    #[test]
    fn test_validation() {
        let draft = ProductDraft { name: "Pen".into(), price: -1.0, ..Default::default() };
        assert!(draft.validate().is_err());

        let draft = ProductDraft { name: "  ".into(), price: 1.0, ..Default::default() };
        assert!(draft.validate().is_err());

        let patch = ProductPatch { price: Some(f64::NAN), ..Default::default() };
        assert!(patch.validate().is_err());
        assert!(ProductPatch::default().validate().is_ok());
    }

    #[test]
    fn test_filter_category_is_case_insensitive() {
        let filter = ProductFilter { category: Some("office".into()), in_stock: Some(true) };
        assert!(filter.matches(&pen()));

        let filter = ProductFilter { category: Some("Garden".into()), in_stock: None };
        assert!(!filter.matches(&pen()));

        let filter = ProductFilter { category: None, in_stock: Some(false) };
        assert!(!filter.matches(&pen()));
    }

    #[test]
    fn test_product_wire_names() {
        let json = serde_json::to_value(pen()).unwrap();
        assert_eq!(json["inStock"], serde_json::json!(true));
        assert!(json.get("in_stock").is_none());
    }

    #[test]
    fn test_user_id_accepts_numbers() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "orderId": 3,
            "userId": 42,
            "items": [],
            "totalPrice": 0.0,
            "status": "Pending"
        }))
        .unwrap();
        assert_eq!(order.user_id.as_deref(), Some("42"));

        let order: Order = serde_json::from_value(serde_json::json!({
            "orderId": 4,
            "userId": null,
            "items": [],
            "totalPrice": 0.0,
            "status": "Pending"
        }))
        .unwrap();
        assert_eq!(order.user_id, None);
    }

    #[test]
    fn test_legacy_snapshot_without_watermarks() {
        let tables: TableSet = serde_json::from_str(
            r#"{"products": [], "orders": [], "carts": {"7": [{"productId": 1, "quantity": 2}]}}"#,
        )
        .unwrap();
        assert_eq!(tables.watermarks, IdWatermarks::default());
        assert_eq!(tables.carts["7"][0].quantity, 2);
    }
}
