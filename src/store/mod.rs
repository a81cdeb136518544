//! Document Store Module
//!
//! In-memory catalog tables (products, orders, carts) mirrored to a
//! full-state snapshot. The store does no locking of its own; callers hold
//! a [`SharedStore`] lock across each mutate-and-persist sequence.

pub mod model;
pub mod snapshot;

pub use model::{
    CartLine, IdWatermarks, Order, OrderItemRequest, OrderLine, OrderStatus, Product,
    ProductDraft, ProductFilter, ProductPatch, TableSet,
};
pub use snapshot::{JsonFileBackend, MemoryBackend, SnapshotBackend};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Store handle shared between the coordinator, strategies and the API
pub type SharedStore = Arc<RwLock<DocumentStore>>;

/// Row counts, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub products: usize,
    pub orders: usize,
    pub carts: usize,
}

/// One replica of the catalog
pub struct DocumentStore {
    /// Store name (primary, secondary, ...)
    name: String,
    /// Live tables
    tables: TableSet,
    /// Snapshot medium
    backend: Box<dyn SnapshotBackend>,
}

impl DocumentStore {
    /// Open a store, loading its last snapshot if one exists
    pub fn open(name: impl Into<String>, backend: Box<dyn SnapshotBackend>) -> Result<Self> {
        let name = name.into();
        let tables = backend
            .read_snapshot()
            .map_err(|e| Error::Snapshot {
                store: name.clone(),
                reason: format!("failed to load {}: {}", backend.location(), e),
            })?
            .unwrap_or_default();

        tracing::debug!(
            "Opened store {} from {} ({} products, {} orders)",
            name,
            backend.location(),
            tables.products.len(),
            tables.orders.len()
        );

        Ok(Self { name, tables, backend })
    }

    /// Open an empty, memory-backed store
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: TableSet::default(),
            backend: Box::new(MemoryBackend::new()),
        }
    }

    /// Wrap into a shareable handle
    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            products: self.tables.products.len(),
            orders: self.tables.orders.len(),
            carts: self.tables.carts.len(),
        }
    }

    /// Write the full table set to the snapshot
    pub fn persist(&self) -> Result<()> {
        self.backend.write_snapshot(&self.tables).map_err(|e| Error::Snapshot {
            store: self.name.clone(),
            reason: format!("failed to write {}: {}", self.backend.location(), e),
        })
    }

    // ============ Products ============

    pub fn product(&self, id: u64) -> Option<&Product> {
        self.tables.products.iter().find(|p| p.id == id)
    }

    /// Products matching `filter`, in insertion order
    pub fn products(&self, filter: &ProductFilter) -> Vec<Product> {
        self.tables
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    /// Insert a new product under the next free id
    pub fn insert_product(&mut self, draft: ProductDraft) -> Product {
        let current_max = self.tables.products.iter().map(|p| p.id).max().unwrap_or(0);
        let id = current_max.max(self.tables.watermarks.product) + 1;
        self.tables.watermarks.product = id;

        let product = draft.into_product(id);
        self.tables.products.push(product.clone());
        product
    }

    /// Merge `patch` onto an existing product and return the result
    pub fn update_product(&mut self, id: u64, patch: &ProductPatch) -> Result<Product> {
        let product = self
            .tables
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::product_not_found(id))?;

        patch.apply_to(product);
        Ok(product.clone())
    }

    /// Remove a product, returning what was removed
    pub fn delete_product(&mut self, id: u64) -> Result<Product> {
        let index = self
            .tables
            .products
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::product_not_found(id))?;

        Ok(self.tables.products.remove(index))
    }

    /// Append a product built elsewhere (replica side)
    pub fn append_product(&mut self, product: Product) {
        self.tables.watermarks.product = self.tables.watermarks.product.max(product.id);
        self.tables.products.push(product);
    }

    /// Overwrite a product with the same id; false if it is not present
    pub fn replace_product(&mut self, product: &Product) -> bool {
        match self.tables.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => {
                *existing = product.clone();
                true
            }
            None => false,
        }
    }

    /// Remove a product if present
    pub fn remove_product(&mut self, id: u64) -> bool {
        let before = self.tables.products.len();
        self.tables.products.retain(|p| p.id != id);
        self.tables.products.len() != before
    }

    // ============ Orders ============

    /// Place an order, resolving items against the product table.
    /// Items naming unknown products are skipped.
    pub fn insert_order(&mut self, user_id: Option<String>, items: &[OrderItemRequest]) -> Order {
        let lines: Vec<OrderLine> = items
            .iter()
            .filter_map(|item| {
                self.product(item.product_id).map(|product| OrderLine {
                    product: product.clone(),
                    quantity: item.quantity,
                })
            })
            .collect();

        let total_price = lines
            .iter()
            .map(|line| line.product.price * f64::from(line.quantity))
            .sum();

        let current_max = self.tables.orders.iter().map(|o| o.order_id).max().unwrap_or(0);
        let order_id = current_max.max(self.tables.watermarks.order) + 1;
        self.tables.watermarks.order = order_id;

        let order = Order {
            order_id,
            user_id,
            items: lines,
            total_price,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };
        self.tables.orders.push(order.clone());
        order
    }

    /// Append an order built elsewhere (replica side)
    pub fn append_order(&mut self, order: Order) {
        self.tables.watermarks.order = self.tables.watermarks.order.max(order.order_id);
        self.tables.orders.push(order);
    }

    pub fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        self.tables
            .orders
            .iter()
            .filter(|o| o.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect()
    }

    // ============ Carts ============

    /// A user's cart; a user without one has an empty cart
    pub fn cart(&self, user_id: &str) -> Vec<CartLine> {
        self.tables.carts.get(user_id).cloned().unwrap_or_default()
    }

    /// Add to a cart, merging into an existing line for the same product
    pub fn add_to_cart(&mut self, user_id: &str, product_id: u64, quantity: u32) -> Vec<CartLine> {
        let lines = self.tables.carts.entry(user_id.to_string()).or_default();

        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => lines.push(CartLine { product_id, quantity }),
        }

        lines.clone()
    }

    /// Drop a product from a cart. `None` if the user has no cart at all.
    pub fn remove_from_cart(&mut self, user_id: &str, product_id: u64) -> Option<Vec<CartLine>> {
        let lines = self.tables.carts.get_mut(user_id)?;
        lines.retain(|l| l.product_id != product_id);
        Some(lines.clone())
    }

    /// Replace a user's cart wholesale (replica side)
    pub fn set_cart(&mut self, user_id: &str, lines: Vec<CartLine>) {
        self.tables.carts.insert(user_id.to_string(), lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, price: f64, category: &str, in_stock: bool) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            description: String::new(),
            price,
            category: category.into(),
            in_stock,
        }
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut store = DocumentStore::in_memory("primary");
        let a = store.insert_product(draft("Pen", 1.5, "Office", true));
        let b = store.insert_product(draft("Desk", 120.0, "Furniture", false));
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_ids_not_reused_after_deleting_highest() {
        let mut store = DocumentStore::in_memory("primary");
        store.insert_product(draft("Pen", 1.5, "Office", true));
        let second = store.insert_product(draft("Desk", 120.0, "Furniture", false));
        store.delete_product(second.id).unwrap();

        let third = store.insert_product(draft("Lamp", 30.0, "Furniture", true));
        assert_eq!(third.id, 3);
    }

    #[test]
    fn test_list_with_filters() {
        let mut store = DocumentStore::in_memory("primary");
        store.insert_product(draft("Pen", 1.5, "Office", true));
        store.insert_product(draft("Stapler", 8.0, "OFFICE", false));
        store.insert_product(draft("Chair", 80.0, "Furniture", true));

        let office = store.products(&ProductFilter {
            category: Some("office".into()),
            in_stock: None,
        });
        assert_eq!(office.len(), 2);

        let office_in_stock = store.products(&ProductFilter {
            category: Some("Office".into()),
            in_stock: Some(true),
        });
        assert_eq!(office_in_stock.len(), 1);
        assert_eq!(office_in_stock[0].name, "Pen");

        let all = store.products(&ProductFilter::default());
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Pen", "Stapler", "Chair"]);
    }

    #[test]
    fn test_update_and_delete_missing() {
        let mut store = DocumentStore::in_memory("primary");
        assert!(matches!(
            store.update_product(5, &ProductPatch::default()),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(store.delete_product(5), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_order_skips_unknown_products() {
        let mut store = DocumentStore::in_memory("primary");
        store.insert_product(draft("Pen", 1.5, "Office", true));

        let order = store.insert_order(
            None,
            &[
                OrderItemRequest { product_id: 1, quantity: 4 },
                OrderItemRequest { product_id: 99, quantity: 1 },
            ],
        );

        assert_eq!(order.order_id, 1);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product.name, "Pen");
        assert_eq!(order.items[0].quantity, 4);
        assert_eq!(order.total_price, 6.0);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_orders_for_user() {
        let mut store = DocumentStore::in_memory("primary");
        store.insert_order(Some("alice".into()), &[]);
        store.insert_order(Some("bob".into()), &[]);
        store.insert_order(None, &[]);

        let orders = store.orders_for_user("alice");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, 1);
    }

    #[test]
    fn test_cart_merges_lines() {
        let mut store = DocumentStore::in_memory("primary");
        store.add_to_cart("u1", 5, 2);
        let lines = store.add_to_cart("u1", 5, 3);
        assert_eq!(lines, vec![CartLine { product_id: 5, quantity: 5 }]);

        let lines = store.add_to_cart("u1", 6, 1);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_remove_from_missing_cart() {
        let mut store = DocumentStore::in_memory("primary");
        assert_eq!(store.remove_from_cart("ghost", 1), None);
        assert!(store.cart("ghost").is_empty());
        assert_eq!(store.counts().carts, 0);

        store.add_to_cart("u1", 1, 1);
        store.add_to_cart("u1", 2, 1);
        assert_eq!(
            store.remove_from_cart("u1", 1),
            Some(vec![CartLine { product_id: 2, quantity: 1 }])
        );
    }

    #[test]
    fn test_persist_and_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        let mut store = DocumentStore::open("primary", Box::new(Arc::clone(&backend))).unwrap();
        store.insert_product(draft("Pen", 1.5, "Office", true));
        store.add_to_cart("u1", 1, 2);
        store.persist().unwrap();

        let reopened = DocumentStore::open("primary", Box::new(backend)).unwrap();
        assert_eq!(reopened.tables(), store.tables());
    }

    #[test]
    fn test_persist_failure_names_store() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_writes(true);
        let store = DocumentStore::open("secondary", Box::new(backend)).unwrap();

        match store.persist() {
            Err(Error::Snapshot { store, .. }) => assert_eq!(store, "secondary"),
            other => panic!("expected snapshot error, got {:?}", other),
        }
    }

    #[test]
    fn test_replica_side_application() {
        let mut store = DocumentStore::in_memory("secondary");
        let pen = draft("Pen", 1.5, "Office", true).into_product(7);

        store.append_product(pen.clone());
        assert_eq!(store.tables().watermarks.product, 7);

        let mut updated = pen.clone();
        updated.price = 2.0;
        assert!(store.replace_product(&updated));
        assert_eq!(store.product(7).map(|p| p.price), Some(2.0));

        assert!(store.remove_product(7));
        assert!(!store.remove_product(7));
        assert!(!store.replace_product(&updated));
    }
}
