//! Primary Coordinator
//!
//! Accepts every catalog write. Each mutation is applied to the primary,
//! persisted, turned into a change record and handed to the replication
//! strategy while the primary's write lock is still held, so records reach
//! the strategy in exactly the order the primary applied them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::ReplicationMode;
use crate::error::{Error, Result};
use crate::replication::{ChangeOp, ChangeRecord, ReplicaStatus, ReplicationStrategy, Sequence};
use crate::store::{
    CartLine, DocumentStore, Order, OrderItemRequest, Product, ProductDraft, ProductFilter, ProductPatch,
    SharedStore, StoreCounts,
};

/// Replication overview for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub mode: ReplicationMode,
    pub primary: StoreCounts,
    pub last_sequence: Sequence,
    pub replicas: Vec<ReplicaStatus>,
}

pub struct PrimaryCoordinator {
    primary: SharedStore,
    strategy: Arc<dyn ReplicationStrategy>,
    last_seq: AtomicU64,
}

impl PrimaryCoordinator {
    pub fn new(primary: SharedStore, strategy: Arc<dyn ReplicationStrategy>) -> Self {
        Self {
            primary,
            strategy,
            last_seq: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> ReplicationMode {
        self.strategy.mode()
    }

    pub fn primary(&self) -> &SharedStore {
        &self.primary
    }

    /// Persist the primary and hand the change to the strategy.
    ///
    /// The in-memory mutation has already happened, so the change is
    /// propagated even when the primary snapshot cannot be written; the
    /// next successful persist catches the primary's disk up.
    async fn commit(&self, primary: &DocumentStore, op: ChangeOp) -> Result<()> {
        let persisted = primary.persist();
        if let Err(e) = &persisted {
            tracing::error!("Primary snapshot failed, replicating {} {} anyway: {}", op.kind(), op.entity_id(), e);
        }

        let seq = self.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = ChangeRecord::new(seq, op);
        tracing::debug!("Propagating {} ({})", record, self.strategy.mode());
        let replicated = self.strategy.propagate(record).await;

        match (persisted, replicated) {
            (Err(e), Err(r)) => {
                tracing::error!("Replication after failed primary snapshot also failed: {}", r);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), replicated) => replicated,
        }
    }

    // ============ Products ============

    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;

        let mut primary = self.primary.write().await;
        let product = primary.insert_product(draft);
        tracing::info!("Created product {} ({})", product.id, product.name);

        self.commit(&primary, ChangeOp::AddProduct(product.clone())).await?;
        Ok(product)
    }

    pub async fn update_product(&self, id: u64, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;

        let mut primary = self.primary.write().await;
        let product = primary.update_product(id, &patch)?;
        tracing::info!("Updated product {}", id);

        self.commit(&primary, ChangeOp::UpdateProduct(product.clone())).await?;
        Ok(product)
    }

    /// Delete a product, returning it as it was before removal
    pub async fn delete_product(&self, id: u64) -> Result<Product> {
        let mut primary = self.primary.write().await;
        let removed = primary.delete_product(id)?;
        tracing::info!("Deleted product {}", id);

        self.commit(&primary, ChangeOp::DeleteProduct(removed.clone())).await?;
        Ok(removed)
    }

    pub async fn get_product(&self, id: u64) -> Result<Product> {
        self.primary
            .read()
            .await
            .product(id)
            .cloned()
            .ok_or_else(|| Error::product_not_found(id))
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> Vec<Product> {
        self.primary.read().await.products(filter)
    }

    // ============ Orders ============

    /// Place an order. Items for unknown products are left out of the
    /// order and its total without failing the request.
    pub async fn create_order(
        &self,
        user_id: Option<String>,
        items: Vec<OrderItemRequest>,
    ) -> Result<Order> {
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(Error::Validation(format!(
                "quantity for product {} must be at least 1",
                item.product_id
            )));
        }

        let mut primary = self.primary.write().await;
        let order = primary.insert_order(user_id, &items);

        if order.items.len() < items.len() {
            tracing::debug!(
                "Order {} skipped {} unknown products",
                order.order_id,
                items.len() - order.items.len()
            );
        }
        tracing::info!("Created order {} (total {:.2})", order.order_id, order.total_price);

        self.commit(&primary, ChangeOp::AddOrder(order.clone())).await?;
        Ok(order)
    }

    pub async fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        self.primary.read().await.orders_for_user(user_id)
    }

    // ============ Carts ============

    pub async fn cart(&self, user_id: &str) -> Vec<CartLine> {
        self.primary.read().await.cart(user_id)
    }

    pub async fn add_to_cart(&self, user_id: &str, product_id: u64, quantity: u32) -> Result<Vec<CartLine>> {
        if user_id.is_empty() {
            return Err(Error::Validation("userId cannot be empty".into()));
        }
        if quantity == 0 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }

        let mut primary = self.primary.write().await;
        let lines = primary.add_to_cart(user_id, product_id, quantity);

        let op = ChangeOp::SetCart {
            user_id: user_id.to_string(),
            lines: lines.clone(),
        };
        self.commit(&primary, op).await?;
        Ok(lines)
    }

    /// Remove a product from a cart. A user without a cart gets an empty
    /// cart back and nothing is written.
    pub async fn remove_from_cart(&self, user_id: &str, product_id: u64) -> Result<Vec<CartLine>> {
        let mut primary = self.primary.write().await;
        let lines = match primary.remove_from_cart(user_id, product_id) {
            Some(lines) => lines,
            None => return Ok(Vec::new()),
        };

        let op = ChangeOp::SetCart {
            user_id: user_id.to_string(),
            lines: lines.clone(),
        };
        self.commit(&primary, op).await?;
        Ok(lines)
    }

    // ============ Status ============

    pub async fn status(&self) -> CoordinatorStatus {
        let primary = self.primary.read().await.counts();
        CoordinatorStatus {
            mode: self.strategy.mode(),
            primary,
            last_sequence: self.last_seq.load(Ordering::SeqCst),
            replicas: self.strategy.replicas().await,
        }
    }

    /// Write the primary snapshot (used on shutdown)
    pub async fn flush(&self) -> Result<()> {
        self.primary.read().await.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{AsyncReplicator, SyncMirrorer};
    use crate::store::{DocumentStore, MemoryBackend, SharedStore};
    use std::time::Duration;

    fn pen() -> ProductDraft {
        ProductDraft {
            name: "Pen".into(),
            description: "Blue ink".into(),
            price: 1.5,
            category: "Office".into(),
            in_stock: true,
        }
    }

    fn notebook() -> ProductDraft {
        ProductDraft {
            name: "Notebook".into(),
            description: String::new(),
            price: 3.0,
            category: "Office".into(),
            in_stock: false,
        }
    }

    fn store(name: &str, backend: &Arc<MemoryBackend>) -> SharedStore {
        DocumentStore::open(name, Box::new(Arc::clone(backend))).unwrap().into_shared()
    }

    struct SyncFixture {
        coordinator: PrimaryCoordinator,
        primary_backend: Arc<MemoryBackend>,
        secondary_backend: Arc<MemoryBackend>,
        secondary: SharedStore,
    }

    fn sync_fixture() -> SyncFixture {
        let primary_backend = Arc::new(MemoryBackend::new());
        let secondary_backend = Arc::new(MemoryBackend::new());
        let secondary = store("secondary", &secondary_backend);
        let mirror = Arc::new(SyncMirrorer::new(vec![Arc::clone(&secondary)]));
        SyncFixture {
            coordinator: PrimaryCoordinator::new(store("primary", &primary_backend), mirror),
            primary_backend,
            secondary_backend,
            secondary,
        }
    }

    async fn async_fixture() -> (PrimaryCoordinator, Arc<AsyncReplicator>) {
        let secondary = DocumentStore::in_memory("secondary").into_shared();
        let replicator =
            Arc::new(AsyncReplicator::new(vec![secondary], Duration::from_secs(3600)).await);
        let primary = DocumentStore::in_memory("primary").into_shared();
        let coordinator = PrimaryCoordinator::new(primary, Arc::clone(&replicator) as Arc<dyn ReplicationStrategy>);
        (coordinator, replicator)
    }

    #[tokio::test]
    async fn test_pen_scenario() {
        let (coordinator, _) = async_fixture().await;

        let first = coordinator.create_product(pen()).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.name, "Pen");
        let second = coordinator.create_product(notebook()).await.unwrap();
        assert_eq!(second.id, 2);

        let order = coordinator
            .create_order(
                None,
                vec![
                    OrderItemRequest { product_id: 1, quantity: 4 },
                    OrderItemRequest { product_id: 99, quantity: 1 },
                ],
            )
            .await
            .unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product, first);
        assert_eq!(order.items[0].quantity, 4);
        assert_eq!(order.total_price, 6.0);
        assert_eq!(order.user_id, None);
    }

    #[tokio::test]
    async fn test_ids_unique_and_increasing_across_deletes() {
        let (coordinator, _) = async_fixture().await;
        let mut issued = Vec::new();
        for round in 0..5 {
            let product = coordinator.create_product(pen()).await.unwrap();
            issued.push(product.id);
            if round % 2 == 0 {
                coordinator.delete_product(product.id).await.unwrap();
            }
        }
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_invalid_input_mutates_nothing() {
        let fixture = sync_fixture();
        let bad = ProductDraft { price: -2.0, ..pen() };
        assert!(matches!(
            fixture.coordinator.create_product(bad).await,
            Err(Error::Validation(_))
        ));
        assert!(fixture.primary_backend.last_written().is_none());
        assert!(fixture.secondary_backend.last_written().is_none());
        assert_eq!(fixture.coordinator.status().await.last_sequence, 0);
    }

    #[tokio::test]
    async fn test_sync_primary_and_secondary_match_after_each_write() {
        let fixture = sync_fixture();
        let coordinator = &fixture.coordinator;

        let created = coordinator.create_product(pen()).await.unwrap();
        assert_eq!(fixture.secondary.read().await.product(created.id), Some(&created));

        let patch = ProductPatch { price: Some(2.0), ..Default::default() };
        let updated = coordinator.update_product(created.id, patch).await.unwrap();
        assert_eq!(updated.price, 2.0);
        assert_eq!(updated.name, "Pen");
        assert_eq!(fixture.secondary.read().await.product(created.id), Some(&updated));
        assert_eq!(
            fixture.secondary_backend.last_written().unwrap().products,
            vec![updated.clone()]
        );

        coordinator.delete_product(created.id).await.unwrap();
        assert!(matches!(
            coordinator.get_product(created.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(fixture.secondary.read().await.product(created.id).is_none());
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_primary_change() {
        let fixture = sync_fixture();
        fixture.secondary_backend.set_fail_writes(true);

        let result = fixture.coordinator.create_product(pen()).await;
        assert!(matches!(result, Err(Error::Replication { .. })));

        // No rollback: the primary holds and has persisted the product
        assert!(fixture.coordinator.get_product(1).await.is_ok());
        assert_eq!(fixture.primary_backend.last_written().unwrap().products.len(), 1);
    }

    #[tokio::test]
    async fn test_primary_persist_failure_still_reaches_secondary() {
        let fixture = sync_fixture();
        let coordinator = &fixture.coordinator;
        fixture.primary_backend.set_fail_writes(true);

        let result = coordinator.create_product(pen()).await;
        assert!(matches!(result, Err(Error::Snapshot { .. })));
        let kept = coordinator.get_product(1).await.unwrap();
        assert_eq!(fixture.secondary.read().await.product(1), Some(&kept));

        // Later writes to the same id keep mirroring
        fixture.primary_backend.set_fail_writes(false);
        let updated = coordinator
            .update_product(1, ProductPatch { price: Some(9.0), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(fixture.secondary.read().await.product(1), Some(&updated));
        assert_eq!(fixture.primary_backend.last_written().unwrap().products, vec![updated]);

        coordinator.delete_product(1).await.unwrap();
        assert!(fixture.secondary.read().await.product(1).is_none());
    }

    #[tokio::test]
    async fn test_primary_persist_failure_still_queues_async_record() {
        let primary_backend = Arc::new(MemoryBackend::new());
        primary_backend.set_fail_writes(true);
        let secondary = DocumentStore::in_memory("secondary").into_shared();
        let replicator =
            Arc::new(AsyncReplicator::new(vec![secondary], Duration::from_secs(3600)).await);
        let coordinator = PrimaryCoordinator::new(
            store("primary", &primary_backend),
            Arc::clone(&replicator) as Arc<dyn ReplicationStrategy>,
        );

        assert!(coordinator.add_to_cart("u1", 3, 2).await.is_err());

        let worker = &replicator.workers()[0];
        assert_eq!(worker.queue().len().await, 1);
        worker.drain_once().await.unwrap();
        assert_eq!(worker.secondary().read().await.cart("u1"), coordinator.cart("u1").await);
    }

    #[tokio::test]
    async fn test_async_write_queues_exactly_one_record() {
        let (coordinator, replicator) = async_fixture().await;
        let worker = &replicator.workers()[0];

        let product = coordinator.create_product(pen()).await.unwrap();

        let pending = worker.queue().pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op(), &ChangeOp::AddProduct(product.clone()));
        assert!(worker.secondary().read().await.product(product.id).is_none());

        worker.drain_once().await.unwrap();
        assert_eq!(worker.secondary().read().await.product(product.id), Some(&product));
    }

    #[tokio::test]
    async fn test_async_delete_reaches_secondary_after_drain() {
        let (coordinator, replicator) = async_fixture().await;
        let worker = &replicator.workers()[0];

        let product = coordinator.create_product(pen()).await.unwrap();
        worker.drain_once().await.unwrap();

        coordinator.delete_product(product.id).await.unwrap();
        assert!(worker.secondary().read().await.product(product.id).is_some());

        worker.drain_once().await.unwrap();
        assert!(worker.secondary().read().await.product(product.id).is_none());
    }

    #[tokio::test]
    async fn test_async_queue_preserves_mutation_order() {
        let (coordinator, replicator) = async_fixture().await;
        let created = coordinator.create_product(pen()).await.unwrap();
        coordinator
            .update_product(created.id, ProductPatch { in_stock: Some(false), ..Default::default() })
            .await
            .unwrap();
        coordinator.add_to_cart("u1", created.id, 2).await.unwrap();

        let kinds: Vec<&str> = replicator.workers()[0]
            .queue()
            .pending()
            .await
            .iter()
            .map(|r| r.op().kind())
            .collect();
        assert_eq!(kinds, vec!["ADD_PRODUCT", "UPDATE_PRODUCT", "SET_CART"]);
    }

    #[tokio::test]
    async fn test_cart_add_merges_and_replicates() {
        let fixture = sync_fixture();
        let coordinator = &fixture.coordinator;

        coordinator.add_to_cart("u1", 5, 2).await.unwrap();
        let lines = coordinator.add_to_cart("u1", 5, 3).await.unwrap();
        assert_eq!(lines, vec![CartLine { product_id: 5, quantity: 5 }]);
        assert_eq!(fixture.secondary.read().await.cart("u1"), lines);

        let lines = coordinator.remove_from_cart("u1", 5).await.unwrap();
        assert!(lines.is_empty());
        assert!(fixture.secondary.read().await.cart("u1").is_empty());
    }

    #[tokio::test]
    async fn test_remove_from_missing_cart_writes_nothing() {
        let fixture = sync_fixture();
        let lines = fixture.coordinator.remove_from_cart("nobody", 1).await.unwrap();
        assert!(lines.is_empty());
        assert!(fixture.primary_backend.last_written().is_none());
        assert_eq!(fixture.coordinator.status().await.last_sequence, 0);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let fixture = sync_fixture();
        assert!(matches!(
            fixture.coordinator.add_to_cart("u1", 1, 0).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            fixture
                .coordinator
                .create_order(None, vec![OrderItemRequest { product_id: 1, quantity: 0 }])
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_orders_replicate_and_filter_by_user() {
        let fixture = sync_fixture();
        let coordinator = &fixture.coordinator;
        coordinator.create_product(pen()).await.unwrap();

        let order = coordinator
            .create_order(Some("alice".into()), vec![OrderItemRequest { product_id: 1, quantity: 2 }])
            .await
            .unwrap();
        coordinator.create_order(Some("bob".into()), vec![]).await.unwrap();

        assert_eq!(coordinator.orders_for_user("alice").await, vec![order.clone()]);
        assert_eq!(fixture.secondary.read().await.orders_for_user("alice"), vec![order]);
    }

    #[tokio::test]
    async fn test_status() {
        let (coordinator, _) = async_fixture().await;
        coordinator.create_product(pen()).await.unwrap();

        let status = coordinator.status().await;
        assert_eq!(status.mode, ReplicationMode::Async);
        assert_eq!(status.primary.products, 1);
        assert_eq!(status.last_sequence, 1);
        assert_eq!(status.replicas[0].pending, 1);
        assert_eq!(status.replicas[0].counts.products, 0);
    }
}
