use crate::dto::ProductRecord;
use crate::error::ServiceError;
use tokio::sync::Mutex;

/// Writes produced by a merge: the kept record's new totals and the records
/// to deactivate.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeUpdate {
    pub keep_id: String,
    pub stock: u64,
    pub description: Option<String>,
    pub deactivate_ids: Vec<String>,
}

///
/// Storage seen by the merge executor and the pre-insert check.
///
/// Records are never deleted: merged-away products are deactivated so past
/// orders keep resolving.
///
#[allow(async_fn_in_trait)]
pub trait ProductRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<ProductRecord>, ServiceError>;

    async fn list_active(&self) -> Result<Vec<ProductRecord>, ServiceError>;

    async fn update_stock_and_description(
        &self,
        id: &str,
        stock: u64,
        description: Option<&str>,
    ) -> Result<(), ServiceError>;

    async fn set_active(&self, id: &str, active: bool) -> Result<(), ServiceError>;

    /// Applies a merge. Stores with transactions should override this so the
    /// update and the deactivations commit together.
    async fn apply_merge(&self, update: &MergeUpdate) -> Result<(), ServiceError> {
        self.update_stock_and_description(
            &update.keep_id,
            update.stock,
            update.description.as_deref(),
        )
        .await?;
        for id in &update.deactivate_ids {
            self.set_active(id, false).await?;
        }
        Ok(())
    }
}

/// Catalog held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: Mutex<Vec<ProductRecord>>,
}

impl InMemoryProductRepository {
    pub fn new(products: impl IntoIterator<Item = ProductRecord>) -> Self {
        Self {
            products: Mutex::new(products.into_iter().collect()),
        }
    }
}

fn find_mut<'a>(
    products: &'a mut [ProductRecord],
    id: &str,
) -> Result<&'a mut ProductRecord, ServiceError> {
    products
        .iter_mut()
        .find(|product| product.id == id)
        .ok_or_else(|| ServiceError::not_found(format!("Product {} not found", id)))
}

impl ProductRepository for InMemoryProductRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<ProductRecord>, ServiceError> {
        let products = self.products.lock().await;
        Ok(products.iter().find(|product| product.id == id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ProductRecord>, ServiceError> {
        let products = self.products.lock().await;
        Ok(products.iter().filter(|p| p.active).cloned().collect())
    }

    async fn update_stock_and_description(
        &self,
        id: &str,
        stock: u64,
        description: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut products = self.products.lock().await;
        let product = find_mut(&mut products, id)?;
        product.stock = Some(stock);
        product.description = description.map(str::to_string);
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), ServiceError> {
        let mut products = self.products.lock().await;
        find_mut(&mut products, id)?.active = active;
        Ok(())
    }

    async fn apply_merge(&self, update: &MergeUpdate) -> Result<(), ServiceError> {
        let mut products = self.products.lock().await;
        for id in std::iter::once(&update.keep_id).chain(&update.deactivate_ids) {
            find_mut(&mut products, id)?;
        }
        let keep = find_mut(&mut products, &update.keep_id)?;
        keep.stock = Some(update.stock);
        keep.description = update.description.clone();
        for id in &update.deactivate_ids {
            find_mut(&mut products, id)?.active = false;
        }
        Ok(())
    }
}
