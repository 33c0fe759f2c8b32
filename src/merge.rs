use crate::dto::{MergeRequest, MergeResponse, MergedProduct, ProductRecord};
use crate::error::ServiceError;
use crate::repository::{MergeUpdate, ProductRepository};
use log::{info, warn};
use rustc_hash::FxHashSet;

impl MergeRequest {
    ///
    /// Rejects requests that cannot describe a merge and collapses repeated
    /// remove ids, keeping their first position.
    ///
    pub fn validate(self) -> Result<Self, ServiceError> {
        let keep_product_id = self.keep_product_id.trim().to_string();
        if keep_product_id.is_empty() {
            return Err(ServiceError::bad_request("keepProductId is required"));
        }
        if self.remove_product_ids.is_empty() {
            return Err(ServiceError::bad_request("removeProductIds is required"));
        }
        let mut seen = FxHashSet::default();
        let mut remove_product_ids = Vec::with_capacity(self.remove_product_ids.len());
        for id in self.remove_product_ids {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(ServiceError::bad_request(
                    "removeProductIds must not contain empty ids",
                ));
            }
            if id == keep_product_id {
                return Err(ServiceError::bad_request(
                    "The kept product cannot also be removed",
                ));
            }
            if seen.insert(id.clone()) {
                remove_product_ids.push(id);
            }
        }
        Ok(Self {
            keep_product_id,
            remove_product_ids,
        })
    }
}

///
/// Folds the removed records into the kept one.
///
/// Stock is summed, with missing stock counted as zero. Descriptions are
/// appended after a blank line unless already contained in the accumulated
/// text; the first non-empty one becomes the base when the kept record has
/// none.
///
pub fn plan_merge(keep: &ProductRecord, removes: &[ProductRecord]) -> MergeUpdate {
    let mut stock = keep.stock.unwrap_or(0);
    let mut description = keep.description.clone().unwrap_or_default();
    for product in removes {
        stock = stock.saturating_add(product.stock.unwrap_or(0));
        match product.description.as_deref() {
            Some(extra) if !extra.is_empty() && !description.contains(extra) => {
                if description.is_empty() {
                    description = extra.to_string();
                } else {
                    description.push_str("\n\n");
                    description.push_str(extra);
                }
            }
            _ => {}
        }
    }
    MergeUpdate {
        keep_id: keep.id.clone(),
        stock,
        description: Some(description).filter(|d| !d.is_empty()),
        deactivate_ids: removes.iter().map(|p| p.id.clone()).collect(),
    }
}

///
/// Merges duplicates into the kept product and deactivates them.
///
/// Fails with a not-found error, before any write, when the kept product is
/// missing or inactive. Removed products that are missing, already inactive,
/// or resolve to a record other than the one requested are skipped.
///
pub async fn merge_products<R: ProductRepository>(
    repository: &R,
    request: MergeRequest,
) -> Result<MergeResponse, ServiceError> {
    let request = request.validate()?;
    let keep = repository
        .get_by_id(&request.keep_product_id)
        .await?
        .filter(|product| product.active)
        .ok_or_else(|| {
            ServiceError::not_found(format!(
                "Product {} not found",
                request.keep_product_id
            ))
        })?;

    let mut removes = Vec::with_capacity(request.remove_product_ids.len());
    for id in &request.remove_product_ids {
        match repository.get_by_id(id).await? {
            Some(product) if product.id != *id || product.id == keep.id => warn!(
                "Skipping product {}: lookup returned product {}",
                id, product.id
            ),
            Some(product) if product.active => removes.push(product),
            Some(_) => warn!("Skipping product {}: already inactive", id),
            None => warn!("Skipping product {}: not found", id),
        }
    }

    let update = plan_merge(&keep, &removes);
    repository.apply_merge(&update).await?;
    info!(
        "Merged {} product(s) into {} (stock {})",
        update.deactivate_ids.len(),
        keep.id,
        update.stock
    );

    Ok(MergeResponse {
        success: true,
        message: format!(
            "Productos fusionados exitosamente. Stock combinado: {}",
            update.stock
        ),
        merged_product: MergedProduct {
            id: keep.id,
            name: keep.name,
            stock: update.stock,
            description: update.description.unwrap_or_default(),
        },
        removed_count: update.deactivate_ids.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProductRepository;

    fn stocked(id: &str, stock: Option<u64>, description: Option<&str>) -> ProductRecord {
        let mut product = ProductRecord::new(id, format!("Crema {}", id), 1800.0);
        product.stock = stock;
        product.description = description.map(str::to_string);
        product
    }

    fn request(keep: &str, remove: &[&str]) -> MergeRequest {
        MergeRequest {
            keep_product_id: keep.to_string(),
            remove_product_ids: remove.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn plan_sums_stock_and_joins_descriptions() {
        let update = plan_merge(
            &stocked("1", Some(5), Some("A")),
            &[stocked("2", Some(3), Some("B"))],
        );
        assert_eq!(update.stock, 8);
        assert_eq!(update.description.as_deref(), Some("A\n\nB"));
        assert_eq!(update.deactivate_ids, vec!["2"]);
    }

    #[test]
    fn plan_treats_missing_stock_as_zero() {
        let update = plan_merge(
            &stocked("1", None, None),
            &[
                stocked("2", Some(0), None),
                stocked("3", None, None),
                stocked("4", Some(7), None),
            ],
        );
        assert_eq!(update.stock, 7);
        assert_eq!(update.description, None);
    }

    #[test]
    fn plan_skips_contained_descriptions_and_takes_first_base() {
        let update = plan_merge(
            &stocked("1", Some(1), Some("")),
            &[
                stocked("2", Some(1), Some("Hidratante")),
                stocked("3", Some(1), Some("")),
                stocked("4", Some(1), Some("drata")),
                stocked("5", Some(1), Some("Para piel seca")),
                stocked("6", Some(1), Some("Hidratante")),
            ],
        );
        assert_eq!(
            update.description.as_deref(),
            Some("Hidratante\n\nPara piel seca")
        );
        assert_eq!(update.stock, 6);
    }

    #[test]
    fn validate_rejects_unusable_requests() {
        for bad in [
            request("", &["2"]),
            request("1", &[]),
            request("1", &["2", " "]),
            request("1", &["2", "1"]),
        ] {
            let err = bad.validate().unwrap_err();
            assert!(matches!(err.status, crate::response::Status::BadRequest));
        }
        let ok = request(" 1 ", &["2", "3", "2"]).validate().unwrap();
        assert_eq!(ok.keep_product_id, "1");
        assert_eq!(ok.remove_product_ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn merge_deactivates_removed_and_keeps_kept_active() {
        let repo = InMemoryProductRepository::new(vec![
            stocked("1", Some(5), Some("A")),
            stocked("2", Some(3), Some("B")),
            stocked("3", None, Some("A")),
        ]);
        let response = merge_products(&repo, request("1", &["2", "3"]))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.removed_count, 2);
        assert_eq!(response.merged_product.stock, 8);
        assert_eq!(response.merged_product.description, "A\n\nB");
        assert_eq!(
            response.message,
            "Productos fusionados exitosamente. Stock combinado: 8"
        );

        let kept = repo.get_by_id("1").await.unwrap().unwrap();
        assert!(kept.active);
        assert_eq!(kept.stock, Some(8));
        for id in ["2", "3"] {
            assert!(!repo.get_by_id(id).await.unwrap().unwrap().active);
        }
    }

    #[tokio::test]
    async fn missing_keep_fails_without_writes() {
        let repo = InMemoryProductRepository::new(vec![stocked("2", Some(3), Some("B"))]);
        let err = merge_products(&repo, request("1", &["2"]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.get_by_id("2").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn inactive_keep_counts_as_missing() {
        let mut retired = stocked("1", Some(5), None);
        retired.active = false;
        let repo = InMemoryProductRepository::new(vec![retired, stocked("2", Some(3), None)]);
        let err = merge_products(&repo, request("1", &["2"]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_removes_are_skipped() {
        let mut retired = stocked("3", Some(100), Some("old"));
        retired.active = false;
        let repo = InMemoryProductRepository::new(vec![
            stocked("1", Some(5), None),
            stocked("2", Some(3), None),
            retired,
        ]);
        let response = merge_products(&repo, request("1", &["404", "2", "3"]))
            .await
            .unwrap();
        assert_eq!(response.removed_count, 1);
        assert_eq!(response.merged_product.stock, 8);
        assert_eq!(response.merged_product.description, "");
        assert!(repo.get_by_id("1").await.unwrap().unwrap().active);
    }

    /// Resolves `id#suffix` lookups to `id`, like a store that truncates ids.
    struct TruncatingRepository(InMemoryProductRepository);

    impl ProductRepository for TruncatingRepository {
        async fn get_by_id(&self, id: &str) -> Result<Option<ProductRecord>, ServiceError> {
            let stored = id.split('#').next().unwrap_or(id);
            self.0.get_by_id(stored).await
        }

        async fn list_active(&self) -> Result<Vec<ProductRecord>, ServiceError> {
            self.0.list_active().await
        }

        async fn update_stock_and_description(
            &self,
            id: &str,
            stock: u64,
            description: Option<&str>,
        ) -> Result<(), ServiceError> {
            self.0.update_stock_and_description(id, stock, description).await
        }

        async fn set_active(&self, id: &str, active: bool) -> Result<(), ServiceError> {
            self.0.set_active(id, active).await
        }
    }

    #[tokio::test]
    async fn removes_resolving_to_another_record_are_skipped() {
        let repo = TruncatingRepository(InMemoryProductRepository::new(vec![
            stocked("1", Some(5), Some("A")),
            stocked("2", Some(3), Some("B")),
            stocked("3", Some(2), None),
        ]));
        let response = merge_products(&repo, request("1", &["1#", "3#x", "2"]))
            .await
            .unwrap();
        assert_eq!(response.removed_count, 1);
        assert_eq!(response.merged_product.stock, 8);

        let kept = repo.get_by_id("1").await.unwrap().unwrap();
        assert!(kept.active);
        assert_eq!(kept.stock, Some(8));
        assert!(!repo.get_by_id("2").await.unwrap().unwrap().active);
        assert!(repo.get_by_id("3").await.unwrap().unwrap().active);
    }
}
