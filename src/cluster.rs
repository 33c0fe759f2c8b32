use crate::config::MatchSettings;
use crate::dto::{DuplicateGroup, MergeRequest, PriceRange, ProductRecord, ScanStatistics};
use crate::error::ServiceError;
use crate::similarity::{combined_similarity, normalize_name, prices_compatible};
use log::{debug, trace};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

///
/// Groups near-duplicate products around anchor records.
///
/// Each unprocessed record, in input order, becomes an anchor and is compared
/// with every later unprocessed record. A record joins the anchor's group when
/// the combined name similarity reaches `settings.similarity_threshold` and the
/// prices are within `settings.price_tolerance`. Matching is only checked
/// against the anchor, never between the other members, and a record belongs
/// to at most one group.
///
/// ## Arguments
///
/// * `products` - The catalog snapshot to scan.
/// * `settings` - Thresholds for name similarity and price proximity.
///
pub fn find_duplicate_groups(
    products: &[ProductRecord],
    settings: &MatchSettings,
) -> Vec<DuplicateGroup> {
    let normalized: Vec<String> = products
        .par_iter()
        .map(|product| normalize_name(&product.name))
        .collect();
    let mut processed: FxHashSet<&str> = FxHashSet::default();
    let mut groups = Vec::new();

    for (i, anchor) in products.iter().enumerate() {
        if processed.contains(anchor.id.as_str()) {
            continue;
        }
        let mut members = vec![anchor];
        for (j, candidate) in products.iter().enumerate().skip(i + 1) {
            if processed.contains(candidate.id.as_str()) {
                continue;
            }
            let similarity = combined_similarity(&normalized[i], &normalized[j]);
            if similarity >= settings.similarity_threshold
                && prices_compatible(anchor.price, candidate.price, settings.price_tolerance)
            {
                trace!(
                    "{} joins anchor {} (similarity {:.3})",
                    candidate.id,
                    anchor.id,
                    similarity
                );
                members.push(candidate);
                processed.insert(candidate.id.as_str());
            }
        }
        if members.len() > 1 {
            processed.insert(anchor.id.as_str());
            debug!(
                "Duplicate group anchored at {} with {} members",
                anchor.id,
                members.len()
            );
            groups.push(DuplicateGroup {
                price_range: price_range(&members),
                similarity: settings.similarity_threshold * 100.0,
                products: members.into_iter().cloned().collect(),
            });
        }
    }

    groups.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    groups
}

/// Ids must be unique for group membership to be unambiguous.
pub fn ensure_unique_ids(products: &[ProductRecord]) -> Result<(), ServiceError> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    match products.iter().find(|product| !seen.insert(product.id.as_str())) {
        Some(duplicate) => Err(ServiceError::bad_request(format!(
            "Product id {} appears more than once",
            duplicate.id
        ))),
        None => Ok(()),
    }
}

fn price_range(members: &[&ProductRecord]) -> PriceRange {
    members.iter().fold(
        PriceRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        },
        |range, product| PriceRange {
            min: range.min.min(product.price),
            max: range.max.max(product.price),
        },
    )
}

impl ScanStatistics {
    pub fn from_groups(total_products: usize, groups: &[DuplicateGroup]) -> Self {
        let total_duplicates: usize = groups
            .iter()
            .map(|group| group.products.len().saturating_sub(1))
            .sum();
        Self {
            total_products,
            duplicate_groups: groups.len(),
            total_duplicates,
            unique_products: total_products.saturating_sub(total_duplicates),
            duplicate_rate: percentage(total_duplicates, total_products),
        }
    }
}

/// Rounded share of `part` in `total`, 0 for an empty total.
pub fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        (part as f64 / total as f64 * 100.0).round() as u32
    }
}

impl DuplicateGroup {
    ///
    /// The record kept when the admin merges without choosing: the oldest by
    /// `created_at`. Undated records rank after dated ones and ties keep
    /// discovery order, so an undated group keeps its anchor.
    ///
    pub fn default_keep(&self) -> Option<&ProductRecord> {
        self.products
            .iter()
            .min_by(|a, b| match (a.created_at, b.created_at) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }

    /// Merge request keeping [`DuplicateGroup::default_keep`] and removing the rest.
    pub fn merge_request(&self) -> Option<MergeRequest> {
        let keep = self.default_keep()?;
        Some(MergeRequest {
            keep_product_id: keep.id.clone(),
            remove_product_ids: self
                .products
                .iter()
                .filter(|product| product.id != keep.id)
                .map(|product| product.id.clone())
                .collect(),
        })
    }
}
