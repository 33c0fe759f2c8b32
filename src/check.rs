use crate::cluster::percentage;
use crate::config::MatchSettings;
use crate::dto::{
    CandidateProduct, CheckResponse, CheckResult, CheckStatistics, DuplicateInfo, ProductRecord,
};
use crate::similarity::{levenshtein_similarity, normalize_name, within_reference_tolerance};
use log::debug;

const MIN_CONFIDENCE: f64 = 0.1;

///
/// Checks products about to be inserted against the active catalog.
///
/// A candidate is a duplicate of the first active product whose normalized
/// name reaches `settings.single_check_threshold` on the Levenshtein ratio and
/// whose price is within `settings.single_check_price_tolerance` of the
/// candidate's price.
///
pub fn check_candidates(
    candidates: &[CandidateProduct],
    existing: &[ProductRecord],
    settings: &MatchSettings,
) -> CheckResponse {
    let catalog: Vec<(&ProductRecord, String)> = existing
        .iter()
        .filter(|product| product.active)
        .map(|product| (product, normalize_name(&product.name)))
        .collect();

    let results: Vec<CheckResult> = candidates
        .iter()
        .map(|candidate| check_candidate(candidate, &catalog, settings))
        .collect();

    let duplicates = results.iter().filter(|result| result.duplicate).count();
    let statistics = CheckStatistics {
        total: results.len(),
        unique: results.len() - duplicates,
        duplicates,
        duplicate_rate: percentage(duplicates, results.len()),
    };
    CheckResponse {
        success: true,
        results,
        statistics,
    }
}

fn check_candidate(
    candidate: &CandidateProduct,
    catalog: &[(&ProductRecord, String)],
    settings: &MatchSettings,
) -> CheckResult {
    let normalized = normalize_name(&candidate.name);
    let found = catalog.iter().find_map(|(existing, existing_name)| {
        let similarity = levenshtein_similarity(&normalized, existing_name);
        let matched = similarity >= settings.single_check_threshold
            && within_reference_tolerance(
                candidate.price,
                existing.price,
                settings.single_check_price_tolerance,
            );
        matched.then_some((*existing, similarity))
    });

    match found {
        Some((existing, similarity)) => {
            debug!(
                "Candidate '{}' duplicates product {} ({:.2})",
                candidate.name, existing.id, similarity
            );
            CheckResult {
                product: candidate.clone(),
                duplicate: true,
                // Lower for closer names; kept for the back-office's existing reading.
                confidence: MIN_CONFIDENCE.max(1.0 - similarity),
                duplicate_info: Some(DuplicateInfo {
                    existing_product_id: existing.id.clone(),
                    existing_product_name: existing.name.clone(),
                    existing_product_price: existing.price,
                    name_similarity: (similarity * 100.0).round() as u32,
                    price_difference: (candidate.price - existing.price).abs().round(),
                }),
            }
        }
        None => CheckResult {
            product: candidate.clone(),
            duplicate: false,
            confidence: 1.0,
            duplicate_info: None,
        },
    }
}
