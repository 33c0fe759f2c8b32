use crate::error::ServiceError;
use std::env;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.15;
pub const DEFAULT_SINGLE_CHECK_THRESHOLD: f64 = 0.8;
pub const DEFAULT_SINGLE_CHECK_PRICE_TOLERANCE: f64 = 0.1;

///
/// Thresholds used by the batch scan and the pre-insert check.
///
/// The batch scan compares names with the combined metric and a symmetric
/// price tolerance. The pre-insert check only uses the Levenshtein ratio and
/// measures the price difference against the candidate's own price.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchSettings {
    pub similarity_threshold: f64,
    pub price_tolerance: f64,
    pub single_check_threshold: f64,
    pub single_check_price_tolerance: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            single_check_threshold: DEFAULT_SINGLE_CHECK_THRESHOLD,
            single_check_price_tolerance: DEFAULT_SINGLE_CHECK_PRICE_TOLERANCE,
        }
    }
}

impl MatchSettings {
    ///
    /// Builds settings from the defaults, overridden by any of the
    /// `DEDUP_*` environment variables that are set.
    ///
    pub fn from_env() -> Result<Self, ServiceError> {
        let defaults = Self::default();
        Ok(Self {
            similarity_threshold: env_fraction(
                "DEDUP_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            price_tolerance: env_fraction("DEDUP_PRICE_TOLERANCE", defaults.price_tolerance)?,
            single_check_threshold: env_fraction(
                "DEDUP_SINGLE_CHECK_THRESHOLD",
                defaults.single_check_threshold,
            )?,
            single_check_price_tolerance: env_fraction(
                "DEDUP_SINGLE_CHECK_PRICE_TOLERANCE",
                defaults.single_check_price_tolerance,
            )?,
        })
    }

    /// Applies the optional per-request overrides of a batch scan.
    pub fn with_scan_overrides(
        self,
        similarity_threshold: Option<f64>,
        price_tolerance: Option<f64>,
    ) -> Result<Self, ServiceError> {
        let mut settings = self;
        if let Some(threshold) = similarity_threshold {
            settings.similarity_threshold = check_fraction("similarityThreshold", threshold)
                .map_err(ServiceError::bad_request)?;
        }
        if let Some(tolerance) = price_tolerance {
            settings.price_tolerance =
                check_fraction("priceTolerance", tolerance).map_err(ServiceError::bad_request)?;
        }
        Ok(settings)
    }
}

fn check_fraction(name: &str, value: f64) -> Result<f64, String> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} must be between 0 and 1, got {}", name, value))
    }
}

fn env_fraction(name: &str, default: f64) -> Result<f64, ServiceError> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().parse::<f64>().map_err(|_| {
                ServiceError::internal_server_error(format!(
                    "Unable to parse environment variable '{}' = '{}'",
                    name, raw
                ))
            })?;
            check_fraction(name, value).map_err(ServiceError::internal_server_error)
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_admin_presets() {
        let settings = MatchSettings::default();
        assert_eq!(settings.similarity_threshold, 0.8);
        assert_eq!(settings.price_tolerance, 0.15);
        assert_eq!(settings.single_check_threshold, 0.8);
        assert_eq!(settings.single_check_price_tolerance, 0.1);
    }

    #[test]
    fn scan_overrides_replace_only_given_values() {
        let settings = MatchSettings::default()
            .with_scan_overrides(Some(0.65), None)
            .unwrap();
        assert_eq!(settings.similarity_threshold, 0.65);
        assert_eq!(settings.price_tolerance, DEFAULT_PRICE_TOLERANCE);
    }

    #[test]
    fn out_of_range_overrides_are_client_errors() {
        for bad in [1.5, -0.1, f64::NAN] {
            let err = MatchSettings::default()
                .with_scan_overrides(Some(bad), None)
                .unwrap_err();
            assert!(matches!(err.status, crate::response::Status::BadRequest));
        }
        assert!(MatchSettings::default()
            .with_scan_overrides(None, Some(2.0))
            .is_err());
    }

    #[test]
    fn env_fraction_falls_back_and_parses() {
        assert_eq!(
            env_fraction("DEDUP_TEST_UNSET_VARIABLE", 0.42).unwrap(),
            0.42
        );
        env::set_var("DEDUP_TEST_PRICE_TOLERANCE_VALID", " 0.2 ");
        assert_eq!(
            env_fraction("DEDUP_TEST_PRICE_TOLERANCE_VALID", 0.15).unwrap(),
            0.2
        );
        env::set_var("DEDUP_TEST_PRICE_TOLERANCE_BROKEN", "fifteen");
        assert!(env_fraction("DEDUP_TEST_PRICE_TOLERANCE_BROKEN", 0.15).is_err());
    }
}
