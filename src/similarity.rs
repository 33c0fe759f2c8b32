use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashSet;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
    // A unit glued to a quantity ("50ml") keeps the quantity.
    static ref UNIT_TOKEN: Regex =
        Regex::new(r"\b(\d*)(?:ml|gr|gramos|mililitros|unidades|piezas)\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

///
/// Normalizes a product name for comparison.
///
/// Lowercases, folds Latin diacritics, drops punctuation, removes unit words
/// and collapses whitespace. The result is stable under repeated application.
///
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.to_lowercase().chars().map(fold_diacritic).collect();
    let stripped = NON_WORD.replace_all(&folded, "");
    let without_units = UNIT_TOKEN.replace_all(&stripped, "${1}");
    WHITESPACE
        .replace_all(&without_units, " ")
        .trim()
        .to_string()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

///
/// Edit-distance ratio `(max_len - distance) / max_len` over characters.
///
/// Two empty strings are identical.
///
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = strsim::levenshtein(a, b);
    (max_len - distance) as f64 / max_len as f64
}

///
/// Token-set overlap `|a ∩ b| / |a ∪ b|`, tokens split on whitespace.
///
/// An empty union scores 0.
///
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    intersection as f64 / union as f64
}

///
/// Mean of the Levenshtein ratio and the Jaccard score of two normalized
/// names, in `[0, 1]`.
///
pub fn combined_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    (levenshtein_similarity(a, b) + jaccard_similarity(a, b)) / 2.0
}

/// Symmetric price check used by the batch scan.
pub fn prices_compatible(a: f64, b: f64, tolerance: f64) -> bool {
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= a.max(b) * tolerance
}

/// Price check of the pre-insert mode, relative to the candidate's price.
pub fn within_reference_tolerance(reference: f64, other: f64, tolerance: f64) -> bool {
    if !reference.is_finite() || !other.is_finite() {
        return false;
    }
    (reference - other).abs() <= reference * tolerance
}
