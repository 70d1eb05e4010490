//! Internal helpers shared by the store adapters and the operations.

use unicode_normalization::UnicodeNormalization;

/// Group key for free-text category labels and category names.
///
/// NFC-composed, trimmed, lowercased. Blank input yields an empty key; callers
/// decide what an empty key means.
pub fn normalize_label(input: &str) -> String {
    input.nfc().collect::<String>().trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_label_folds_case_and_outer_whitespace() {
        assert_eq!(normalize_label("Groceries"), "groceries");
        assert_eq!(normalize_label("  groceries "), "groceries");
        assert_eq!(normalize_label("GROCERIES\t"), "groceries");
        assert_eq!(normalize_label("   "), "");
    }

    #[test]
    fn normalize_label_composes_accents() {
        let decomposed = "Caffe\u{301}";
        assert_eq!(normalize_label(decomposed), normalize_label("Caffé"));
    }
}
