use std::sync::LazyLock;

use regex::Regex;

static QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(≤|≥|<|>|не более|не менее|до)").expect("hardcoded qualifier regex is valid")
});

/// Strips inequality qualifiers from a raw characteristic value.
///
/// A hyphenated range keeps only its first bound. Qualifier removal is
/// repeated until none is left, so cleaning an already clean value is a no-op.
#[must_use]
pub fn clean_value(raw: &str) -> String {
    if let Some((first, _)) = raw.split_once('-') {
        return first.trim().to_string();
    }

    let mut current = raw.to_string();
    while QUALIFIER_RE.is_match(&current) {
        current = QUALIFIER_RE.replace_all(&current, "").into_owned();
    }
    current.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::clean_value;

    #[test]
    fn keeps_first_bound_of_range() {
        assert_eq!(clean_value("10 - 12"), "10");
        assert_eq!(clean_value(" 3,5-4,0 не более"), "3,5");
    }

    #[test]
    fn strips_inequality_tokens() {
        assert_eq!(clean_value("≤ 5,0"), "5,0");
        assert_eq!(clean_value(">12"), "12");
        assert_eq!(clean_value("не более 0,5"), "0,5");
        assert_eq!(clean_value("не менее 98"), "98");
        assert_eq!(clean_value("до 40"), "40");
    }

    #[test]
    fn plain_value_is_only_trimmed() {
        assert_eq!(clean_value("5"), "5");
        assert_eq!(clean_value("  белый  "), "белый");
    }

    #[test]
    fn cleaning_is_idempotent_without_hyphen() {
        for raw in ["не более 7", "≥≥ 1", "не бне болееолее 2", "ддоо", "текст"] {
            let once = clean_value(raw);
            assert_eq!(clean_value(&once), once, "raw value: {raw:?}");
        }
    }
}
