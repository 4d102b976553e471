use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

// ICU/next-intl arguments (`{count}`), mustache (`{{name}}`), printf (`%s`, `%1$d`) and rich-text tags (`<b>`, `</b>`).
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\{\{\s*[A-Za-z0-9_.]+\s*\}\}|\{[A-Za-z0-9_]+\}|%\d*\$?[sd]|</?[A-Za-z][A-Za-z0-9]*>)")
        .expect("valid placeholder regex")
});

fn collect_placeholders(input: &str) -> BTreeMap<&str, usize> {
    PLACEHOLDER_REGEX
        .find_iter(input)
        .fold(BTreeMap::new(), |mut acc, token| {
            *acc.entry(token.as_str()).or_insert(0_usize) += 1;
            acc
        })
}

/// Lists placeholders that occur fewer times in `translated` than in `original`.
pub fn missing_placeholders(original: &str, translated: &str) -> Vec<String> {
    let expected = collect_placeholders(original);
    let actual = collect_placeholders(translated);

    expected
        .iter()
        .filter_map(|(token, expected_count)| {
            let actual_count = actual.get(token).copied().unwrap_or_default();
            (actual_count < *expected_count)
                .then(|| format!("{token} (missing {})", expected_count - actual_count))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reordered_placeholders() {
        let missing = missing_placeholders(
            "Hello {name}, you have {count} campaigns",
            "{count} campagnes pour {name}",
        );
        assert!(missing.is_empty());
    }

    #[test]
    fn reports_dropped_placeholders() {
        let missing = missing_placeholders("Spend: {amount} <b>today</b>", "Dépenses aujourd'hui");
        assert_eq!(
            missing,
            vec![
                "</b> (missing 1)".to_string(),
                "<b> (missing 1)".to_string(),
                "{amount} (missing 1)".to_string(),
            ]
        );
    }

    #[test]
    fn counts_repeated_tokens() {
        let missing = missing_placeholders("%s and %s", "%s und");
        assert_eq!(missing, vec!["%s (missing 1)".to_string()]);
    }
}
