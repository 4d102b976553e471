use crate::dictionary::FlatMap;
use serde::Serialize;

/// Prefix of values that mark a translation as known to be absent.
pub const MISSING_PLACEHOLDER_PREFIX: &str = "(MISSING:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    /// The target has no value for the key.
    Missing,
    /// The target value is a `(MISSING: ...)` placeholder.
    Placeholder,
    /// The target value is byte-identical to the source, i.e. never translated.
    SameAsSource,
}

/// A source string selected for translation. `index` is its position in the
/// candidate list and is what translated results are merged back by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub index: usize,
    pub key: String,
    pub source: String,
    pub reason: CandidateReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleDiff {
    /// Keys to send to the provider, in source order.
    pub to_translate: Vec<TaskItem>,
    /// Preserved keys that are absent or placeholders; filled with the source value verbatim.
    pub to_copy: Vec<(String, String)>,
}

impl LocaleDiff {
    pub fn is_empty(&self) -> bool {
        self.to_translate.is_empty() && self.to_copy.is_empty()
    }

    pub fn count(&self, reason: CandidateReason) -> usize {
        self.to_translate
            .iter()
            .filter(|item| item.reason == reason)
            .count()
    }
}

pub fn is_missing_placeholder(value: &str) -> bool {
    value.starts_with(MISSING_PLACEHOLDER_PREFIX)
}

/// Selects the source keys a target locale still needs.
///
/// Keys listed in `preserve_keys` are allowed to equal the source value; when
/// they are absent or placeholders they are copied instead of translated.
pub fn diff_locale(source: &FlatMap, target: &FlatMap, preserve_keys: &[String]) -> LocaleDiff {
    diff_locale_with(source, target, preserve_keys, |_| false)
}

/// Like [`diff_locale`], but source values for which `verbatim` returns true
/// (acronyms a provider never translates) are treated like preserved keys.
pub fn diff_locale_with(
    source: &FlatMap,
    target: &FlatMap,
    preserve_keys: &[String],
    verbatim: impl Fn(&str) -> bool,
) -> LocaleDiff {
    let mut diff = LocaleDiff::default();

    for (key, source_value) in source.iter() {
        let reason = match target.get(key) {
            None => CandidateReason::Missing,
            Some(value) if is_missing_placeholder(value) => CandidateReason::Placeholder,
            Some(value) if value == source_value => CandidateReason::SameAsSource,
            Some(_) => continue,
        };

        if preserve_keys.iter().any(|preserved| preserved == key) || verbatim(source_value) {
            if reason != CandidateReason::SameAsSource {
                diff.to_copy.push((key.to_string(), source_value.to_string()));
            }
            continue;
        }

        diff.to_translate.push(TaskItem {
            index: diff.to_translate.len(),
            key: key.to_string(),
            source: source_value.to_string(),
            reason,
        });
    }

    diff
}

/// Target keys that no longer exist in the source, in target order.
pub fn obsolete_keys(source: &FlatMap, target: &FlatMap) -> Vec<String> {
    target
        .keys()
        .filter(|key| !source.contains_key(key))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &str)]) -> FlatMap {
        pairs.iter().copied().collect()
    }

    fn keys(diff: &LocaleDiff) -> Vec<&str> {
        diff.to_translate.iter().map(|item| item.key.as_str()).collect()
    }

    #[test]
    fn selects_missing_keys() {
        let source = flat(&[("common.error", "Oops")]);
        let diff = diff_locale(&source, &FlatMap::new(), &[]);
        assert_eq!(
            diff.to_translate,
            vec![TaskItem {
                index: 0,
                key: "common.error".into(),
                source: "Oops".into(),
                reason: CandidateReason::Missing,
            }]
        );
    }

    #[test]
    fn selects_identical_to_source_and_skips_translated() {
        let source = flat(&[("a", "Hello"), ("b", "World")]);
        let target = flat(&[("a", "Hallo"), ("b", "World"), ("c", "Obsolete")]);

        let diff = diff_locale(&source, &target, &[]);
        assert_eq!(keys(&diff), vec!["b"]);
        assert_eq!(diff.to_translate[0].reason, CandidateReason::SameAsSource);
        assert_eq!(obsolete_keys(&source, &target), vec!["c".to_string()]);
    }

    #[test]
    fn placeholder_is_always_retranslated() {
        let source = flat(&[("foo", "Foo")]);
        let target = flat(&[("foo", "(MISSING: foo)")]);

        let diff = diff_locale(&source, &target, &[]);
        assert_eq!(keys(&diff), vec!["foo"]);
        assert_eq!(diff.count(CandidateReason::Placeholder), 1);
    }

    #[test]
    fn preserves_source_order_and_indexes() {
        let source = flat(&[("z", "Z text"), ("a", "A text"), ("m", "M text")]);
        let target = flat(&[("a", "Texte A")]);

        let diff = diff_locale(&source, &target, &[]);
        assert_eq!(keys(&diff), vec!["z", "m"]);
        let indexes: Vec<_> = diff.to_translate.iter().map(|item| item.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn preserved_keys_are_copied_not_translated() {
        let source = flat(&[("brand", "AdPulse"), ("docs", "https://docs.example"), ("cta", "Go")]);
        let target = flat(&[("brand", "AdPulse"), ("docs", "(MISSING: docs)")]);
        let preserve = vec!["brand".to_string(), "docs".to_string()];

        let diff = diff_locale(&source, &target, &preserve);
        assert_eq!(keys(&diff), vec!["cta"]);
        assert_eq!(
            diff.to_copy,
            vec![("docs".to_string(), "https://docs.example".to_string())]
        );
    }

    #[test]
    fn verbatim_values_are_never_sent() {
        let source = flat(&[("kpi.ctr", "CTR"), ("kpi.roas", "ROAS"), ("title", "Reports")]);
        let target = flat(&[("kpi.ctr", "CTR"), ("title", "Reports")]);

        let diff = diff_locale_with(&source, &target, &[], crate::provider::is_acronym);
        assert_eq!(keys(&diff), vec!["title"]);
        assert_eq!(
            diff.to_copy,
            vec![("kpi.roas".to_string(), "ROAS".to_string())]
        );

        let settled = flat(&[("kpi.ctr", "CTR"), ("kpi.roas", "ROAS"), ("title", "Berichte")]);
        assert!(diff_locale_with(&source, &settled, &[], crate::provider::is_acronym).is_empty());
    }

    #[test]
    fn fully_translated_target_has_no_work() {
        let source = flat(&[("a", "Hello")]);
        let target = flat(&[("a", "Bonjour")]);
        assert!(diff_locale(&source, &target, &[]).is_empty());
    }
}
