/// Translation key extraction from application sources
///
/// Finds literal keys passed to translation calls (`t("nav.home")`,
/// `t.rich('legal.terms', ...)`) in JS/TS sources and compares them with the
/// source dictionary. A file that binds exactly one namespace through
/// `useTranslations("ns")` or `getTranslations("ns")` has its keys prefixed
/// with that namespace.
use crate::dictionary::FlatMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

static CALL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bt(?:\.rich|\.markup|\.raw)?\(\s*["'`]([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)["'`]\s*[,)]"#)
        .expect("valid translation call regex")
});

static NAMESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:useTranslations|getTranslations)\(\s*["'`]([A-Za-z0-9_\-.]+)["'`]\s*\)"#)
        .expect("valid namespace regex")
});

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    /// Directory names that are never descended into.
    pub skip_dirs: Vec<String>,
    pub max_file_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: ["ts", "tsx", "js", "jsx", "mjs"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            skip_dirs: ["node_modules", ".next", ".git", "dist", "build", "coverage"]
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct KeyUsage {
    pub key: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractReport {
    pub files_scanned: usize,
    /// Every referenced key with the places it is used.
    pub used: BTreeMap<String, Vec<KeyUsage>>,
    /// Keys referenced in code that the source dictionary lacks.
    pub missing_in_source: Vec<String>,
    /// Source keys no literal call refers to. Dynamic keys make this a hint only.
    pub unused_in_source: Vec<String>,
}

impl ExtractReport {
    pub fn is_ok(&self) -> bool {
        self.missing_in_source.is_empty()
    }
}

#[derive(Debug)]
pub struct KeyScanner {
    options: ScanOptions,
}

impl KeyScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan every root for translation key usages.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<(usize, Vec<KeyUsage>), std::io::Error> {
        let mut usages = Vec::new();
        let mut files = 0;
        for root in roots {
            if root.is_file() {
                files += 1;
                self.scan_file(root.parent().unwrap_or(root), root, &mut usages)?;
            } else {
                self.scan_recursive(root, root, &mut files, &mut usages)?;
            }
        }
        usages.sort();
        Ok((files, usages))
    }

    fn scan_recursive(
        &self,
        root: &Path,
        current: &Path,
        files: &mut usize,
        usages: &mut Vec<KeyUsage>,
    ) -> Result<(), std::io::Error> {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                let skipped = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| self.options.skip_dirs.iter().any(|dir| dir == name));
                if !skipped {
                    self.scan_recursive(root, &path, files, usages)?;
                }
            } else if path.is_file() && self.wants(&path)? {
                *files += 1;
                self.scan_file(root, &path, usages)?;
            }
        }
        Ok(())
    }

    fn wants(&self, path: &Path) -> Result<bool, std::io::Error> {
        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.options.extensions.iter().any(|wanted| wanted == ext));
        if !matches_extension {
            return Ok(false);
        }
        Ok(fs::metadata(path)?.len() <= self.options.max_file_size)
    }

    fn scan_file(
        &self,
        root: &Path,
        path: &Path,
        usages: &mut Vec<KeyUsage>,
    ) -> Result<(), std::io::Error> {
        let content = fs::read_to_string(path)?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        usages.extend(extract_keys(&content, &relative));
        Ok(())
    }
}

/// Literal translation keys used in one source text.
pub fn extract_keys(content: &str, file: &str) -> Vec<KeyUsage> {
    let namespaces: BTreeSet<&str> = NAMESPACE_REGEX
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let namespace = match namespaces.len() {
        1 => namespaces.into_iter().next(),
        _ => None,
    };

    let mut usages = Vec::new();
    for (line_index, line) in content.lines().enumerate() {
        for caps in CALL_REGEX.captures_iter(line) {
            let Some(raw) = caps.get(1) else { continue };
            let key = match namespace {
                Some(ns) => format!("{ns}.{}", raw.as_str()),
                None => raw.as_str().to_string(),
            };
            usages.push(KeyUsage {
                key,
                file: file.to_string(),
                line: line_index + 1,
            });
        }
    }
    usages
}

/// Groups usages by key and compares them with the source dictionary.
pub fn build_report(files_scanned: usize, usages: Vec<KeyUsage>, source: &FlatMap) -> ExtractReport {
    let mut used: BTreeMap<String, Vec<KeyUsage>> = BTreeMap::new();
    for usage in usages {
        used.entry(usage.key.clone()).or_default().push(usage);
    }

    let missing_in_source = used
        .keys()
        .filter(|key| !source.contains_key(key) && !names_subtree(key, source.keys()))
        .cloned()
        .collect();
    let unused_in_source = source
        .keys()
        .filter(|key| !used.contains_key(*key) && !is_below_any(key, used.keys()))
        .map(str::to_string)
        .collect();

    ExtractReport {
        files_scanned,
        used,
        missing_in_source,
        unused_in_source,
    }
}

fn is_below(key: &str, parent: &str) -> bool {
    key.strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('.'))
}

// `t("nav")` on a subtree counts as using every key below it.
fn is_below_any<'a>(key: &str, mut parents: impl Iterator<Item = &'a String>) -> bool {
    parents.any(|parent| is_below(key, parent))
}

fn names_subtree<'a>(key: &str, mut keys: impl Iterator<Item = &'a str>) -> bool {
    keys.any(|candidate| is_below(candidate, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extracts_literal_keys_with_lines() {
        let source = "const a = t('nav.home');\nreturn <p>{t(\"common.error\", { code })}</p>;\nt.rich(`legal.terms`, {})";
        let keys: Vec<_> = extract_keys(source, "page.tsx")
            .into_iter()
            .map(|usage| (usage.key, usage.line))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("nav.home".to_string(), 1),
                ("common.error".to_string(), 2),
                ("legal.terms".to_string(), 3),
            ]
        );
    }

    #[test]
    fn ignores_dynamic_and_unrelated_calls() {
        let source = "t(`reports.${kind}`); format('x.y'); set(\"a.b\"); t(key);";
        assert!(extract_keys(source, "a.ts").is_empty());
    }

    #[test]
    fn prefixes_single_namespace() {
        let source = "const t = useTranslations('dashboard');\nt('title');";
        let usages = extract_keys(source, "d.tsx");
        assert_eq!(usages[0].key, "dashboard.title");
    }

    #[test]
    fn report_lists_missing_and_unused() {
        let source: FlatMap = [("nav.home", "Home"), ("nav.help", "Help"), ("legacy", "Old")]
            .into_iter()
            .collect();
        let usages = extract_keys("t('nav.home'); t('nav.pricing');", "a.ts");

        let report = build_report(1, usages, &source);
        assert!(!report.is_ok());
        assert_eq!(report.missing_in_source, vec!["nav.pricing".to_string()]);
        assert_eq!(
            report.unused_in_source,
            vec!["nav.help".to_string(), "legacy".to_string()]
        );
    }

    #[test]
    fn subtree_usage_covers_children() {
        let source: FlatMap = [("nav.home", "Home")].into_iter().collect();
        let report = build_report(1, extract_keys("t('nav')", "a.ts"), &source);
        assert!(report.unused_in_source.is_empty());
        assert!(report.is_ok());
    }

    #[test]
    fn scanner_skips_dependency_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("app/page.tsx"), "t('nav.home')").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "t('vendor.key')").unwrap();
        fs::write(dir.path().join("app/styles.css"), "t('css.key')").unwrap();

        let scanner = KeyScanner::new(ScanOptions::default());
        let (files, usages) = scanner.scan(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(files, 1);
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].file, "app/page.tsx");
    }
}
