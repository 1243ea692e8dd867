//! Language and code-type classification of changed files
//!
//! Languages come from `cloc --by-file --csv`, run once per repository. When
//! cloc is missing or fails every file is `Unknown`. Test code is recognised
//! by path conventions; documentation by the cloc language.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::exec::{ProcessError, ToolCommand};
use crate::subsystem::normalize_path;

pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// cloc languages that count as documentation.
const DOC_LANGUAGES: &[&str] = &["markdown", "text", "restructuredtext", "asciidoc"];

/// Production or test code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Prod,
    Test,
}

impl CodeKind {
    pub fn of(path: &str) -> Self {
        if is_test_file(path) {
            CodeKind::Test
        } else {
            CodeKind::Prod
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Prod => "prod",
            CodeKind::Test => "test",
        }
    }
}

/// Path heuristics for test code (case-insensitive):
/// a `test`, `tests`, `testing` or `spec` directory; Go `*_test.go`;
/// Python `test_*.py` / `*_test.py`; JS/TS `test_*`, `*.test.*`, `*.spec.*`.
pub fn is_test_file(path: &str) -> bool {
    let p = normalize_path(path).to_lowercase();
    let mut segments: Vec<&str> = p.split('/').collect();
    let filename = segments.pop().unwrap_or_default();

    if segments
        .iter()
        .any(|s| matches!(*s, "test" | "tests" | "testing" | "spec"))
    {
        return true;
    }

    if filename.ends_with("_test.go") {
        return true;
    }
    if filename.ends_with(".py") && (filename.starts_with("test_") || filename.ends_with("_test.py")) {
        return true;
    }

    const JS_EXTS: &[&str] = &["js", "jsx", "ts", "tsx"];
    if let Some((stem, ext)) = filename.rsplit_once('.') {
        if JS_EXTS.contains(&ext) {
            return filename.starts_with("test_") || stem.ends_with(".test") || stem.ends_with(".spec");
        }
    }
    false
}

pub fn is_doc_language(language: &str) -> bool {
    let lowered = language.trim().to_lowercase();
    DOC_LANGUAGES.contains(&lowered.as_str())
}

/// File path -> cloc language for one repository.
#[derive(Debug, Clone, Default)]
pub struct LanguageMap {
    by_file: HashMap<String, String>,
}

impl LanguageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, language: &str) {
        self.by_file.insert(normalize_path(path), language.to_string());
    }

    /// Language of `path`, `Unknown` when cloc did not report it.
    pub fn language_of(&self, path: &str) -> &str {
        self.by_file
            .get(&normalize_path(path))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LANGUAGE)
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    /// Run cloc in `repo` and parse its per-file CSV.
    pub fn from_cloc(repo: &Path, timeout: Duration, backoff: Duration) -> Result<Self, ProcessError> {
        let output = ToolCommand::new("cloc")
            .args(["--by-file", "--csv", "--quiet", "."])
            .current_dir(repo)
            .timeout(timeout)
            .backoff(backoff)
            .run()?;
        let map = parse_cloc_csv(&output.stdout_lossy());
        debug!("cloc classified {} files in {}", map.len(), repo.display());
        Ok(map)
    }
}

/// Parse `cloc --by-file --csv` output.
///
/// The header row is located by its `language` and `filename` columns;
/// the `SUM` row and anything before the header are ignored.
pub fn parse_cloc_csv(text: &str) -> LanguageMap {
    let mut map = LanguageMap::new();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut columns: Option<(usize, usize)> = None;
    for record in reader.records() {
        let Ok(record) = record else {
            continue;
        };
        let Some((lang_idx, file_idx)) = columns else {
            let lowered: Vec<String> = record.iter().map(|c| c.trim().to_lowercase()).collect();
            let lang = lowered.iter().position(|c| c == "language");
            let file = lowered.iter().position(|c| c == "filename");
            if let (Some(l), Some(f)) = (lang, file) {
                columns = Some((l, f));
            }
            continue;
        };
        let (Some(lang), Some(file)) = (record.get(lang_idx), record.get(file_idx)) else {
            continue;
        };
        let (lang, file) = (lang.trim(), file.trim());
        if lang.is_empty() || file.is_empty() || lang.eq_ignore_ascii_case("sum") {
            continue;
        }
        map.insert(file, lang);
    }

    if columns.is_none() && !text.trim().is_empty() {
        warn!("cloc output has no language/filename header");
    }
    map
}

/// Language maps of every processed repository.
#[derive(Debug, Clone, Default)]
pub struct LanguageIndex {
    repos: HashMap<String, LanguageMap>,
}

impl LanguageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, repo: &str, map: LanguageMap) {
        self.repos.insert(repo.to_string(), map);
    }

    pub fn language(&self, repo: &str, path: &str) -> &str {
        self.repos
            .get(repo)
            .map(|m| m.language_of(path))
            .unwrap_or(UNKNOWN_LANGUAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("src/test/java/FooTest.java"));
        assert!(is_test_file("pkg/tests/helpers.rs"));
        assert!(is_test_file("tests/integration.rs"));
        assert!(is_test_file("api/handler_test.go"));
        assert!(is_test_file("app/test_models.py"));
        assert!(is_test_file("app/models_test.py"));
        assert!(is_test_file("web/Button.test.tsx"));
        assert!(is_test_file("web/api.spec.js"));
        assert!(is_test_file("WEB/TEST_utils.JS"));

        assert!(!is_test_file("src/main.rs"));
        assert!(!is_test_file("app/contest.py"));
        assert!(!is_test_file("web/latest.ts"));
        assert!(!is_test_file("docs/testing.md"));
    }

    #[test]
    fn test_doc_languages() {
        assert!(is_doc_language("Markdown"));
        assert!(is_doc_language(" reStructuredText "));
        assert!(!is_doc_language("Python"));
    }

    #[test]
    fn test_parse_cloc_csv() {
        let text = "github.com/AlDanial/cloc v 1.98  T=0.05 s\n\
language,filename,blank,comment,code\n\
Python,./app/models.py,3,1,40\n\
Markdown,README.md,2,0,10\n\
\"C++\",\"./src/a,b.cpp\",0,0,5\n\
SUM,,5,1,55\n";
        let map = parse_cloc_csv(text);
        assert_eq!(map.len(), 3);
        assert_eq!(map.language_of("app/models.py"), "Python");
        assert_eq!(map.language_of("./README.md"), "Markdown");
        assert_eq!(map.language_of("src/a,b.cpp"), "C++");
        assert_eq!(map.language_of("missing.rs"), UNKNOWN_LANGUAGE);
    }

    #[test]
    fn test_parse_cloc_without_header() {
        assert!(parse_cloc_csv("nothing useful here\n").is_empty());
    }

    #[test]
    fn test_index_falls_back_to_unknown() {
        let mut index = LanguageIndex::new();
        let mut map = LanguageMap::new();
        map.insert("a.rs", "Rust");
        index.insert("r", map);
        assert_eq!(index.language("r", "a.rs"), "Rust");
        assert_eq!(index.language("other", "a.rs"), UNKNOWN_LANGUAGE);
    }
}
