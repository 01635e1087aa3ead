//! Rewrites one locator occurrence in a test source file.
//!
//! The original text is searched on the target line and then on the lines
//! around it, nearest first and above before below. Quote delimiters are
//! matched loosely: `'#a'`, `"#a"` and `` `#a` `` are the same locator, and
//! so are `[name="q"]` and `[name='q']`. Only the matched bytes change.
//!
//! Backups are full copies named `<file>.<YYYYMMDDTHHMMSSmmm>.bak` and are
//! always written before the source file is touched.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::result::{HealError, HealResult};
use crate::store::SuggestionRecord;

/// Lines searched on each side of the target line
pub const SEARCH_WINDOW: usize = 3;

const QUOTES: [char; 3] = ['\'', '"', '`'];
const BACKUP_EXTENSION: &str = "bak";
const BACKUP_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// A single rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeModificationRequest {
    /// Source file
    pub file_path: PathBuf,
    /// 1-based line where the locator was used
    pub line_number: usize,
    /// Locator text to replace
    pub original: String,
    /// Replacement locator text
    pub replacement: String,
    /// Write a backup first
    pub create_backup: bool,
}

impl CodeModificationRequest {
    /// Create a request that writes a backup
    #[must_use]
    pub fn new(
        file_path: impl Into<PathBuf>,
        line_number: usize,
        original: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line_number,
            original: original.into(),
            replacement: replacement.into(),
            create_backup: true,
        }
    }

    /// Skip the backup
    #[must_use]
    pub const fn without_backup(mut self) -> Self {
        self.create_backup = false;
        self
    }

    /// Request for a stored suggestion, if it names a source location and a
    /// replacement
    #[must_use]
    pub fn from_record(record: &SuggestionRecord) -> Option<Self> {
        Some(Self::new(
            record.file_path.clone()?,
            record.line_number?,
            record.original_locator.clone(),
            record.healed_locator.clone()?,
        ))
    }
}

/// Outcome of a rewrite; errors are reported here, never raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeModificationResult {
    /// The file was rewritten
    pub success: bool,
    /// File that was (or would have been) modified
    pub file_path: PathBuf,
    /// Backup written before the rewrite
    pub backup_path: Option<PathBuf>,
    /// 1-based line actually modified
    pub modified_line: Option<usize>,
    /// Error message on failure
    pub error: Option<String>,
}

/// A backup beside its source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Backup file
    pub path: PathBuf,
    /// Timestamp part of the name
    pub stamp: String,
    /// Size in bytes
    pub size: u64,
}

/// Applies healed locators to source files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeModifier {
    window: usize,
}

impl Default for CodeModifier {
    fn default() -> Self {
        Self {
            window: SEARCH_WINDOW,
        }
    }
}

/// A failed rewrite and the backup taken before it, if any
#[derive(Debug)]
struct ApplyFailure {
    error: HealError,
    backup: Option<PathBuf>,
}

impl From<HealError> for ApplyFailure {
    fn from(error: HealError) -> Self {
        Self { error, backup: None }
    }
}

impl From<std::io::Error> for ApplyFailure {
    fn from(error: std::io::Error) -> Self {
        HealError::from(error).into()
    }
}

impl ApplyFailure {
    fn into_result(self, request: &CodeModificationRequest) -> CodeModificationResult {
        let error = match &self.backup {
            Some(backup) => {
                tracing::warn!(
                    file = %request.file_path.display(),
                    backup = %backup.display(),
                    error = %self.error,
                    "write failed after backup"
                );
                format!("{}; original kept at {}", self.error, backup.display())
            }
            None => self.error.to_string(),
        };
        CodeModificationResult {
            success: false,
            file_path: request.file_path.clone(),
            backup_path: self.backup,
            modified_line: None,
            error: Some(error),
        }
    }
}

impl CodeModifier {
    /// Create a modifier with the default search window
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search radius in lines
    #[must_use]
    pub const fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Rewrite one occurrence of `request.original`
    #[must_use]
    pub fn apply_healing_to_code(&self, request: &CodeModificationRequest) -> CodeModificationResult {
        match self.apply(request) {
            Ok((backup_path, line)) => {
                tracing::info!(
                    file = %request.file_path.display(),
                    line,
                    original = %request.original,
                    replacement = %request.replacement,
                    "applied healed locator"
                );
                CodeModificationResult {
                    success: true,
                    file_path: request.file_path.clone(),
                    backup_path,
                    modified_line: Some(line),
                    error: None,
                }
            }
            Err(failure) => failure.into_result(request),
        }
    }

    fn apply(&self, request: &CodeModificationRequest) -> Result<(Option<PathBuf>, usize), ApplyFailure> {
        let path = &request.file_path;
        if !path.is_file() {
            return Err(HealError::FileNotFound { path: path.clone() }.into());
        }
        if request.original.trim().is_empty() {
            return Err(HealError::InvalidReplacement {
                message: "original locator is empty".to_string(),
            }
            .into());
        }
        if request.replacement.trim().is_empty()
            || request.replacement.contains(['\n', '\r'])
        {
            return Err(HealError::InvalidReplacement {
                message: "replacement must be a single non-empty line".to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(path)?;
        let (updated, line) = self
            .rewrite(&content, request.line_number, &request.original, &request.replacement)
            .ok_or_else(|| HealError::LocatorNotFound {
                locator: request.original.clone(),
                line: request.line_number,
                window: self.window,
            })?;

        let backup = if request.create_backup {
            Some(create_backup(path)?)
        } else {
            None
        };
        if let Err(e) = fs::write(path, updated) {
            return Err(ApplyFailure {
                error: e.into(),
                backup,
            });
        }
        Ok((backup, line))
    }

    /// Rewritten content and the 1-based line changed
    fn rewrite(
        &self,
        content: &str,
        line_number: usize,
        original: &str,
        replacement: &str,
    ) -> Option<(String, usize)> {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let pattern = Pattern::new(original, replacement);

        for index in search_order(line_number, lines.len(), self.window) {
            let line = lines[index];
            let body_len = line.trim_end_matches(['\n', '\r']).len();
            let Some(new_body) = pattern.replace_first(&line[..body_len]) else {
                continue;
            };
            let mut out = String::with_capacity(content.len() + replacement.len());
            for (i, l) in lines.iter().enumerate() {
                if i == index {
                    out.push_str(&new_body);
                    out.push_str(&l[body_len..]);
                } else {
                    out.push_str(l);
                }
            }
            return Some((out, index + 1));
        }
        None
    }
}

/// 0-based line indices to try: target, then -1, +1, -2, +2, ...
fn search_order(line_number: usize, total: usize, window: usize) -> Vec<usize> {
    let target = line_number.saturating_sub(1);
    let mut order = vec![target];
    for d in 1..=window {
        if let Some(above) = target.checked_sub(d) {
            order.push(above);
        }
        order.push(target + d);
    }
    order.retain(|i| *i < total);
    order
}

fn swap_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '"' => '\'',
            '\'' => '"',
            other => other,
        })
        .collect()
}

fn strip_delimiters(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    (s.len() >= 2 && QUOTES.contains(&first) && s.ends_with(first)).then(|| &s[1..s.len() - 1])
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Original locator in its delimiter-free form
struct Pattern {
    cores: Vec<String>,
    replacement: String,
    delimited: bool,
}

impl Pattern {
    fn new(original: &str, replacement: &str) -> Self {
        let (core, delimited) = strip_delimiters(original).map_or((original, false), |c| (c, true));
        let mut cores = vec![core.to_string()];
        let swapped = swap_quotes(core);
        if swapped != core {
            cores.push(swapped);
        }
        let replacement = strip_delimiters(replacement).unwrap_or(replacement);
        Self {
            cores,
            replacement: replacement.to_string(),
            delimited,
        }
    }

    /// Replace the first acceptable occurrence in one line body
    fn replace_first(&self, body: &str) -> Option<String> {
        let (start, end) = self
            .cores
            .iter()
            .filter_map(|core| self.find(body, core))
            .min_by_key(|(start, _)| *start)?;

        let before = body[..start].chars().next_back();
        let replacement = match before {
            Some(q) if QUOTES.contains(&q) && self.replacement.contains(q) && q != '`' => {
                swap_quotes(&self.replacement)
            }
            _ => self.replacement.clone(),
        };
        Some(format!("{}{replacement}{}", &body[..start], &body[end..]))
    }

    fn find(&self, body: &str, core: &str) -> Option<(usize, usize)> {
        body.match_indices(core).map(|(i, m)| (i, i + m.len())).find(|&(start, end)| {
            let before = body[..start].chars().next_back();
            let after = body[end..].chars().next();
            if self.delimited {
                matches!((before, after), (Some(b), Some(a)) if b == a && QUOTES.contains(&b))
            } else {
                let starts_word = core.chars().next().is_some_and(is_word_char);
                let ends_word = core.chars().next_back().is_some_and(is_word_char);
                !(starts_word && before.is_some_and(is_word_char))
                    && !(ends_word && after.is_some_and(is_word_char))
            }
        })
    }
}

fn backup_prefix(file: &Path) -> HealResult<String> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("{n}."))
        .ok_or_else(|| HealError::Backup {
            message: format!("{} has no usable file name", file.display()),
        })
}

/// Copy `file` to a fresh timestamped backup beside it
pub fn create_backup(file: &Path) -> HealResult<PathBuf> {
    let prefix = backup_prefix(file)?;
    let stamp = chrono::Local::now().format(BACKUP_STAMP_FORMAT).to_string();
    let mut backup = file.with_file_name(format!("{prefix}{stamp}.{BACKUP_EXTENSION}"));
    let mut n = 1;
    while backup.exists() {
        backup = file.with_file_name(format!("{prefix}{stamp}-{n}.{BACKUP_EXTENSION}"));
        n += 1;
    }
    fs::copy(file, &backup).map_err(|e| HealError::Backup {
        message: format!("cannot back up {}: {e}", file.display()),
    })?;
    Ok(backup)
}

/// Backups of `file`, newest first
pub fn list_backups(file: &Path) -> HealResult<Vec<BackupInfo>> {
    let prefix = backup_prefix(file)?;
    let suffix = format!(".{BACKUP_EXTENSION}");
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stamp) = name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        else {
            continue;
        };
        if !stamp.starts_with(|c: char| c.is_ascii_digit()) || !stamp.contains('T') {
            continue;
        }
        backups.push(BackupInfo {
            path: entry.path(),
            stamp: stamp.to_string(),
            size: entry.metadata()?.len(),
        });
    }
    backups.sort_by(|a, b| b.stamp.cmp(&a.stamp));
    Ok(backups)
}

/// Overwrite `target` with the contents of `backup`
pub fn restore_backup(backup: &Path, target: &Path) -> HealResult<()> {
    if !backup.is_file() {
        return Err(HealError::FileNotFound {
            path: backup.to_path_buf(),
        });
    }
    fs::copy(backup, target).map_err(|e| HealError::Backup {
        message: format!("cannot restore {}: {e}", backup.display()),
    })?;
    tracing::info!(backup = %backup.display(), target = %target.display(), "restored backup");
    Ok(())
}

/// Keep the newest `keep` backups of `file`; returns how many were removed
pub fn cleanup_backups(file: &Path, keep: usize) -> HealResult<usize> {
    let backups = list_backups(file)?;
    let mut removed = 0;
    for backup in backups.iter().skip(keep) {
        fs::remove_file(&backup.path)?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const LOGIN_TEST: &str = "test('login', async () => {\n  await page.fill('#email', 'a@b.c');\n  await page.click('#submit');\n});\n";

    mod search_tests {
        use super::*;

        #[test]
        fn test_search_order() {
            assert_eq!(search_order(5, 20, 3), vec![4, 3, 5, 2, 6, 1, 7]);
            assert_eq!(search_order(1, 3, 3), vec![0, 1, 2]);
            assert_eq!(search_order(0, 2, 1), vec![0, 1]);
        }

        #[test]
        fn test_quote_tolerant_match() {
            let m = CodeModifier::new();
            let (out, line) = m
                .rewrite("x = \"#submit\"\n", 1, "'#submit'", "'#go'")
                .unwrap();
            assert_eq!(out, "x = \"#go\"\n");
            assert_eq!(line, 1);

            let (out, _) = m
                .rewrite("find(\"[name='q']\")\n", 1, "[name=\"q\"]", "#q")
                .unwrap();
            assert_eq!(out, "find(\"#q\")\n");
        }

        #[test]
        fn test_replacement_quotes_adapt_to_delimiter() {
            let m = CodeModifier::new();
            let (out, _) = m
                .rewrite("click(\"#submit\")\n", 1, "#submit", "[data-testid=\"submit-btn\"]")
                .unwrap();
            assert_eq!(out, "click(\"[data-testid='submit-btn']\")\n");
        }

        #[test]
        fn test_word_boundary() {
            let m = CodeModifier::new();
            assert!(m.rewrite("click('#submit-old')\n", 1, "#submit", "#go").is_none());
        }

        #[test]
        fn test_only_first_occurrence_replaced() {
            let m = CodeModifier::new();
            let (out, _) = m.rewrite("a('#x'); b('#x');\n", 1, "#x", "#y").unwrap();
            assert_eq!(out, "a('#y'); b('#x');\n");
        }

        #[test]
        fn test_above_before_below() {
            let m = CodeModifier::new();
            let content = "'#x'\nnone\n'#x'\n";
            let (out, line) = m.rewrite(content, 2, "#x", "#y").unwrap();
            assert_eq!(line, 1);
            assert_eq!(out, "'#y'\nnone\n'#x'\n");
        }

        #[test]
        fn test_crlf_preserved() {
            let m = CodeModifier::new();
            let (out, _) = m.rewrite("a\r\nclick('#x')\r\n", 2, "#x", "#y").unwrap();
            assert_eq!(out, "a\r\nclick('#y')\r\n");
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn test_apply_with_backup() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "login.spec.ts", LOGIN_TEST);
            let request = CodeModificationRequest::new(&path, 3, "#submit", "[data-testid=\"submit-btn\"]");
            let result = CodeModifier::new().apply_healing_to_code(&request);
            assert!(result.success, "{:?}", result.error);
            assert_eq!(result.modified_line, Some(3));

            let content = fs::read_to_string(&path).unwrap();
            assert!(content.contains("page.click('[data-testid=\"submit-btn\"]')"));
            assert_eq!(content.lines().count(), LOGIN_TEST.lines().count());

            let backup = result.backup_path.unwrap();
            assert_eq!(fs::read_to_string(&backup).unwrap(), LOGIN_TEST);
            assert_eq!(list_backups(&path).unwrap().len(), 1);
        }

        #[test]
        fn test_missing_file() {
            let dir = TempDir::new().unwrap();
            let request = CodeModificationRequest::new(dir.path().join("nope.ts"), 1, "#a", "#b");
            let result = CodeModifier::new().apply_healing_to_code(&request);
            assert!(!result.success);
            assert!(result.error.unwrap().contains("File not found"));
        }

        #[test]
        fn test_not_found_leaves_file_untouched() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "login.spec.ts", LOGIN_TEST);
            let request = CodeModificationRequest::new(&path, 1, "#missing", "#b");
            let result = CodeModifier::new().apply_healing_to_code(&request);
            assert!(!result.success);
            assert!(result.error.unwrap().contains("not found within"));
            assert_eq!(fs::read_to_string(&path).unwrap(), LOGIN_TEST);
            assert!(list_backups(&path).unwrap().is_empty());
        }

        #[test]
        fn test_outside_window_not_found() {
            let dir = TempDir::new().unwrap();
            let content = "'#x'\n\n\n\n\n\n";
            let path = write(&dir, "a.ts", content);
            let request = CodeModificationRequest::new(&path, 6, "#x", "#y").without_backup();
            assert!(!CodeModifier::new().apply_healing_to_code(&request).success);
        }

        #[test]
        fn test_write_failure_reports_backup() {
            let request = CodeModificationRequest::new("login.spec.ts", 3, "#submit", "#go");
            let failure = ApplyFailure {
                error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into(),
                backup: Some(PathBuf::from("login.spec.ts.20260101-000000.bak")),
            };
            let result = failure.into_result(&request);
            assert!(!result.success);
            assert_eq!(
                result.backup_path,
                Some(PathBuf::from("login.spec.ts.20260101-000000.bak"))
            );
            let error = result.error.unwrap();
            assert!(error.contains("read-only"));
            assert!(error.contains("login.spec.ts.20260101-000000.bak"));
        }

        #[test]
        fn test_failure_before_backup_has_no_backup_path() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "login.spec.ts", LOGIN_TEST);
            let request = CodeModificationRequest::new(&path, 1, "#missing", "#b");
            let result = CodeModifier::new().apply_healing_to_code(&request);
            assert!(result.backup_path.is_none());
            assert!(!result.error.unwrap().contains("original kept at"));
        }

        #[test]
        fn test_multiline_replacement_rejected() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "a.ts", LOGIN_TEST);
            let request = CodeModificationRequest::new(&path, 3, "#submit", "#a\n#b");
            let result = CodeModifier::new().apply_healing_to_code(&request);
            assert!(!result.success);
            assert_eq!(fs::read_to_string(&path).unwrap(), LOGIN_TEST);
        }
    }

    mod backup_tests {
        use super::*;

        #[test]
        fn test_restore_and_cleanup() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "a.ts", "v1");
            let first = create_backup(&path).unwrap();
            fs::write(&path, "v2").unwrap();
            create_backup(&path).unwrap();
            create_backup(&path).unwrap();
            write(&dir, "other.ts.20260101T000000000.bak", "x");

            let backups = list_backups(&path).unwrap();
            assert_eq!(backups.len(), 3);
            assert_eq!(backups.last().unwrap().path, first);

            restore_backup(&first, &path).unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), "v1");

            assert_eq!(cleanup_backups(&path, 1).unwrap(), 2);
            let left = list_backups(&path).unwrap();
            assert_eq!(left.len(), 1);
            assert_ne!(left[0].path, first);
        }

        #[test]
        fn test_restore_missing_backup() {
            let dir = TempDir::new().unwrap();
            let target = write(&dir, "a.ts", "v1");
            assert!(restore_backup(&dir.path().join("gone.bak"), &target).is_err());
        }
    }

    proptest! {
        #[test]
        fn prop_other_lines_untouched(
            before in proptest::collection::vec("[a-z ]{0,12}", 0..4),
            after in proptest::collection::vec("[a-z ]{0,12}", 0..4),
        ) {
            let mut lines = before.clone();
            lines.push("click('#submit')".to_string());
            lines.extend(after.iter().cloned());
            let content = lines.join("\n") + "\n";
            let target = before.len() + 1;

            let (out, line) = CodeModifier::new()
                .rewrite(&content, target, "#submit", "#go")
                .unwrap();
            prop_assert_eq!(line, target);
            let out_lines: Vec<&str> = out.lines().collect();
            prop_assert_eq!(out_lines.len(), lines.len());
            for (i, l) in lines.iter().enumerate() {
                if i + 1 == target {
                    prop_assert_eq!(out_lines[i], "click('#go')");
                } else {
                    prop_assert_eq!(out_lines[i], l.as_str());
                }
            }
        }
    }
}
