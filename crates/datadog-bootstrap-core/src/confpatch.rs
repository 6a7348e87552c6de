// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented patching of agent configuration files.
//!
//! The shipped config templates carry commented placeholders such as
//! `# tags:`. The bootstrap uncomments and fills them through ordered
//! [`ReplacementRule`]s: per line, the first rule whose pattern matches
//! substitutes once and later rules are not tried. Rewrites go through a
//! temporary file in the target directory followed by a rename, so the
//! agent reading the file immediately afterwards can never observe a torn
//! write and a failed rewrite leaves the original untouched.

use std::fs;
use std::io::Write;
use std::path::Path;

use regex::Regex;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Error taxonomy for configuration patching.
#[derive(Debug, Error)]
pub enum PatchError {
    /// A replacement rule pattern failed to compile.
    #[error("invalid replacement pattern '{pattern}': {source}")]
    Pattern {
        /// Pattern text as supplied by the caller.
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// The target file could not be read. Missing operator-managed
    /// defaults land here; nothing is created implicitly.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The rewritten contents could not be staged next to the target.
    #[error("failed to stage rewrite of {path}: {source}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The staged file could not be renamed over the target.
    #[error("failed to replace config file {path}: {source}")]
    Replace {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The target file could not be opened or extended for append.
    #[error("failed to append to config file {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A line rewrite: pattern plus replacement expansion template.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    pattern: Regex,
    replacement: String,
}

impl ReplacementRule {
    /// Builds a rule from a regex pattern and an expansion template.
    ///
    /// The template may reference capture groups (`$1`, `${name}`); literal
    /// dollar signs must be written as `$$`. Matching is a partial-line
    /// search and only the first occurrence in a line is replaced, so text
    /// outside the match survives.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, PatchError> {
        let compiled = Regex::new(pattern).map_err(|source| PatchError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    /// Builds the placeholder rule for a `key: value` setting.
    ///
    /// The pattern tolerates an optional comment marker and surrounding
    /// whitespace, so it matches the commented placeholder (`# key: ...`)
    /// as well as a line already rewritten to `key: ...`. Leading
    /// indentation is preserved through a capture group. Re-running the
    /// bootstrap therefore converges instead of stacking edits.
    pub fn setting(key: &str, value: &str) -> Result<Self, PatchError> {
        let pattern = format!(r"^(\s*)#?\s*{}:.*$", regex::escape(key));
        let replacement = format!("${{1}}{}: {}", key, value.replace('$', "$$"));
        Self::new(&pattern, replacement)
    }

    /// Applies the rule to a line, returning the rewritten line on match.
    fn apply(&self, line: &str) -> Option<String> {
        if !self.pattern.is_match(line) {
            return None;
        }
        Some(
            self.pattern
                .replacen(line, 1, self.replacement.as_str())
                .into_owned(),
        )
    }
}

/// Applies the rules to every line, first match per line wins.
///
/// Line terminators are carried through untouched; lines matching no rule
/// copy through byte-identical.
fn rewrite_contents(contents: &str, rules: &[ReplacementRule]) -> String {
    let mut output = String::with_capacity(contents.len());
    for raw_line in contents.split_inclusive('\n') {
        let (line, terminator) = match raw_line.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (raw_line, ""),
        };
        let rewritten = rules.iter().find_map(|rule| rule.apply(line));
        output.push_str(rewritten.as_deref().unwrap_or(line));
        output.push_str(terminator);
    }
    output
}

/// Rewrites an existing file through the replacement rules.
///
/// The whole output is staged in a temporary file created in the target's
/// directory, synced, and renamed over the target. The target must already
/// exist; a missing file is a deployment error, not something to paper
/// over by creating it.
pub fn rewrite_config(path: &Path, rules: &[ReplacementRule]) -> Result<(), PatchError> {
    let display_path = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: display_path.clone(),
        source,
    })?;

    let output = rewrite_contents(&contents, rules);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(parent).map_err(|source| PatchError::Stage {
        path: display_path.clone(),
        source,
    })?;
    staged
        .write_all(output.as_bytes())
        .map_err(|source| PatchError::Stage {
            path: display_path.clone(),
            source,
        })?;
    staged
        .as_file()
        .sync_all()
        .map_err(|source| PatchError::Stage {
            path: display_path.clone(),
            source,
        })?;
    staged.persist(path).map_err(|error| PatchError::Replace {
        path: display_path,
        source: error.error,
    })?;
    Ok(())
}

/// Appends literal text to a file, creating it when absent.
///
/// No deduplication happens here. The bootstrap runs at most once per
/// container lifecycle and the appended block must land verbatim.
pub fn append_config(path: &Path, text: &str) -> Result<(), PatchError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| PatchError::Append {
            path: path.display().to_string(),
            source,
        })?;
    file.write_all(text.as_bytes())
        .map_err(|source| PatchError::Append {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const AGENT_TEMPLATE: &str = "[Main]\n\
        # tags:\n\
        # hostname:\n\
        log_level: INFO\n";

    fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("fixture write should succeed");
        path
    }

    #[test]
    fn setting_rule_uncomments_placeholder() {
        let rule = ReplacementRule::setting("tags", "env:prod").expect("rule should build");
        assert_eq!(rule.apply("# tags:"), Some("tags: env:prod".to_string()));
        assert_eq!(rule.apply("#tags: old, stale"), Some("tags: env:prod".to_string()));
        assert_eq!(rule.apply("tags: previous"), Some("tags: env:prod".to_string()));
        assert_eq!(rule.apply("log_level: INFO"), None);
    }

    /// The key must start the line; a longer setting name never matches.
    #[test]
    fn setting_rule_does_not_match_suffixed_keys() {
        let rule = ReplacementRule::setting("tags", "env:prod").expect("rule should build");
        assert_eq!(rule.apply("# histogram_tags: none"), None);
    }

    #[test]
    fn setting_rule_preserves_indentation() {
        let rule = ReplacementRule::setting("collect_labels_as_tags", "[\"a\"]")
            .expect("rule should build");
        assert_eq!(
            rule.apply("    # collect_labels_as_tags: []"),
            Some("    collect_labels_as_tags: [\"a\"]".to_string())
        );
    }

    /// Literal dollar signs in values must not trigger capture expansion.
    #[test]
    fn setting_rule_escapes_dollar_in_value() {
        let rule = ReplacementRule::setting("tags", "cost:$12").expect("rule should build");
        assert_eq!(rule.apply("# tags:"), Some("tags: cost:$12".to_string()));
    }

    #[test]
    fn rule_keys_are_regex_escaped() {
        let rule = ReplacementRule::setting("docker.sock", "enabled").expect("rule should build");
        assert_eq!(rule.apply("# docker.sock:"), Some("docker.sock: enabled".to_string()));
        assert_eq!(rule.apply("# dockerXsock:"), None);
    }

    /// A partial-line match keeps the text around the matched region.
    #[test]
    fn replacement_preserves_trailing_content() {
        let rule = ReplacementRule::new("disabled", "enabled").expect("rule should build");
        assert_eq!(
            rule.apply("feature disabled # do not touch"),
            Some("feature enabled # do not touch".to_string())
        );
    }

    #[test]
    fn first_matching_rule_wins_per_line() {
        let rules = vec![
            ReplacementRule::setting("tags", "env:prod").expect("rule should build"),
            ReplacementRule::new("tags:.*$", "tags: second-rule").expect("rule should build"),
        ];
        let output = rewrite_contents("# tags:\n", &rules);
        assert_eq!(output, "tags: env:prod\n");
    }

    #[test]
    fn rewrite_contents_without_matches_is_identity() {
        let rules = vec![ReplacementRule::setting("tags", "env:prod").expect("rule should build")];
        let input = "[Main]\nlog_level: INFO\nno trailing newline";
        assert_eq!(rewrite_contents(input, &rules), input);
    }

    #[test]
    fn rewrite_config_updates_placeholders_in_place() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = write_fixture(&dir, "datadog.conf", AGENT_TEMPLATE);
        let rules = vec![
            ReplacementRule::setting("tags", "env:prod, rack:a1").expect("rule should build"),
            ReplacementRule::setting("hostname", "worker-1").expect("rule should build"),
        ];

        rewrite_config(&path, &rules).expect("rewrite should succeed");

        let contents = fs::read_to_string(&path).expect("file should read back");
        assert_eq!(
            contents,
            "[Main]\ntags: env:prod, rack:a1\nhostname: worker-1\nlog_level: INFO\n"
        );
    }

    /// Re-running the same rewrite converges on the same bytes.
    #[test]
    fn rewrite_config_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = write_fixture(&dir, "datadog.conf", AGENT_TEMPLATE);
        let rules = vec![ReplacementRule::setting("tags", "env:prod").expect("rule should build")];

        rewrite_config(&path, &rules).expect("first rewrite should succeed");
        let first = fs::read_to_string(&path).expect("file should read back");
        rewrite_config(&path, &rules).expect("second rewrite should succeed");
        let second = fs::read_to_string(&path).expect("file should read back");

        assert_eq!(first, second);
        assert_eq!(first.matches("tags:").count(), 1);
    }

    #[test]
    fn rewrite_config_with_no_matching_rule_is_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let input = "untouched: yes\n# unrelated comment\nfinal line without newline";
        let path = write_fixture(&dir, "datadog.conf", input);
        let rules =
            vec![ReplacementRule::setting("absent_key", "value").expect("rule should build")];

        rewrite_config(&path, &rules).expect("rewrite should succeed");

        assert_eq!(
            fs::read(&path).expect("file should read back"),
            input.as_bytes()
        );
    }

    #[test]
    fn rewrite_config_fails_on_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("missing.conf");
        let rules = vec![ReplacementRule::setting("tags", "env:prod").expect("rule should build")];

        let error = rewrite_config(&path, &rules).expect_err("missing file should fail");

        assert!(matches!(error, PatchError::Read { .. }));
        assert!(!path.exists(), "rewrite must not create the target");
    }

    /// A write interrupted before the rename leaves the original intact.
    #[test]
    fn interrupted_stage_leaves_original_untouched() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = write_fixture(&dir, "datadog.conf", AGENT_TEMPLATE);

        // Simulate a crash mid-stage: partial content reaches the staging
        // file but the rename never happens.
        {
            let mut staged =
                NamedTempFile::new_in(dir.path()).expect("staging file should be created");
            staged
                .write_all(b"[Main]\ntags: half-writ")
                .expect("staged write should succeed");
        }

        assert_eq!(
            fs::read_to_string(&path).expect("file should read back"),
            AGENT_TEMPLATE
        );
    }

    #[test]
    fn append_config_writes_verbatim_and_creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("datadog.conf");

        append_config(&path, "service_discovery_backend: docker\n")
            .expect("append should create the file");
        append_config(&path, "sd_config_backend: etcd\n").expect("append should extend the file");

        let contents = fs::read_to_string(&path).expect("file should read back");
        assert_eq!(
            contents,
            "service_discovery_backend: docker\nsd_config_backend: etcd\n"
        );
    }

    /// Append never deduplicates; calling twice doubles the block.
    #[test]
    fn append_config_does_not_deduplicate() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = write_fixture(&dir, "datadog.conf", "");

        append_config(&path, "consul_token: abc\n").expect("append should succeed");
        append_config(&path, "consul_token: abc\n").expect("append should succeed");

        let contents = fs::read_to_string(&path).expect("file should read back");
        assert_eq!(contents.matches("consul_token").count(), 2);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let error = ReplacementRule::new("(unclosed", "x").expect_err("pattern should fail");
        assert!(matches!(error, PatchError::Pattern { .. }));
    }
}
