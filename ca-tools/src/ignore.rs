use crate::error::{Result, ToolError};
use crate::text::split_lines;
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".venv",
    "env",
    ".env",
    ".git",
    ".vscode",
    ".idea",
    "node_modules",
    "__pycache__",
    "build",
    "dist",
    ".cache",
    ".tmp",
    "tmp",
];

pub const DEFAULT_IGNORE_FILES: &[&str] = &[
    ".DS_Store",
    ".env",
    "*.env.*",
    "*.log",
    "*.db",
    "*.sqlite",
    "*.egg",
    "*.egg-info",
    "*.pyc",
    "*.ignore.*",
];

#[derive(Debug, Clone)]
struct Pattern {
    raw: String,
    matcher: Option<globset::GlobMatcher>,
}

impl Pattern {
    fn new(raw: &str) -> Result<Self> {
        let matcher = if raw.contains(['*', '?', '[', '{']) {
            let glob = globset::GlobBuilder::new(raw)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ToolError::InvalidArguments(format!("invalid ignore pattern '{raw}': {e}"))
                })?;
            Some(glob.compile_matcher())
        } else {
            None
        };
        Ok(Self {
            raw: raw.to_string(),
            matcher,
        })
    }

    fn is_nested(&self) -> bool {
        self.raw.contains('/')
    }

    fn matches_name(&self, name: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(name),
            None => name == self.raw,
        }
    }

    fn matches_name_prefix(&self, name: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(name),
            None => name.starts_with(&self.raw),
        }
    }
}

/// Directory and file patterns hiding VCS, build and cache artifacts from the
/// tools. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    dirs: Vec<Pattern>,
    files: Vec<Pattern>,
    known: HashSet<String>,
}

impl IgnoreRules {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut rules = Self::empty();
        for d in DEFAULT_IGNORE_DIRS {
            if let Err(e) = rules.add_dir(d) {
                tracing::debug!(pattern = d, error = %e, "skipping default ignore dir");
            }
        }
        for f in DEFAULT_IGNORE_FILES {
            if let Err(e) = rules.add_file(f) {
                tracing::debug!(pattern = f, error = %e, "skipping default ignore file");
            }
        }
        rules
    }

    /// Returns false when the pattern was already present.
    pub fn add_dir(&mut self, raw: &str) -> Result<bool> {
        let raw = normalize(raw);
        if raw.is_empty() || !self.known.insert(format!("{raw}/")) {
            return Ok(false);
        }
        self.dirs.push(Pattern::new(&raw)?);
        Ok(true)
    }

    pub fn add_file(&mut self, raw: &str) -> Result<bool> {
        let raw = normalize(raw);
        if raw.is_empty() || !self.known.insert(raw.clone()) {
            return Ok(false);
        }
        self.files.push(Pattern::new(&raw)?);
        Ok(true)
    }

    /// Folds one `.gitignore` into the rule set: `dir/` lines become directory
    /// patterns, everything else a file pattern. Comments, negations and
    /// already known patterns are skipped. Returns how many rules were added.
    pub fn add_gitignore(&mut self, content: &str) -> usize {
        let mut added = 0;
        for line in split_lines(content) {
            let s = line.trim();
            if s.is_empty() || s.starts_with('#') || s.starts_with('!') {
                continue;
            }
            let outcome = if s.ends_with('/') {
                self.add_dir(s)
            } else {
                self.add_file(s)
            };
            match outcome {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!(pattern = s, error = %e, "skipping gitignore line"),
            }
        }
        added
    }

    pub fn dir_patterns(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(|p| p.raw.as_str())
    }

    pub fn file_patterns(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|p| p.raw.as_str())
    }

    /// `rel` is relative to the sandbox root, `/`-separated.
    pub fn is_ignored(&self, rel: &str, is_dir: bool) -> bool {
        let rel = rel.trim_start_matches("./").trim_matches('/');
        if rel.is_empty() {
            return false;
        }
        let (parent, name) = match rel.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", rel),
        };
        let dir_part = if is_dir { rel } else { parent };
        let padded_dir = format!("/{dir_part}/");

        for p in &self.dirs {
            if p.is_nested() {
                if padded_dir.contains(&format!("/{}/", p.raw)) {
                    return true;
                }
                continue;
            }
            if dir_part.split('/').any(|c| !c.is_empty() && p.matches_name(c)) {
                return true;
            }
            if is_dir && p.matches_name_prefix(name) {
                return true;
            }
        }

        for p in &self.files {
            if p.is_nested() {
                let raw = p.raw.as_str();
                if rel == raw || rel.starts_with(&format!("{raw}/")) {
                    return true;
                }
                continue;
            }
            if p.matches_name_prefix(name) {
                return true;
            }
        }
        false
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .replace('\\', "")
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string()
}

/// Walks `root` under the current rules and folds every `.gitignore` found.
pub fn load_gitignores(rules: &mut IgnoreRules, root: &Path) -> Result<usize> {
    let entries = crate::sandbox::walk(root, rules)?;
    let mut added = 0;
    for rel in entries.iter().filter(|e| !e.ends_with('/')) {
        if Path::new(rel).file_name().and_then(|n| n.to_str()) != Some(".gitignore") {
            continue;
        }
        let path = root.join(rel.trim_start_matches("./"));
        match std::fs::read_to_string(&path) {
            Ok(content) => added += rules.add_gitignore(&content),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "unreadable gitignore"),
        }
    }
    tracing::debug!(added, "loaded gitignore rules");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dirs_hide_nested_artifacts() {
        let rules = IgnoreRules::with_defaults();
        assert!(rules.is_ignored("node_modules", true));
        assert!(rules.is_ignored("web/node_modules/react/index.js", false));
        assert!(rules.is_ignored("src/.git", true));
        assert!(!rules.is_ignored("src/main.rs", false));
    }

    #[test]
    fn defaults_load_every_builtin_pattern() {
        let rules = IgnoreRules::with_defaults();
        assert_eq!(rules.dir_patterns().count(), DEFAULT_IGNORE_DIRS.len());
        assert_eq!(rules.file_patterns().count(), DEFAULT_IGNORE_FILES.len());
    }

    #[test]
    fn dir_prefix_only_applies_to_directories() {
        let rules = IgnoreRules::with_defaults();
        assert!(rules.is_ignored("distribution", true));
        assert!(!rules.is_ignored("build.rs", false));
        assert!(!rules.is_ignored("src/envelope.go", false));
    }

    #[test]
    fn file_patterns_match_basename() {
        let rules = IgnoreRules::with_defaults();
        assert!(rules.is_ignored("logs/app.log", false));
        assert!(rules.is_ignored(".env.local", false));
        assert!(rules.is_ignored("cfg/prod.env.json", false));
        assert!(rules.is_ignored("pkg/mod.pyc", false));
        assert!(!rules.is_ignored("README.md", false));
    }

    #[test]
    fn gitignore_lines_become_rules() {
        let mut rules = IgnoreRules::empty();
        let added = rules.add_gitignore(
            "# comment\r\ntarget/\n!keep.txt\n*.tmp\n/coverage\n\ntarget/\ndocs/generated/\n",
        );
        assert_eq!(added, 4);
        assert!(rules.is_ignored("target", true));
        assert!(rules.is_ignored("crate/target/debug/app", false));
        assert!(rules.is_ignored("scratch.tmp", false));
        assert!(rules.is_ignored("coverage", true));
        assert!(rules.is_ignored("docs/generated/api.md", false));
        assert!(!rules.is_ignored("keep.txt", false));
        assert!(!rules.is_ignored("docs/index.md", false));
    }

    #[test]
    fn load_gitignores_reads_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "out/\n").unwrap();
        std::fs::write(tmp.path().join("sub/.gitignore"), "*.bak\n").unwrap();
        let mut rules = IgnoreRules::with_defaults();
        assert_eq!(load_gitignores(&mut rules, tmp.path()).unwrap(), 2);
        assert!(rules.is_ignored("out", true));
        assert!(rules.is_ignored("sub/x.bak", false));
    }
}
