use crate::error::{Result, ToolError};
use crate::ignore::IgnoreRules;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// The project directory every tool operation is confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    root_name: String,
    rules: Arc<IgnoreRules>,
}

impl Sandbox {
    pub fn new(root: impl AsRef<Path>, rules: IgnoreRules) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(ToolError::InvalidArguments(
                "sandbox root is required".to_string(),
            ));
        }
        let root = std::fs::canonicalize(root).map_err(|e| {
            ToolError::InvalidArguments(format!(
                "sandbox root {} is not accessible: {e}",
                root.display()
            ))
        })?;
        if !root.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "sandbox root {} is not a directory",
                root.display()
            )));
        }
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            root,
            root_name,
            rules: Arc::new(rules),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &IgnoreRules {
        &self.rules
    }

    /// Maps a model-supplied path onto the root. Display paths from `list`
    /// round-trip: a leading root basename and leading slashes are stripped.
    /// Any `..` component is rejected rather than clamped.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        if raw.contains('\0') {
            return Err(ToolError::InvalidArguments(
                "path contains a NUL byte".to_string(),
            ));
        }
        let slashed = raw.trim().replace('\\', "/");
        let mut p = slashed.as_str();
        if !self.root_name.is_empty() {
            let name = self.root_name.as_str();
            let bare = p.trim_start_matches('/');
            if bare == name {
                p = "";
            } else if let Some(rest) = bare.strip_prefix(name).and_then(|r| r.strip_prefix('/')) {
                p = rest;
            }
        }
        let p = p.trim_start_matches('/');

        let rel = Path::new(p);
        for component in rel.components() {
            match component {
                Component::ParentDir => {
                    return Err(ToolError::Unauthorized(format!(
                        "path traversal is not allowed: {raw}"
                    )));
                }
                Component::CurDir | Component::Normal(_) => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::Unauthorized(format!("invalid path: {raw}")));
                }
            }
        }
        let resolved = self.root.join(rel);

        self.check_containment(&resolved, raw)?;
        Ok(resolved)
    }

    /// The deepest existing ancestor of `path` must canonicalize under the
    /// root, so a symlink inside the project cannot point writes outside it.
    /// A dangling symlink on the way is rejected outright.
    fn check_containment(&self, path: &Path, raw: &str) -> Result<()> {
        let escapes = || ToolError::Unauthorized(format!("path escapes the project root: {raw}"));
        let mut current = Some(path);
        while let Some(candidate) = current {
            match std::fs::canonicalize(candidate) {
                Ok(canonical) if canonical.starts_with(&self.root) => return Ok(()),
                Ok(_) => return Err(escapes()),
                Err(_) => {
                    let is_link = std::fs::symlink_metadata(candidate)
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(false);
                    if is_link {
                        return Err(escapes());
                    }
                    current = candidate.parent();
                }
            }
        }
        Err(escapes())
    }

    /// Every non-ignored entry, sorted, directories suffixed with `/`.
    pub fn entries(&self) -> Result<Vec<String>> {
        walk(&self.root, &self.rules)
    }

    /// The project tree wrapped in `<project-entries>` markers.
    pub fn listing(&self) -> Result<String> {
        let entries = self.entries()?;
        let mut out = String::from("<project-entries>\n");
        for e in entries {
            out.push_str(&e);
            out.push('\n');
        }
        out.push_str("</project-entries>");
        Ok(out)
    }
}

fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursive walk that prunes ignored directories. Symlinks are listed but
/// never followed.
pub(crate) fn walk(root: &Path, rules: &IgnoreRules) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(rel_dir) = stack.pop() {
        let dir = root.join(&rel_dir);
        let rd = match std::fs::read_dir(&dir) {
            Ok(v) => v,
            Err(e) if rel_dir.as_os_str().is_empty() => return Err(e.into()),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in rd {
            let entry = entry?;
            let rel = rel_dir.join(entry.file_name());
            let rel_str = to_slash(&rel);
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if rules.is_ignored(&rel_str, is_dir) {
                continue;
            }
            if is_dir {
                out.push(format!("./{rel_str}/"));
                stack.push(rel);
            } else {
                out.push(format!("./{rel_str}"));
            }
        }
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(dir: &Path) -> Sandbox {
        Sandbox::new(dir, IgnoreRules::with_defaults()).unwrap()
    }

    #[test]
    fn resolve_strips_root_name_and_leading_slash() {
        let tmp = tempfile::tempdir().unwrap();
        let sb = sandbox(tmp.path());
        let name = sb.root().file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(sb.resolve("src/a.rs").unwrap(), sb.root().join("src/a.rs"));
        assert_eq!(sb.resolve("/src/a.rs").unwrap(), sb.root().join("src/a.rs"));
        assert_eq!(sb.resolve(&format!("{name}/src/a.rs")).unwrap(), sb.root().join("src/a.rs"));
        assert_eq!(sb.resolve(&format!("/{name}/src/a.rs")).unwrap(), sb.root().join("src/a.rs"));
        assert_eq!(sb.resolve("./src/a.rs").unwrap(), sb.root().join("./src/a.rs"));
        assert_eq!(sb.resolve(&name).unwrap(), sb.root().to_path_buf());
    }

    #[test]
    fn resolve_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let sb = sandbox(tmp.path());
        for raw in ["../x", "a/../../x", "/..", "a/..", "..\\secret"] {
            let err = sb.resolve(raw).unwrap_err();
            assert!(err.to_string().contains("traversal"), "{raw}: {err}");
        }
        for raw in ["a/b", "..foo/bar", "x/...y", ""] {
            assert!(sb.resolve(raw).unwrap().starts_with(sb.root()), "{raw}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        let sb = sandbox(tmp.path());
        for raw in ["link", "link/file.txt", "link/new/dir/file.txt"] {
            let err = sb.resolve(raw).unwrap_err();
            assert!(err.to_string().contains("escapes"), "{raw}: {err}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_dangling_symlink() {
        let outside = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("later.txt"), tmp.path().join("ghost")).unwrap();
        let sb = sandbox(tmp.path());
        assert!(sb.resolve("ghost").unwrap_err().to_string().contains("escapes"));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_accepts_internal_symlink_and_new_paths() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("alias")).unwrap();
        let sb = sandbox(tmp.path());
        assert!(sb.resolve("alias/new.txt").is_ok());
        assert!(sb.resolve("fresh/dir/new.txt").is_ok());
    }

    #[test]
    fn listing_is_sorted_and_skips_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        std::fs::write(tmp.path().join("src/nested/b.rs"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();
        std::fs::write(tmp.path().join("debug.log"), "").unwrap();
        let sb = sandbox(tmp.path());

        assert_eq!(
            sb.listing().unwrap(),
            "<project-entries>\n./README.md\n./src/\n./src/nested/\n./src/nested/b.rs\n</project-entries>"
        );
    }

    #[test]
    fn empty_tree_still_has_markers() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            sandbox(tmp.path()).listing().unwrap(),
            "<project-entries>\n</project-entries>"
        );
    }
}
