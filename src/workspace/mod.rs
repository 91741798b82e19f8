//! Project descriptor and indexer settings.
//!
//! A project is described by a tsconfig-style JSON file: the file set
//! (`files`, `include`, `exclude`) and the compiler settings that affect
//! module resolution (`baseUrl`, `paths`, `allowJs`).

pub mod tsconfig;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{IndexerError, Result};
use crate::indexer::identity::StrategyKind;

/// Directories never indexed, whatever the descriptor says.
pub const ALWAYS_EXCLUDED: &[&str] = &["node_modules", "bower_components", "jspm_packages"];

const DEFAULT_DESCRIPTOR: &str = "tsconfig.json";

#[derive(Debug, Clone, Default)]
pub struct CompilerSettings {
    pub base_url: Option<PathBuf>,
    /// `paths` mappings, keyed by pattern with at most one `*`.
    pub paths: BTreeMap<String, Vec<String>>,
    pub paths_base: Option<PathBuf>,
    pub allow_js: bool,
}

#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    /// Descriptor file, if one was found.
    pub config_path: Option<PathBuf>,
    /// Directory all project paths are relative to.
    pub root: PathBuf,
    pub files: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub compiler: CompilerSettings,
}

impl ProjectDescriptor {
    /// Loads a descriptor from a tsconfig-style file, or from a directory
    /// containing `tsconfig.json`. A directory without one indexes everything.
    pub fn load(path: &Path) -> Result<Self> {
        let path = normalize_path(path);
        if path.is_dir() {
            let candidate = path.join(DEFAULT_DESCRIPTOR);
            if candidate.is_file() {
                return Self::from_config_file(&candidate);
            }
            return Ok(Self::for_directory(&path));
        }
        if !path.is_file() {
            return Err(IndexerError::Config(format!(
                "project descriptor not found: {}",
                path.display()
            )));
        }
        Self::from_config_file(&path)
    }

    pub fn for_directory(root: &Path) -> Self {
        Self {
            config_path: None,
            root: normalize_path(root),
            files: Vec::new(),
            include: vec!["**/*".to_string()],
            exclude: Vec::new(),
            compiler: CompilerSettings::default(),
        }
    }

    fn from_config_file(path: &Path) -> Result<Self> {
        let resolved = tsconfig::load(path)?;
        let root = normalize_path(path.parent().unwrap_or(Path::new(".")));

        let files = resolved.files.unwrap_or_default();
        let include = match resolved.include {
            Some(include) => include,
            None if !files.is_empty() => Vec::new(),
            None => vec!["**/*".to_string()],
        };

        let mut exclude = resolved.exclude.unwrap_or_default();
        if let Some(out_dir) = &resolved.out_dir {
            if let Some(rel) = relative_path(&root, out_dir) {
                exclude.push(rel);
            }
        }

        Ok(Self {
            config_path: Some(path.to_path_buf()),
            root,
            files,
            include,
            exclude,
            compiler: CompilerSettings {
                base_url: resolved.base_url,
                paths: resolved.paths,
                paths_base: resolved.paths_base,
                allow_js: resolved.allow_js,
            },
        })
    }

    /// Decides whether a root-relative path (forward slashes) belongs to the file set.
    pub fn contains(&self, rel_path: &str) -> bool {
        if rel_path
            .split('/')
            .any(|segment| ALWAYS_EXCLUDED.contains(&segment))
        {
            return false;
        }

        if self.files.iter().any(|f| trim_dot_slash(f) == rel_path) {
            return true;
        }

        let included = self
            .include
            .iter()
            .any(|pattern| matches_spec(pattern, rel_path));
        let excluded = self
            .exclude
            .iter()
            .any(|pattern| matches_spec(pattern, rel_path));

        included && !excluded
    }

    /// Root-relative, forward-slash form of an absolute path inside the project.
    pub fn relative(&self, path: &Path) -> String {
        relative_path(&self.root, path).unwrap_or_else(|| to_slash(path))
    }
}

/// Settings fixed for one indexing run.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub project: ProjectDescriptor,
    pub output: PathBuf,
    pub strategy: StrategyKind,
    /// Distinct unfamiliar node kinds tolerated before the run aborts.
    pub max_unsupported_kinds: usize,
    pub snapshot_content: bool,
}

impl IndexerConfig {
    pub const DEFAULT_MAX_UNSUPPORTED_KINDS: usize = 10;

    pub fn new(project: ProjectDescriptor, output: impl Into<PathBuf>) -> Self {
        Self {
            project,
            output: output.into(),
            strategy: StrategyKind::default(),
            max_unsupported_kinds: Self::DEFAULT_MAX_UNSUPPORTED_KINDS,
            snapshot_content: false,
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_unsupported_kinds(mut self, max: usize) -> Self {
        self.max_unsupported_kinds = max;
        self
    }

    pub fn with_snapshot_content(mut self, enabled: bool) -> Self {
        self.snapshot_content = enabled;
        self
    }
}

/// tsconfig include/exclude matching: a spec without wildcards and without an
/// extension names a directory and matches everything below it.
fn matches_spec(spec: &str, rel_path: &str) -> bool {
    let spec = trim_dot_slash(spec).trim_end_matches('/');
    if spec.is_empty() {
        return true;
    }

    let has_wildcard = spec.contains('*') || spec.contains('?');
    let last = spec.rsplit('/').next().unwrap_or(spec);
    let looks_like_dir = !has_wildcard && !last.contains('.');

    let pattern = if looks_like_dir {
        format!("{}/**/*", spec)
    } else {
        spec.to_string()
    };

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    Pattern::new(&pattern)
        .map(|p| p.matches_with(rel_path, options) || (!has_wildcard && spec == rel_path))
        .unwrap_or(false)
}

fn trim_dot_slash(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Forward-slash path of `path` relative to `root`, if it lies below it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let path = normalize_path(path);
    let root = normalize_path(root);
    if root == Path::new(".") && path.is_relative() {
        return Some(to_slash(&path));
    }
    path.strip_prefix(&root).ok().map(to_slash)
}

pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/p"), Path::new("/p/src/../lib/a.ts")),
            Some("lib/a.ts".to_string())
        );
        assert_eq!(relative_path(Path::new("/p"), Path::new("/q/a.ts")), None);
    }

    #[test]
    fn test_matches_spec_directory_and_globs() {
        assert!(matches_spec("src", "src/components/Button.tsx"));
        assert!(!matches_spec("src", "lib/a.ts"));
        assert!(matches_spec("**/*", "a.ts"));
        assert!(matches_spec("src/**/*.tsx", "src/a/b/C.tsx"));
        assert!(!matches_spec("src/*.tsx", "src/a/C.tsx"));
        assert!(matches_spec("./src/index.ts", "src/index.ts"));
    }

    #[test]
    fn test_descriptor_contains() {
        let mut project = ProjectDescriptor::for_directory(Path::new("/p"));
        project.exclude = vec!["dist".to_string(), "**/*.test.tsx".to_string()];

        assert!(project.contains("src/App.tsx"));
        assert!(!project.contains("dist/App.js"));
        assert!(!project.contains("src/App.test.tsx"));
        assert!(!project.contains("node_modules/react/index.js"));
    }

    #[test]
    fn test_load_from_directory_with_tsconfig() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{
                // app config
                "compilerOptions": { "baseUrl": "src", "outDir": "build", },
                "include": ["src"],
            }"#,
        )
        .unwrap();

        let project = ProjectDescriptor::load(dir.path()).unwrap();
        assert!(project.config_path.is_some());
        assert_eq!(project.include, vec!["src".to_string()]);
        assert!(project.exclude.contains(&"build".to_string()));
        assert_eq!(project.compiler.base_url, Some(normalize_path(&dir.path().join("src"))));
        assert!(project.contains("src/main.ts"));
        assert!(!project.contains("test/main.ts"));
    }

    #[test]
    fn test_load_files_only_descriptor() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{ "files": ["./src/entry.ts"] }"#,
        )
        .unwrap();

        let project = ProjectDescriptor::load(&dir.path().join("tsconfig.json")).unwrap();
        assert!(project.include.is_empty());
        assert!(project.contains("src/entry.ts"));
        assert!(!project.contains("src/other.ts"));
    }

    #[test]
    fn test_load_missing_descriptor() {
        let dir = TempDir::new().unwrap();
        let err = ProjectDescriptor::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }
}
