//! Import specifier resolution against the project file set.
//!
//! Resolution is lexical: a specifier maps to a root-relative path only when
//! that path is one of the project's known source files.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::workspace::{normalize_path, relative_path, to_slash, ProjectDescriptor};

/// Extensions probed, in order, for an extensionless specifier.
const PROBE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "d.ts"];

/// Script extensions a specifier may name explicitly.
const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    known: HashSet<String>,
    /// Root-relative `baseUrl`, `""` for the root itself.
    base_url: Option<String>,
    /// Patterns sorted by literal prefix length, longest first.
    paths: Vec<(String, Vec<String>)>,
    paths_base: Option<String>,
}

impl ModuleResolver {
    pub fn new<I>(project: &ProjectDescriptor, known: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let compiler = &project.compiler;
        let base_url = compiler
            .base_url
            .as_deref()
            .and_then(|p| relative_path(&project.root, p));
        // `paths` targets are relative to baseUrl when it is set.
        let paths_base = base_url.clone().or_else(|| {
            compiler
                .paths_base
                .as_deref()
                .and_then(|p| relative_path(&project.root, p))
        });

        Self {
            known: known.into_iter().collect(),
            base_url,
            paths: sort_patterns(&compiler.paths),
            paths_base,
        }
    }

    /// Resolver with relative resolution only.
    pub fn for_files<I>(known: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            known: known.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_known(&self, rel_path: &str) -> bool {
        self.known.contains(rel_path)
    }

    /// Resolves `specifier` imported from `from_file`. `None` means external or missing.
    pub fn resolve(&self, from_file: &str, specifier: &str) -> Option<String> {
        if is_relative(specifier) {
            let dir = match from_file.rfind('/') {
                Some(idx) => &from_file[..idx],
                None => "",
            };
            return self.probe(&join(dir, specifier)?);
        }

        for (pattern, targets) in &self.paths {
            let Some(star) = match_pattern(pattern, specifier) else {
                continue;
            };
            let base = self.paths_base.as_deref().unwrap_or("");
            for target in targets {
                let target = target.replacen('*', star, 1);
                if let Some(found) = join(base, &target).and_then(|c| self.probe(&c)) {
                    return Some(found);
                }
            }
        }

        let base = self.base_url.as_deref()?;
        self.probe(&join(base, specifier)?)
    }

    fn probe(&self, candidate: &str) -> Option<String> {
        let mut candidates = Vec::new();

        if let Some((stem, ext)) = candidate.rsplit_once('.') {
            if SCRIPT_EXTENSIONS.contains(&ext) && !stem.ends_with('/') {
                candidates.push(candidate.to_string());
                // ESM style `./util.js` pointing at `util.ts`
                if matches!(ext, "js" | "jsx" | "mjs" | "cjs") {
                    candidates.push(format!("{}.ts", stem));
                    candidates.push(format!("{}.tsx", stem));
                }
            }
        }

        for ext in PROBE_EXTENSIONS {
            candidates.push(format!("{}.{}", candidate, ext));
        }
        for ext in PROBE_EXTENSIONS {
            candidates.push(if candidate.is_empty() {
                format!("index.{}", ext)
            } else {
                format!("{}/index.{}", candidate, ext)
            });
        }

        candidates.into_iter().find(|c| self.known.contains(c))
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Joins and normalizes; `None` when the result escapes the root.
fn join(base: &str, rest: &str) -> Option<String> {
    let joined = if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", base, rest)
    };
    let normalized = to_slash(&normalize_path(Path::new(&joined)));
    if normalized == ".." || normalized.starts_with("../") {
        return None;
    }
    if normalized == "." {
        return Some(String::new());
    }
    Some(normalized)
}

/// Matches a `paths` key with at most one `*`, returning the captured text.
fn match_pattern<'a>(pattern: &str, specifier: &'a str) -> Option<&'a str> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            if specifier.len() >= prefix.len() + suffix.len()
                && specifier.starts_with(prefix)
                && specifier.ends_with(suffix)
            {
                Some(&specifier[prefix.len()..specifier.len() - suffix.len()])
            } else {
                None
            }
        }
        None => (pattern == specifier).then_some(""),
    }
}

fn sort_patterns(paths: &BTreeMap<String, Vec<String>>) -> Vec<(String, Vec<String>)> {
    let mut sorted: Vec<_> = paths
        .iter()
        .map(|(pattern, targets)| (pattern.clone(), targets.clone()))
        .collect();
    sorted.sort_by_key(|(pattern, _)| {
        let prefix = pattern.split('*').next().unwrap_or("");
        std::cmp::Reverse(prefix.len())
    });
    sorted
}
