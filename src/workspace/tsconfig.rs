//! tsconfig-style project descriptor parsing.
//!
//! tsconfig files are JSON with comments and trailing commas, and may
//! `extends` another config by relative path.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::normalize_path;
use crate::error::{IndexerError, Result};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTsConfig {
    pub extends: Option<String>,
    pub files: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub compiler_options: RawCompilerOptions,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCompilerOptions {
    pub base_url: Option<String>,
    pub paths: Option<BTreeMap<String, Vec<String>>>,
    pub allow_js: Option<bool>,
    pub out_dir: Option<String>,
}

/// A config file after `extends` resolution. Relative settings are already
/// anchored to the directory of the file that declared them.
#[derive(Debug, Default, Clone)]
pub struct ResolvedTsConfig {
    pub files: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub base_url: Option<PathBuf>,
    pub paths: BTreeMap<String, Vec<String>>,
    /// Directory that `paths` targets are relative to when no `baseUrl` is set.
    pub paths_base: Option<PathBuf>,
    pub allow_js: bool,
    pub out_dir: Option<PathBuf>,
}

pub fn load(path: &Path) -> Result<ResolvedTsConfig> {
    let mut seen = HashSet::new();
    load_recursive(path, &mut seen)
}

fn load_recursive(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<ResolvedTsConfig> {
    if !seen.insert(path.to_path_buf()) {
        return Err(IndexerError::Config(format!(
            "circular `extends` chain through {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        IndexerError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    let raw: RawTsConfig = serde_json::from_str(&strip_jsonc(&content)).map_err(|e| {
        IndexerError::Config(format!("invalid project descriptor {}: {}", path.display(), e))
    })?;

    let dir = normalize_path(path.parent().unwrap_or(Path::new(".")));

    let mut resolved = match raw.extends.as_deref() {
        Some(parent) if parent.starts_with('.') || Path::new(parent).is_absolute() => {
            let mut parent_path = normalize_path(&dir.join(parent));
            if !parent_path.exists() {
                let mut with_ext = parent_path.into_os_string();
                with_ext.push(".json");
                parent_path = PathBuf::from(with_ext);
            }
            load_recursive(&parent_path, seen)?
        }
        Some(parent) => {
            tracing::warn!(
                "Ignoring package `extends` \"{}\" in {}",
                parent,
                path.display()
            );
            ResolvedTsConfig::default()
        }
        None => ResolvedTsConfig::default(),
    };

    if raw.files.is_some() {
        resolved.files = raw.files;
    }
    if raw.include.is_some() {
        resolved.include = raw.include;
    }
    if raw.exclude.is_some() {
        resolved.exclude = raw.exclude;
    }

    let options = raw.compiler_options;
    if let Some(base_url) = options.base_url {
        resolved.base_url = Some(normalize_path(&dir.join(base_url)));
    }
    if let Some(paths) = options.paths {
        resolved.paths = paths;
        resolved.paths_base = Some(dir.clone());
    }
    if let Some(allow_js) = options.allow_js {
        resolved.allow_js = allow_js;
    }
    if let Some(out_dir) = options.out_dir {
        resolved.out_dir = Some(normalize_path(&dir.join(out_dir)));
    }

    Ok(resolved)
}

/// Removes `//` and `/* */` comments and trailing commas so the text parses as JSON.
pub fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 1;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }

    out
}
