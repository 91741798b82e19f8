use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::Result;
use crate::languages::LanguageRegistry;
use crate::workspace::ProjectDescriptor;

pub struct FileWalker {
    registry: LanguageRegistry,
}

impl FileWalker {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    /// Lists the project's source files in a stable, sorted order.
    pub fn walk(&self, project: &ProjectDescriptor) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(&project.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() || !self.is_supported(path) {
                continue;
            }
            if LanguageRegistry::is_javascript(path) && !project.compiler.allow_js {
                continue;
            }
            if project.contains(&project.relative(path)) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.get_for_file(path).is_some()
    }

    pub fn get_language(&self, path: &Path) -> Option<String> {
        self.registry.get_for_file(path).map(|g| g.name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_walker() -> FileWalker {
        FileWalker::new(LanguageRegistry::new())
    }

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn names(project: &ProjectDescriptor, files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|f| project.relative(f)).collect()
    }

    #[test]
    fn test_walk_finds_typescript_files_sorted() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "src/b.tsx", "export default () => null;");
        create_file(temp_dir.path(), "src/a.ts", "const x = 1;");
        create_file(temp_dir.path(), "index.ts", "export {};");

        let project = ProjectDescriptor::for_directory(temp_dir.path());
        let files = create_walker().walk(&project).unwrap();

        assert_eq!(names(&project, &files), vec!["index.ts", "src/a.ts", "src/b.tsx"]);
    }

    #[test]
    fn test_walk_skips_javascript_without_allow_js() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app.ts", "");
        create_file(temp_dir.path(), "legacy.js", "function old() {}");

        let mut project = ProjectDescriptor::for_directory(temp_dir.path());
        let files = create_walker().walk(&project).unwrap();
        assert_eq!(names(&project, &files), vec!["app.ts"]);

        project.compiler.allow_js = true;
        let files = create_walker().walk(&project).unwrap();
        assert_eq!(names(&project, &files), vec!["app.ts", "legacy.js"]);
    }

    #[test]
    fn test_walk_applies_include_exclude_and_node_modules() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "src/App.tsx", "");
        create_file(temp_dir.path(), "src/App.test.tsx", "");
        create_file(temp_dir.path(), "scripts/build.ts", "");
        create_file(temp_dir.path(), "src/node_modules/pkg/index.ts", "");

        let mut project = ProjectDescriptor::for_directory(temp_dir.path());
        project.include = vec!["src".to_string()];
        project.exclude = vec!["**/*.test.tsx".to_string()];

        let files = create_walker().walk(&project).unwrap();
        assert_eq!(names(&project, &files), vec!["src/App.tsx"]);
    }

    #[test]
    fn test_walk_ignores_unsupported_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "main.ts", "");
        create_file(temp_dir.path(), "README.md", "# Readme");
        create_file(temp_dir.path(), "data.json", "{}");

        let project = ProjectDescriptor::for_directory(temp_dir.path());
        let files = create_walker().walk(&project).unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_walk_hidden_files_ignored() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "visible.ts", "");
        create_file(temp_dir.path(), ".hidden.ts", "");

        let project = ProjectDescriptor::for_directory(temp_dir.path());
        let files = create_walker().walk(&project).unwrap();

        assert_eq!(names(&project, &files), vec!["visible.ts"]);
    }

    #[test]
    fn test_walk_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let project = ProjectDescriptor::for_directory(temp_dir.path());
        assert!(create_walker().walk(&project).unwrap().is_empty());
    }

    #[test]
    fn test_get_language() {
        let walker = create_walker();
        assert_eq!(walker.get_language(Path::new("app.ts")), Some("typescript".to_string()));
        assert_eq!(walker.get_language(Path::new("app.tsx")), Some("tsx".to_string()));
        assert_eq!(walker.get_language(Path::new("app.jsx")), Some("tsx".to_string()));
        assert_eq!(walker.get_language(Path::new("file.txt")), None);
    }
}
