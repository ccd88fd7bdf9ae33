use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Extensions the index pipeline accepts. The size estimator applies the
/// same filter so its pre-index estimate matches what a scan would visit.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cc", "cs",
    "rb", "php", "swift", "scala", "lua", "sh", "sql", "html", "css", "vue", "svelte", "md",
    "json", "yaml", "yml", "toml",
];

/// Directory names skipped regardless of gitignore contents.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".semindex",
    "target",
    "node_modules",
    "dist",
    "build",
    "out",
    "vendor",
];

/// Gitignore-aware file lister shared by the estimator and probing code.
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// List all indexable files under the root, honoring `.gitignore` and
    /// the allowed-extension filter. Ordering is deterministic.
    #[must_use]
    pub fn scan(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .require_git(false)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !IGNORED_DIRS.iter().any(|dir| name.eq_ignore_ascii_case(dir))
            })
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(ignore::DirEntry::into_path)
            .filter(|path| has_allowed_extension(path))
            .collect();
        files.sort();
        files
    }
}

/// Quick relevance check for watcher events: inside the root, not under an
/// ignored directory, and carrying an indexable extension.
#[must_use]
pub fn is_relevant_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let under_ignored = relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        IGNORED_DIRS.iter().any(|dir| name.eq_ignore_ascii_case(dir))
    });
    !under_ignored && has_allowed_extension(path)
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
}
