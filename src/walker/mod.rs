
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{RagError, Result};

/// File extensions, without the leading dot, that are indexed
pub const SOURCE_EXTENSIONS: &[&str] = &["go", "py", "js", "ts", "java", "cpp", "c", "h", "hpp", "rs"];

/// Whether a file should be indexed, judged by its extension alone
#[inline]
pub fn is_eligible(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Language tag stored with each chunk: the extension as written, or empty
#[inline]
pub fn language_tag(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walk `root` recursively, yielding eligible source files in file name order.
#[inline]
pub fn source_files(root: &Path) -> SourceFiles {
    debug!("Walking source tree at {}", root.display());
    SourceFiles {
        inner: WalkDir::new(root).sort_by_file_name().into_iter(),
        failed: false,
    }
}

/// Iterator over the eligible files below a root directory.
///
/// The first traversal error is yielded as `Err` and ends the iteration.
pub struct SourceFiles {
    inner: walkdir::IntoIter,
    failed: bool,
}

impl Iterator for SourceFiles {
    type Item = Result<PathBuf>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        for entry in self.inner.by_ref() {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_dir() && is_eligible(entry.path()) {
                        return Some(Ok(entry.into_path()));
                    }
                }
                Err(e) => {
                    warn!("Directory walk failed: {}", e);
                    self.failed = true;
                    return Some(Err(RagError::Walk(e.to_string())));
                }
            }
        }

        None
    }
}
