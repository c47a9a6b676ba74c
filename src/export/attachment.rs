//! Write attachments to disk without ever overwriting an existing file.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MailgrabError, Result};

/// Longest filename we keep, in bytes. Leaves room under the usual
/// 255-byte limit for a `_<n>` collision suffix.
const MAX_FILENAME_BYTES: usize = 200;

/// Extensions longer than this are treated as part of the stem when truncating.
const MAX_EXTENSION_BYTES: usize = 16;

/// Make an attachment filename safe to join onto the output directory.
///
/// Path separators, control characters and characters Windows refuses in
/// filenames become `_`; names that would resolve to the directory itself
/// (`""`, `"."`, `".."`) become `"attachment"`. Over-long names lose the end
/// of their stem, never their extension. Ordinary names such as
/// `"Receipt 0042.pdf"` are left alone.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => "attachment".to_string(),
        _ => truncate_filename(sanitized),
    }
}

fn truncate_filename(name: String) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name;
    }

    let extension = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= MAX_EXTENSION_BYTES)
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let stem = &name[..name.len() - extension.len()];
    let budget = MAX_FILENAME_BYTES - extension.len();
    format!("{}{extension}", truncate_on_char_boundary(stem, budget))
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Pick a path for `filename` inside `directory` that does not exist yet.
///
/// Starts with `directory/filename`; on collision inserts `_1`, `_2`, …
/// before the extension (`invoice.pdf` → `invoice_1.pdf`), re-checking the
/// live directory each time. A name without an extension just gets the
/// suffix (`README` → `README_1`).
pub fn resolve_path(filename: &str, directory: &Path) -> PathBuf {
    first_free(filename, directory, occupied)
}

fn first_free(filename: &str, directory: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let original = directory.join(filename);
    if !taken(&original) {
        return original;
    }

    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    (1u64..)
        .map(|n| match &ext {
            Some(ext) => directory.join(format!("{stem}_{n}.{ext}")),
            None => directory.join(format!("{stem}_{n}")),
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or(original)
}

/// The destination directory for one scan.
///
/// Every path handed out is remembered, so a path is never produced twice
/// in a run even when nothing is written (dry run) or a write failed.
#[derive(Debug)]
pub struct OutputDir {
    root: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            claimed: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sanitize `filename` and reserve a free path for it.
    pub fn claim(&mut self, filename: &str) -> PathBuf {
        let name = sanitize_filename(filename);
        let claimed = &self.claimed;
        let path = first_free(&name, &self.root, |p| occupied(p) || claimed.contains(p));
        self.claimed.insert(path.clone());
        path
    }
}

/// Any directory entry counts, including a dangling symlink.
fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Write `data` to a new file at `path`. Fails if the file already exists.
pub fn write_attachment(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MailgrabError::io(path, e))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|e| MailgrabError::io(path, e))
}
