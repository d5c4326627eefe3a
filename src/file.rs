//! File handling for armor and unarmor runs.
//!
//! Output is never written in place: a temporary file is created next to the
//! destination and renamed over it only after the whole stream succeeded.
//! Armored output names come from a template whose placeholders are filled
//! in once the content hash is known:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{year}` | four-digit year |
//! | `{month}` | two-digit month |
//! | `{day}` | two-digit day |
//! | `{hash}` | BLAKE3 of the armored bytes, hex |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, ensure};
use chrono::{Datelike, NaiveDate};
use fast_glob::glob_match;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{DEFAULT_OUTPUT_TEMPLATE, FILE_EXTENSION};

const PLACEHOLDERS: &[&str] = &["{year}", "{month}", "{day}", "{hash}"];

/// A path plus the metadata the workers need from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn size(&self) -> Result<u64> {
        let meta = tokio::fs::metadata(&self.path).await.with_context(|| format!("failed to get metadata: {}", self.path.display()))?;
        ensure!(meta.is_file(), "not a regular file: {}", self.path.display());
        Ok(meta.len())
    }

    pub async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await.with_context(|| format!("failed to open: {}", self.path.display()))
    }

    pub fn open_blocking(&self) -> Result<fs::File> {
        fs::File::open(&self.path).with_context(|| format!("failed to open: {}", self.path.display()))
    }

    /// Default destination for unarmoring: the input without its `.armor` suffix.
    pub fn unarmored_path(&self) -> PathBuf {
        let name = self.path.to_string_lossy();
        match name.strip_suffix(FILE_EXTENSION) {
            Some(stem) if !stem.is_empty() && !stem.ends_with(std::path::MAIN_SEPARATOR) => PathBuf::from(stem),
            _ => PathBuf::from(format!("{name}.out")),
        }
    }
}

/// Where armored output goes: a directory and a file name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub template: String,
}

impl OutputTarget {
    /// Interprets `-o`: nothing or a directory means the default template in that directory.
    pub fn resolve(output: Option<&str>, input: &Path) -> Self {
        let fallback_dir = || input.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let Some(output) = output else {
            return Self { dir: fallback_dir(), template: DEFAULT_OUTPUT_TEMPLATE.to_owned() };
        };

        let path = Path::new(output);
        if output.ends_with(std::path::MAIN_SEPARATOR) || path.is_dir() {
            return Self { dir: path.to_path_buf(), template: DEFAULT_OUTPUT_TEMPLATE.to_owned() };
        }

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let template = path.file_name().map_or_else(|| DEFAULT_OUTPUT_TEMPLATE.to_owned(), |n| n.to_string_lossy().into_owned());
        Self { dir, template }
    }

    pub fn render(&self, hash: &str, date: NaiveDate) -> PathBuf {
        self.dir.join(render_template(&self.template, hash, date))
    }

    #[inline]
    pub fn is_templated(&self) -> bool {
        PLACEHOLDERS.iter().any(|p| self.template.contains(p))
    }
}

/// Fills the date and hash placeholders of `template`.
pub fn render_template(template: &str, hash: &str, date: NaiveDate) -> String {
    template.replace("{year}", &format!("{:04}", date.year())).replace("{month}", &format!("{:02}", date.month())).replace("{day}", &format!("{:02}", date.day())).replace("{hash}", hash)
}

/// Glob that matches every name `template` can render to.
pub fn template_glob(template: &str) -> String {
    PLACEHOLDERS.iter().fold(template.to_owned(), |glob, p| glob.replace(p, "*"))
}

/// Creates the temporary file output is staged in.
pub fn staging_file(dir: &Path) -> Result<NamedTempFile> {
    NamedTempFile::new_in(dir).with_context(|| format!("failed to create temporary file in {}", dir.display()))
}

/// Moves a finished temporary file into place.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn persist(staged: NamedTempFile, target: &Path, force: bool) -> Result<()> {
    if force {
        staged.persist(target).with_context(|| format!("failed to write {}", target.display()))?;
    } else {
        ensure!(!target.exists(), "output already exists: {} (use --force to overwrite)", target.display());
        staged.persist_noclobber(target).with_context(|| format!("failed to write {}", target.display()))?;
    }

    debug!(path = %target.display(), "output persisted");
    Ok(())
}

/// Deletes all but the `keep` newest files in `dir` whose names match `template`.
///
/// Returns the deleted paths, oldest last.
pub fn prune(dir: &Path, template: &str, keep: usize) -> Result<Vec<PathBuf>> {
    let glob = template_glob(template);
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !glob_match(&glob, name) || !entry.file_type()?.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, entry.path()));
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = Vec::new();
    for (_, path) in candidates.into_iter().skip(keep) {
        fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        info!(path = %path.display(), "pruned old archive");
        removed.push(path);
    }

    Ok(removed)
}
