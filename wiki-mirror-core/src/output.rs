//! Front matter rendering, file writing and stale sibling reconciliation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::slug::OutputPath;

const FRONT_MATTER_DELIMITER: &str = "---";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to render front matter for {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontMatter {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub sidebar_position: usize,
}

impl FrontMatter {
    /// Index documents take their slug from the directory name, so only
    /// leaves declare it.
    pub fn new(title: impl Into<String>, slug: Option<&str>, is_index: bool, sidebar_position: usize) -> Self {
        Self {
            title: title.into(),
            slug: if is_index { None } else { slug.map(str::to_string) },
            sidebar_position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    /// The file already held exactly this content and was not rewritten.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub status: WriteStatus,
    pub path: PathBuf,
    /// Stale siblings deleted because they declared the same slug.
    pub removed: Vec<PathBuf>,
}

/// `---` / YAML / `---`, a blank line, then the body.
pub fn render_document(front_matter: &FrontMatter, content: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(front_matter)?;
    let mut rendered = format!("{FRONT_MATTER_DELIMITER}\n{yaml}{FRONT_MATTER_DELIMITER}\n\n");
    if !content.is_empty() {
        rendered.push_str(content);
        rendered.push('\n');
    }
    Ok(rendered)
}

/// The YAML header of a markdown file, if it has one.
pub fn parse_front_matter(text: &str) -> Option<serde_yaml::Value> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != FRONT_MATTER_DELIMITER {
        return None;
    }
    let mut yaml = String::new();
    for line in lines {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return serde_yaml::from_str(&yaml).ok();
        }
        yaml.push_str(line);
        yaml.push('\n');
    }
    None
}

fn declared_slug(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    parse_front_matter(&text)?
        .get("slug")?
        .as_str()
        .map(str::to_string)
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("md" | "mdx")
    )
}

/// Deletes markdown files in `dir` (not recursing) that declare `slug` and are
/// not `keep`. Failures are logged and skipped.
pub fn reconcile(dir: &Path, slug: &str, keep: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, dir = %dir.display(), "Could not scan directory for stale siblings");
            }
            return Vec::new();
        }
    };

    let mut removed = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "Could not read directory entry");
                continue;
            }
        };
        if path == keep || !path.is_file() || !is_markdown(&path) {
            continue;
        }
        if declared_slug(&path).as_deref() != Some(slug) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), slug, "Removed stale file declaring the same slug");
                removed.push(path);
            }
            Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove stale file"),
        }
    }
    removed
}

/// Writes one document under `root`, first removing siblings that claim its slug.
pub fn write_document(
    root: &Path,
    output: &OutputPath,
    slug: Option<&str>,
    front_matter: &FrontMatter,
    content: &str,
) -> Result<WriteOutcome, OutputError> {
    let target = root.join(&output.path);
    let rendered = render_document(front_matter, content).map_err(|source| OutputError::Render {
        path: target.clone(),
        source,
    })?;

    let removed = match slug {
        Some(slug) => reconcile(&root.join(output.parent_dir()), slug, &target),
        None => Vec::new(),
    };

    if fs::read_to_string(&target).is_ok_and(|existing| existing == rendered) {
        debug!(path = %target.display(), "Content unchanged, not rewriting");
        return Ok(WriteOutcome {
            status: WriteStatus::Unchanged,
            path: target,
            removed,
        });
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| OutputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&target, rendered).map_err(|source| OutputError::Io {
        path: target.clone(),
        source,
    })?;
    info!(path = %target.display(), title = %front_matter.title, "Wrote document");

    Ok(WriteOutcome {
        status: WriteStatus::Written,
        path: target,
        removed,
    })
}
