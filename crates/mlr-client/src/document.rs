//! Document resolution for model sources and their imports.
//!
//! The compiler identifies documents by `mlr://` urls but resolution is
//! purely by filesystem path relative to the root model's directory. The
//! service sometimes echoes the root document's name as a prefix on
//! import urls (`model.mlr/lib.mlr`); that prefix is stripped before the
//! path lookup.

use std::fs;
use std::path::{Path, PathBuf};

use mlr_protocol::CompileDocument;

use crate::error::{Error, Result};

/// Display scheme used in document urls. Identification only; never used
/// for resolution.
pub const URL_SCHEME: &str = "mlr://";

/// The root model file of a compile session, plus everything needed to
/// resolve import urls the service asks for.
#[derive(Debug, Clone)]
pub struct ModelSource {
    path: PathBuf,
    base_dir: PathBuf,
    source_name: String,
}

impl ModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let source_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::DocumentNotFound(path.clone()))?;
        let base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Ok(Self {
            path,
            base_dir,
            source_name,
        })
    }

    /// File name of the root model, e.g. `flights.mlr`.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the root model document.
    pub fn root_document(&self) -> Result<CompileDocument> {
        self.resolve(&self.source_name)
    }

    /// Load the document behind `url`, relative to the root model's
    /// directory.
    ///
    /// Documents are re-read on every request; the session holds no
    /// document cache across turns. Caching here would be a safe
    /// optimization if reference sets grow large.
    pub fn resolve(&self, url: &str) -> Result<CompileDocument> {
        let relative = if url == self.source_name {
            self.source_name.as_str()
        } else {
            strip_source_prefix(url, &self.source_name)
        };
        let path = self.base_dir.join(relative);
        let content =
            fs::read_to_string(&path).map_err(|_| Error::DocumentNotFound(path.clone()))?;
        Ok(CompileDocument {
            url: format!("{URL_SCHEME}{url}"),
            content,
        })
    }
}

/// Strip a redundant `<source_name>/` prefix the service may have echoed
/// onto an import url.
fn strip_source_prefix<'a>(url: &'a str, source_name: &str) -> &'a str {
    url.strip_prefix(source_name)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(url)
}
