pub mod manifest;
pub mod overlay;

use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

use crate::resource::{ChildResource, ParentResource};

pub use manifest::ManifestEngine;
pub use overlay::{FieldBinding, Overlay};

#[derive(thiserror::Error, Debug)]
pub enum TemplatingError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid object in {path}: {reason}")]
    InvalidObject { path: PathBuf, reason: String },
    #[error("overlay {overlay} failed: {reason}")]
    Overlay { overlay: String, reason: String },
    #[error("{0}")]
    Other(String),
}

/// Renders the children of a parent. Implementations must be deterministic
/// for identical parent content and engine configuration.
#[cfg_attr(test, automock)]
pub trait TemplatingEngine: Send + Sync {
    fn run(
        &self,
        parent: &ParentResource,
    ) -> Result<Vec<ChildResource>, TemplatingError>;
}

/// Renders nothing.
#[derive(Clone, Debug, Default)]
pub struct NopEngine;

impl TemplatingEngine for NopEngine {
    fn run(
        &self,
        _parent: &ParentResource,
    ) -> Result<Vec<ChildResource>, TemplatingError> {
        Ok(Vec::new())
    }
}
