use std::fmt;
use std::path::{Path, PathBuf};

use crate::io::RemoteKey;

/// Default remote folder holding slide files.
pub const DEFAULT_SLIDE_PREFIX: &str = "slides";

/// Default remote folder holding prediction results.
pub const DEFAULT_RESULTS_PREFIX: &str = "results";

/// File extension of prediction result documents.
pub const PREDICTIONS_VARIANT: &str = "json";

/// The kinds of remote resource that get materialized locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A slide image, keyed by slide id, variant = file extension
    Slide,
    /// A prediction result document, keyed by external inference job id
    Predictions,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Slide => "slide",
            ResourceKind::Predictions => "predictions",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps `(kind, id, variant)` to remote keys and local paths.
///
/// ```text
/// Slide        s3://{bucket}/{slide_prefix}/{id}.{ext}   → {slide_dir}/{id}.{ext}
/// Predictions  s3://{bucket}/{results_prefix}/{id}.json  → {prediction_dir}/{id}.json
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    bucket: String,
    slide_prefix: String,
    results_prefix: String,
    slide_dir: PathBuf,
    prediction_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(
        bucket: impl Into<String>,
        slide_dir: impl Into<PathBuf>,
        prediction_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            slide_prefix: DEFAULT_SLIDE_PREFIX.to_string(),
            results_prefix: DEFAULT_RESULTS_PREFIX.to_string(),
            slide_dir: slide_dir.into(),
            prediction_dir: prediction_dir.into(),
        }
    }

    pub fn with_prefixes(
        mut self,
        slide_prefix: impl Into<String>,
        results_prefix: impl Into<String>,
    ) -> Self {
        self.slide_prefix = slide_prefix.into();
        self.results_prefix = results_prefix.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn local_dir(&self, kind: ResourceKind) -> &Path {
        match kind {
            ResourceKind::Slide => &self.slide_dir,
            ResourceKind::Predictions => &self.prediction_dir,
        }
    }

    fn remote_prefix(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Slide => &self.slide_prefix,
            ResourceKind::Predictions => &self.results_prefix,
        }
    }

    /// Local path the resource is materialized to.
    pub fn local_path(&self, kind: ResourceKind, id: &str, variant: &str) -> PathBuf {
        self.local_dir(kind).join(format!("{id}.{variant}"))
    }

    /// Remote object the resource is fetched from.
    pub fn remote_key(&self, kind: ResourceKind, id: &str, variant: &str) -> RemoteKey {
        let prefix = self.remote_prefix(kind).trim_end_matches('/');
        let key = if prefix.is_empty() {
            format!("{id}.{variant}")
        } else {
            format!("{prefix}/{id}.{variant}")
        };
        RemoteKey::new(&self.bucket, key)
    }
}

/// Key under which concurrent materializations of the same resource coalesce.
pub fn coordination_key(kind: ResourceKind, id: &str, variant: &str) -> String {
    format!("{kind}_{id}_{variant}")
}

/// A resource id or variant must be a single, ordinary path component.
pub fn is_plain_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}
