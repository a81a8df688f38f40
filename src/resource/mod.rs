//! Resource materialization layer.
//!
//! Slides and prediction results live in a remote object store but are
//! consumed from local disk. This module maps resources to their remote and
//! local locations ([`StorageLayout`]) and performs single-flight downloads
//! ([`ResourceMaterializer`]).

mod layout;
mod materializer;

pub use layout::{
    coordination_key, is_plain_component, ResourceKind, StorageLayout, DEFAULT_RESULTS_PREFIX,
    DEFAULT_SLIDE_PREFIX, PREDICTIONS_VARIANT,
};
pub use materializer::ResourceMaterializer;
