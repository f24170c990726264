//! Image lists: sources, formats and their manager

pub mod hepix;
pub mod manager;
pub mod source;
pub mod store;

pub use manager::{FetchFailure, FetchReport, ListManager, SyncSummary};
pub use source::{FetchedList, ImageListSource, ListFormat, SourceDefinition, SourceKind};
pub use store::{SourceMap, SourceStore};

use std::path::{Component, Path};

/// List names and image identifiers become cache paths, so they must be a
/// single normal path component
pub(crate) fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}
