//! Local metadata index stored at `<export_root>/.meta/index.json`.

mod index;
mod types;

pub use index::{MetadataIndex, INDEX_FILE, META_DIR};
pub use types::{AnalysisMeta, ChannelMeta, IndexDocument, MetaError};
