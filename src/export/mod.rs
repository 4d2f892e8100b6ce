//! Markdown export of channel history.

mod cleaner;
mod scanner;
mod types;
mod writer;

pub use cleaner::{clean_text, masked_name, resolve_author};
pub use scanner::{
    parse_export, relative_path, scan_export_dir, scan_file, ExportSummary, ScannedExport, ANALYSIS_SUFFIX,
};
pub use types::{ExportError, ExportMode, WriteOutcome, WriteStatus};
pub use writer::{export_path, format_ts, sanitize_filename, ExportWriter, ATTACHMENTS_DIR};
