//! Curator - operator commands over an API registry.
//!
//! Shared functionality for the `curator` binary: the registry session,
//! bulk proto ingestion, manifest upload, labelling, and CSV export.

pub mod export;
pub mod ingest;
pub mod labels;
pub mod manifest_file;
pub mod session;

pub use export::{export_csv, ExportRow};
pub use ingest::{discover_units, upload_protos, zip_protos, ProtoUnit, UploadProtoTask};
pub use labels::{relabel, LabelSummary};
pub use manifest_file::{load_manifest, read_manifest_document, upload_manifest};
pub use session::Session;
