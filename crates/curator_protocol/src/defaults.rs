//! Canonical default values shared by the controller, the pool, and the CLI.

pub const DEFAULT_WORKERS: usize = 32;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Annotation holding the RFC 3339 revision a derived artifact was built from.
pub const SOURCE_REVISION_ANNOTATION: &str = "curator.dev/source-revision";

pub const MANIFEST_MIME_TYPE: &str = "application/json;type=curator.v1.Manifest";
pub const PROTO_ZIP_MIME_TYPE: &str = "application/x.protobuf+zip";
pub const PROTO_ZIP_SPEC_ID: &str = "protos.zip";
/// blake3 hex digest of an uploaded archive.
pub const CONTENTS_HASH_ANNOTATION: &str = "curator.dev/contents-hash";

/// Placeholder for the registry endpoint in exported contents paths.
pub const REGISTRY_ADDRESS_VAR: &str = "$REGISTRY_ADDRESS";

pub const DEFAULT_ACTION_PROGRAM: &str = "curator-action";
pub const CANCELLED_BY_USER_MESSAGE: &str = "Cancelled by user";
