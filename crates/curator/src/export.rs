//! CSV export of specs under version addresses.

use anyhow::{bail, Context, Result};
use curator_controller::registry::list_all;
use curator_controller::RegistryClient;
use curator_protocol::defaults::REGISTRY_ADDRESS_VAR;
use curator_protocol::{Pattern, PatternKind, Resource, ResourceKind};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, warn};

pub const CSV_HEADER: [&str; 4] = ["api_id", "version_id", "spec_id", "contents_path"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub api_id: String,
    pub version_id: String,
    pub spec_id: String,
    pub contents_path: String,
}

impl ExportRow {
    fn from_spec(spec: &Resource) -> Option<Self> {
        let name = &spec.name;
        if name.kind() != ResourceKind::Spec {
            return None;
        }
        Some(Self {
            api_id: name.component(ResourceKind::Api)?.to_string(),
            version_id: name.component(ResourceKind::Version)?.to_string(),
            spec_id: name.id().to_string(),
            contents_path: format!("{}/{}/contents", REGISTRY_ADDRESS_VAR, name.without_revision()),
        })
    }
}

/// Parse a parent argument; it must name versions (wildcards allowed).
pub fn version_parent(parent: &str) -> Result<Pattern> {
    let pattern = Pattern::parse(parent).with_context(|| format!("invalid parent argument '{}'", parent))?;
    if pattern.kind() != PatternKind::Resource(ResourceKind::Version) {
        bail!(
            "invalid parent argument '{}': must be a version such as projects/<p>/apis/<a>/versions/<v>",
            parent
        );
    }
    Ok(pattern)
}

/// Collect one row per spec under every parent.
pub async fn collect_rows(
    registry: &dyn RegistryClient,
    parents: &[Pattern],
    filter: &str,
    page_size: usize,
) -> Result<Vec<ExportRow>> {
    let mut rows = Vec::new();
    for parent in parents {
        let specs = Pattern::parse(&format!("{}/specs/-", parent))?;
        let listed = list_all(registry, &specs, filter, page_size)
            .await
            .with_context(|| format!("Failed to list specs under {}", parent))?;
        for spec in &listed {
            match ExportRow::from_spec(spec) {
                Some(row) => rows.push(row),
                None => warn!(name = %spec.name, "Cannot derive spec row; skipping"),
            }
        }
        debug!(parent = %parent, specs = listed.len(), "Listed specs for export");
    }
    Ok(rows)
}

/// Write the header and one row per spec. Returns the number of rows.
pub async fn export_csv<W: Write>(
    registry: &dyn RegistryClient,
    parents: &[Pattern],
    filter: &str,
    page_size: usize,
    out: W,
) -> Result<usize> {
    let rows = collect_rows(registry, parents, filter, page_size).await?;

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER).context("Failed to write CSV header")?;
    for row in &rows {
        writer
            .write_record([&row.api_id, &row.version_id, &row.spec_id, &row.contents_path])
            .with_context(|| format!("Failed to write CSV row for {}", row.spec_id))?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parent_rejects_other_kinds() {
        assert!(version_parent("projects/p/apis/a/versions/v").is_ok());
        assert!(version_parent("projects/p/apis/-/versions/-").is_ok());

        let err = version_parent("projects/p/apis/a").unwrap_err();
        assert!(err.to_string().contains("must be a version"));
        assert!(version_parent("projects/p/apis/a/versions").is_err());
        assert!(version_parent("not a name").is_err());
    }
}
