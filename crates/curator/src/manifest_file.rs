//! Manifest files and manifest artifacts.
//!
//! Manifests are written as YAML (JSON is accepted too) and stored in the
//! registry as JSON artifacts under their project.

use anyhow::{bail, Context, Result};
use curator_controller::registry::get_optional;
use curator_controller::{Manifest, ManifestDocument, RegistryClient};
use curator_protocol::defaults::MANIFEST_MIME_TYPE;
use curator_protocol::{is_valid_id, Address, Resource, ResourceBody, ResourceKind};
use std::fs;
use std::path::Path;
use tracing::info;

pub fn read_manifest_document(path: &Path) -> Result<ManifestDocument> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

/// Validate `doc` and store it as `projects/<project>/artifacts/<name>`.
///
/// `project` replaces the document's own project when given.
pub async fn upload_manifest(
    registry: &dyn RegistryClient,
    mut doc: ManifestDocument,
    project: Option<&str>,
) -> Result<Resource> {
    if let Some(project) = project {
        doc.project = project.to_string();
    }
    Manifest::from_document(&doc)?;
    if !is_valid_id(&doc.name) {
        bail!("manifest name '{}' is not a valid artifact id", doc.name);
    }

    let name = Address::project(&doc.project)?.child(ResourceKind::Artifact, &doc.name)?;
    let contents = serde_json::to_vec_pretty(&doc).context("Failed to encode manifest")?;
    let stored = registry
        .set_artifact(&name, ResourceBody::with_contents(MANIFEST_MIME_TYPE, contents))
        .await
        .with_context(|| format!("Failed to store manifest {}", name))?;
    info!(name = %stored.name, rules = doc.rules.len(), "Uploaded manifest");
    Ok(stored)
}

/// Load a manifest from a file, or from a manifest artifact when `source`
/// is a registry address rather than an existing path.
pub async fn load_manifest(registry: &dyn RegistryClient, source: &str) -> Result<Manifest> {
    let path = Path::new(source);
    let doc = if path.exists() {
        read_manifest_document(path)?
    } else {
        let address = Address::parse(source)
            .with_context(|| format!("'{}' is neither a file nor a registry address", source))?;
        let artifact = get_optional(registry, &address)
            .await?
            .with_context(|| format!("Manifest not found: {}", address))?;
        if artifact.mime_type != MANIFEST_MIME_TYPE {
            bail!("{} is not a manifest (mime type '{}')", address, artifact.mime_type);
        }
        serde_json::from_slice(&artifact.contents)
            .with_context(|| format!("Failed to decode manifest artifact {}", address))?
    };
    Ok(Manifest::from_document(&doc)?)
}
