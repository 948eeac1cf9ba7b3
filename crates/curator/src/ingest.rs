//! Bulk ingestion of Protocol Buffer API descriptions.
//!
//! Every directory under an ingestion root whose name looks like a version
//! (`v1`, `v2beta1`, ...) is one unit. Its parent path becomes the API id and
//! its `.proto` files are archived into a single `protos.zip` spec.
//!
//! ```text
//! root/google/example/library/v1/library.proto
//!      └──── api: google-example-library ──┘ └ version: v1
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use curator_controller::registry::{ensure, get_optional};
use curator_controller::{RegistryClient, RegistryError};
use curator_protocol::defaults::{CONTENTS_HASH_ANNOTATION, PROTO_ZIP_MIME_TYPE, PROTO_ZIP_SPEC_ID};
use curator_protocol::{Address, ResourceBody, ResourceKind};
use curator_worker::{CancellationToken, PoolConfig, PoolReport, Task, TaskOutcome, WorkerPool};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const VERSION_DIR_PATTERN: &str = "v.*[1-9]+.*";
const PROTO_EXTENSION: &str = "proto";

/// One versioned directory to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoUnit {
    pub root: PathBuf,
    pub path: PathBuf,
    pub api_id: String,
    pub version_id: String,
}

/// Find every version directory under `root`, in path order.
pub fn discover_units(root: &Path) -> Result<Vec<ProtoUnit>> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    let version_dir = Regex::new(VERSION_DIR_PATTERN).context("Invalid version pattern")?;

    let mut units = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !version_dir.is_match(&name) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .context("Failed to compute relative path")?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((version_id, api_segments)) = segments.split_last() else {
            continue;
        };
        if api_segments.is_empty() {
            warn!(path = %entry.path().display(), "Version directory has no API path above it; skipping");
            continue;
        }

        units.push(ProtoUnit {
            root: root.to_path_buf(),
            path: entry.path().to_path_buf(),
            api_id: api_segments.join("-"),
            version_id: version_id.clone(),
        });
    }

    debug!(root = %root.display(), units = units.len(), "Discovered proto units");
    Ok(units)
}

/// Deflated zip of every `.proto` file under `unit`, named relative to
/// `root`. Entries are sorted and carry a fixed timestamp so identical trees
/// produce identical archives.
pub fn zip_protos(unit: &Path, root: &Path) -> Result<Vec<u8>> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    for entry in WalkDir::new(unit) {
        let entry = entry.with_context(|| format!("Failed to walk {}", unit.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(PROTO_EXTENSION) {
            continue;
        }
        let name = path
            .strip_prefix(root)
            .context("Failed to compute relative path")?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let content = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        files.push((name, content));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let timestamp = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .map_err(|_| anyhow::anyhow!("Invalid archive timestamp"))?;
    let options = SimpleFileOptions::default()
        .last_modified_time(timestamp)
        .compression_method(zip::CompressionMethod::Deflated);

    let mut archive = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut archive));
        for (name, content) in &files {
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("Failed to add file to ZIP: {}", name))?;
            zip.write_all(content)
                .with_context(|| format!("Failed to write file content: {}", name))?;
        }
        zip.finish().context("Failed to finalize ZIP archive")?;
    }
    Ok(archive)
}

/// Get-or-create the API, version, and `protos.zip` spec for one unit.
pub struct UploadProtoTask {
    registry: Arc<dyn RegistryClient>,
    project: Address,
    unit: ProtoUnit,
}

impl UploadProtoTask {
    pub fn new(registry: Arc<dyn RegistryClient>, project: Address, unit: ProtoUnit) -> Self {
        Self {
            registry,
            project,
            unit,
        }
    }

    fn spec_parent(&self) -> Result<Address> {
        Ok(self
            .project
            .child(ResourceKind::Api, &self.unit.api_id)?
            .child(ResourceKind::Version, &self.unit.version_id)?)
    }

    async fn archive(&self) -> Result<ResourceBody> {
        let unit = self.unit.path.clone();
        let root = self.unit.root.clone();
        let archive = tokio::task::spawn_blocking(move || zip_protos(&unit, &root))
            .await
            .context("Archive worker failed")??;

        let mut body = ResourceBody::with_contents(PROTO_ZIP_MIME_TYPE, Vec::new());
        body.annotations.insert(
            CONTENTS_HASH_ANNOTATION.to_string(),
            blake3::hash(&archive).to_hex().to_string(),
        );
        body.contents = archive;
        Ok(body)
    }
}

#[async_trait]
impl Task for UploadProtoTask {
    fn describe(&self) -> String {
        format!(
            "{}/apis/{}/versions/{}",
            self.project, self.unit.api_id, self.unit.version_id
        )
    }

    async fn run(&self, _cancel: &CancellationToken) -> Result<TaskOutcome> {
        let registry = self.registry.as_ref();
        let (api, created) = ensure(
            registry,
            Some(&self.project),
            ResourceKind::Api,
            &self.unit.api_id,
            ResourceBody::default(),
        )
        .await
        .with_context(|| format!("Failed to ensure API '{}'", self.unit.api_id))?;
        if created {
            info!(name = %api.name, "Created API");
        }

        let (version, created) = ensure(
            registry,
            Some(&api.name),
            ResourceKind::Version,
            &self.unit.version_id,
            ResourceBody::default(),
        )
        .await
        .with_context(|| format!("Failed to ensure version '{}'", self.unit.version_id))?;
        if created {
            info!(name = %version.name, "Created version");
        }

        let parent = self.spec_parent()?;
        let spec_name = parent.child(ResourceKind::Spec, PROTO_ZIP_SPEC_ID)?;
        if get_optional(registry, &spec_name).await?.is_some() {
            debug!(name = %spec_name, "Spec already exists");
            return Ok(TaskOutcome::Skipped);
        }

        let body = self.archive().await?;
        let size = body.contents.len();
        match registry
            .create(Some(&parent), ResourceKind::Spec, PROTO_ZIP_SPEC_ID, body)
            .await
        {
            Ok(spec) => {
                info!(name = %spec.name, bytes = size, "Created spec");
                Ok(TaskOutcome::Created)
            }
            Err(RegistryError::AlreadyExists(_)) => {
                debug!(name = %spec_name, "Spec created concurrently");
                Ok(TaskOutcome::Skipped)
            }
            Err(err) => Err(err).with_context(|| format!("Failed to create {} ({} bytes)", spec_name, size)),
        }
    }
}

/// Ensure `project` exists, then upload every unit under `roots` through a
/// worker pool.
pub async fn upload_protos(
    registry: Arc<dyn RegistryClient>,
    project: &str,
    roots: &[PathBuf],
    pool: PoolConfig,
    cancel: CancellationToken,
) -> Result<PoolReport> {
    let (project, created) = ensure(
        registry.as_ref(),
        None,
        ResourceKind::Project,
        project,
        ResourceBody::default(),
    )
    .await
    .with_context(|| format!("Failed to ensure project '{}'", project))?;
    if created {
        info!(name = %project.name, "Created project");
    }

    let pool = WorkerPool::new(pool, cancel.child_token());
    let sender = pool.sender()?;
    let mut submitted = 0usize;
    let mut discovery: Result<()> = Ok(());

    'roots: for root in roots {
        let units = match discover_units(root) {
            Ok(units) => units,
            Err(err) => {
                discovery = Err(err);
                break;
            }
        };
        for unit in units {
            let task = UploadProtoTask::new(Arc::clone(&registry), project.name.clone(), unit);
            if let Err(err) = sender.submit(Box::new(task)).await {
                warn!(error = %err, "Stopped submitting uploads");
                break 'roots;
            }
            submitted += 1;
        }
    }
    drop(sender);

    let report = pool.wait().await;
    discovery?;
    info!(submitted, created = report.created, skipped = report.skipped, failed = report.failed, "Upload finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_units_names_apis_from_parents() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "google/example/library/v1/library.proto", "syntax = \"proto3\";");
        write(dir.path(), "google/example/library/v2beta1/library.proto", "syntax = \"proto3\";");
        write(dir.path(), "google/example/docs/README.md", "not a version");
        write(dir.path(), "v1/orphan.proto", "");

        let units = discover_units(dir.path()).unwrap();
        let ids: Vec<(String, String)> = units
            .iter()
            .map(|u| (u.api_id.clone(), u.version_id.clone()))
            .collect();
        assert_eq!(
            ids,
            [
                ("google-example-library".to_string(), "v1".to_string()),
                ("google-example-library".to_string(), "v2beta1".to_string()),
            ]
        );
    }

    #[test]
    fn test_version_pattern_needs_a_nonzero_digit() {
        let re = Regex::new(VERSION_DIR_PATTERN).unwrap();
        assert!(re.is_match("v1"));
        assert!(re.is_match("v1alpha"));
        assert!(re.is_match("release-v2"));
        assert!(!re.is_match("v0"));
        assert!(!re.is_match("docs"));
    }

    #[test]
    fn test_zip_contains_only_protos_relative_to_root() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "acme/pets/v1/pets.proto", "message Pet {}");
        write(dir.path(), "acme/pets/v1/types/common.proto", "message Id {}");
        write(dir.path(), "acme/pets/v1/BUILD.bazel", "");

        let unit = dir.path().join("acme/pets/v1");
        let bytes = zip_protos(&unit, dir.path()).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.clone())).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, ["acme/pets/v1/pets.proto", "acme/pets/v1/types/common.proto"]);

        let mut content = String::new();
        archive
            .by_name("acme/pets/v1/pets.proto")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "message Pet {}");

        // Deterministic across runs.
        assert_eq!(zip_protos(&unit, dir.path()).unwrap(), bytes);
    }
}
