//! Operator commands against the in-memory registry.

use anyhow::Result;
use async_trait::async_trait;
use curator::{export_csv, load_manifest, relabel, upload_manifest, upload_protos, Session};
use curator::export::version_parent;
use curator_controller::manifest::{DependencyDocument, RuleDocument};
use curator_controller::{
    ActionRunner, BasicPredicate, Controller, ControllerConfig, ControllerError, InMemoryRegistry,
    Manifest, ManifestDocument, RegistryClient, RenderedAction,
};
use curator_protocol::defaults::{
    CONTENTS_HASH_ANNOTATION, MANIFEST_MIME_TYPE, PROTO_ZIP_MIME_TYPE, SOURCE_REVISION_ANNOTATION,
};
use curator_protocol::{Address, CuratorConfig, LabelMutation, ResourceBody, ResourceKind};
use curator_worker::{CancellationToken, PoolConfig};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn pool() -> PoolConfig {
    PoolConfig {
        workers: 4,
        queue_capacity: 8,
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn proto_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "google/example/library/v1/library.proto", "service Library {}");
    write(dir.path(), "google/example/library/v2/library.proto", "service Library {}");
    write(dir.path(), "acme/pets/v1/pets.proto", "service Pets {}");
    dir
}

fn mutations(args: &[&str]) -> Vec<LabelMutation> {
    args.iter().map(|a| LabelMutation::parse(a).unwrap()).collect()
}

#[tokio::test]
async fn test_upload_protos_creates_then_skips() {
    let tree = proto_tree();
    let registry = Arc::new(InMemoryRegistry::new());
    let roots = vec![tree.path().to_path_buf()];

    let report = upload_protos(registry.clone(), "demo", &roots, pool(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.created, 3);
    assert_eq!(report.failed, 0);

    let spec = registry
        .get(&Address::parse("projects/demo/apis/google-example-library/versions/v2/specs/protos.zip").unwrap())
        .await
        .unwrap();
    assert_eq!(spec.mime_type, PROTO_ZIP_MIME_TYPE);
    assert_eq!(
        spec.annotations.get(CONTENTS_HASH_ANNOTATION).map(String::as_str),
        Some(blake3::hash(&spec.contents).to_hex().as_str())
    );

    let again = upload_protos(registry.clone(), "demo", &roots, pool(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.skipped, 3);
}

#[tokio::test]
async fn test_upload_protos_rejects_missing_root() {
    let registry = Arc::new(InMemoryRegistry::new());
    let roots = vec![Path::new("/definitely/not/here").to_path_buf()];
    let result = upload_protos(registry, "demo", &roots, pool(), CancellationToken::new()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_manifest_round_trips_through_registry() {
    let registry = InMemoryRegistry::new();
    registry
        .create(None, ResourceKind::Project, "p", ResourceBody::default())
        .await
        .unwrap();

    let doc = ManifestDocument {
        name: "lint".to_string(),
        project: "elsewhere".to_string(),
        rules: vec![RuleDocument {
            resource: "apis/-/versions/-/specs/-/artifacts/lint".to_string(),
            filter: String::new(),
            dependencies: vec![DependencyDocument {
                source: "$resource.spec".to_string(),
                filter: String::new(),
            }],
            action: "compute lint $source0".to_string(),
        }],
    };

    let stored = upload_manifest(&registry, doc, Some("p")).await.unwrap();
    assert_eq!(stored.name.to_string(), "projects/p/artifacts/lint");
    assert_eq!(stored.mime_type, MANIFEST_MIME_TYPE);

    let manifest = load_manifest(&registry, "projects/p/artifacts/lint").await.unwrap();
    assert_eq!(manifest.project, "p");
    assert_eq!(manifest.rules.len(), 1);
}

#[tokio::test]
async fn test_load_manifest_rejects_other_artifacts() {
    let registry = InMemoryRegistry::new();
    registry
        .create(None, ResourceKind::Project, "p", ResourceBody::default())
        .await
        .unwrap();
    let name = Address::parse("projects/p/artifacts/notes").unwrap();
    registry
        .set_artifact(&name, ResourceBody::with_contents("text/plain", b"hello".to_vec()))
        .await
        .unwrap();

    assert!(load_manifest(&registry, "projects/p/artifacts/notes").await.is_err());
    assert!(load_manifest(&registry, "projects/p/artifacts/missing").await.is_err());
}

#[tokio::test]
async fn test_relabel_honours_overwrite() {
    let tree = proto_tree();
    let registry = Arc::new(InMemoryRegistry::new());
    upload_protos(
        registry.clone(),
        "demo",
        &[tree.path().to_path_buf()],
        pool(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let api = Address::parse("projects/demo/apis/acme-pets").unwrap();

    let summary = relabel(registry.as_ref(), "projects/demo/apis/acme-pets", &mutations(&["a=1", "b=2"]), false, 10)
        .await
        .unwrap();
    assert_eq!((summary.matched, summary.changed), (1, 1));

    relabel(registry.as_ref(), "projects/demo/apis/acme-pets", &mutations(&["a=3", "b-"]), true, 10)
        .await
        .unwrap();
    let labels = registry.get(&api).await.unwrap().labels;
    assert_eq!(labels.get("a").map(String::as_str), Some("3"));
    assert!(!labels.contains_key("b"));

    let summary = relabel(registry.as_ref(), "projects/demo/apis/acme-pets", &mutations(&["a=4"]), false, 10)
        .await
        .unwrap();
    assert_eq!(summary.changed, 0);
    let labels = registry.get(&api).await.unwrap().labels;
    assert_eq!(labels.get("a").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn test_relabel_pattern_touches_every_match() {
    let tree = proto_tree();
    let registry = Arc::new(InMemoryRegistry::new());
    upload_protos(
        registry.clone(),
        "demo",
        &[tree.path().to_path_buf()],
        pool(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let summary = relabel(registry.as_ref(), "projects/demo/apis/-", &mutations(&["team=core"]), false, 1)
        .await
        .unwrap();
    assert_eq!((summary.matched, summary.changed), (2, 2));
}

#[tokio::test]
async fn test_export_csv_lists_specs() {
    let tree = proto_tree();
    let registry = Arc::new(InMemoryRegistry::new());
    upload_protos(
        registry.clone(),
        "demo",
        &[tree.path().to_path_buf()],
        pool(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let parents = vec![version_parent("projects/demo/apis/google-example-library/versions/-").unwrap()];
    let mut out = Vec::new();
    let rows = export_csv(registry.as_ref(), &parents, "", 10, &mut out).await.unwrap();
    assert_eq!(rows, 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "api_id,version_id,spec_id,contents_path");
    assert!(lines.contains(
        &"google-example-library,v1,protos.zip,$REGISTRY_ADDRESS/projects/demo/apis/google-example-library/versions/v1/specs/protos.zip/contents"
    ));
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_export_parent_must_be_a_version() {
    assert!(version_parent("projects/demo/apis/-").is_err());
    assert!(version_parent("projects/demo/apis/-/versions/-").is_ok());
}

/// Cancels the whole invocation from inside the first action it runs.
struct CancellingRunner {
    cancel: CancellationToken,
    runs: AtomicUsize,
}

#[async_trait]
impl ActionRunner for CancellingRunner {
    async fn run(&self, _action: &RenderedAction, _cancel: &CancellationToken) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(())
    }
}

#[tokio::test]
async fn test_regenerate_saves_stamps_when_cancelled() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("registry.json");
    let mut config = CuratorConfig::default();
    config.registry.snapshot = Some(snapshot.clone());

    let cancel = CancellationToken::new();
    let session = Session::open(config, cancel.clone()).unwrap();
    let backend = session.backend();
    backend
        .create(None, ResourceKind::Project, "p", ResourceBody::default())
        .await
        .unwrap();
    for i in 0..3 {
        let api = Address::parse(&format!("projects/p/apis/a{}", i)).unwrap();
        backend
            .create(api.parent().as_ref(), ResourceKind::Api, api.id(), ResourceBody::default())
            .await
            .unwrap();
        let version = backend
            .create(Some(&api), ResourceKind::Version, "v", ResourceBody::default())
            .await
            .unwrap();
        let spec = ResourceBody {
            mime_type: "application/x.openapi+gzip;version=3".to_string(),
            ..ResourceBody::default()
        };
        backend
            .create(Some(&version.name), ResourceKind::Spec, "s", spec)
            .await
            .unwrap();
    }

    let manifest = Manifest::from_document(&ManifestDocument {
        name: "lint".to_string(),
        project: "p".to_string(),
        rules: vec![RuleDocument {
            resource: "apis/-/versions/-/specs/-/artifacts/lint".to_string(),
            filter: String::new(),
            dependencies: vec![DependencyDocument {
                source: "$resource.spec".to_string(),
                filter: "mime_type contains 'openapi'".to_string(),
            }],
            action: "lint $source0".to_string(),
        }],
    })
    .unwrap();

    let runner = Arc::new(CancellingRunner {
        cancel: cancel.clone(),
        runs: AtomicUsize::new(0),
    });
    let controller = Controller::new(
        backend,
        Arc::new(BasicPredicate),
        runner.clone(),
        ControllerConfig {
            pool: PoolConfig {
                workers: 1,
                queue_capacity: 1,
            },
            ..ControllerConfig::default()
        },
        cancel,
    );

    let err = session.regenerate(&controller, &manifest).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ControllerError>(),
        Some(ControllerError::Cancelled)
    ));
    assert_eq!(runner.runs.load(Ordering::SeqCst), 1);

    let reloaded = InMemoryRegistry::load(&snapshot).unwrap();
    let mut stamped = 0;
    for i in 0..3 {
        let target = Address::parse(&format!("projects/p/apis/a{}/versions/v/specs/s/artifacts/lint", i)).unwrap();
        if let Ok(artifact) = reloaded.get(&target).await {
            assert!(artifact.annotations.contains_key(SOURCE_REVISION_ANNOTATION));
            stamped += 1;
        }
    }
    assert_eq!(stamped, 1);
}
