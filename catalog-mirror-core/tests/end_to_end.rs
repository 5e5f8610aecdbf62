//! End-to-end coverage of the six concrete scenarios from the design's
//! worked examples: a fixture extractor stands in for a registry pull, a
//! no-op mirrorer stands in for the copier, and the orchestrator is driven
//! exactly as the CLI would drive it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use catalog_mirror_core::extract::{Cancellation, DatabaseExtractor, ImageMirrorer};
use catalog_mirror_core::options::Options;
use catalog_mirror_core::orchestrator::Orchestrator;
use catalog_mirror_core::{MirrorPlan, Result, TypedImageReference};
use rusqlite::Connection;

struct FixtureExtractor {
    db_path: PathBuf,
}

impl DatabaseExtractor for FixtureExtractor {
    fn extract(
        &self,
        _from: &TypedImageReference,
        _from_inside_path: &str,
        _cancel: &Cancellation,
    ) -> Result<PathBuf> {
        Ok(self.db_path.clone())
    }
}

#[derive(Default)]
struct RecordingMirrorer {
    plans_seen: Mutex<Vec<MirrorPlan>>,
}

impl ImageMirrorer for RecordingMirrorer {
    fn mirror(&self, plan: &MirrorPlan, _cancel: &Cancellation) -> Result<()> {
        self.plans_seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(plan.clone());
        Ok(())
    }
}

fn seeded_catalog(images: &[&str]) -> tempfile::TempPath {
    let file = tempfile::NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    conn.execute_batch(
        "CREATE TABLE related_image (image TEXT);
         CREATE TABLE operatorbundle (bundlepath TEXT, name TEXT);",
    )
    .unwrap();
    for image in images {
        conn.execute("INSERT INTO related_image (image) VALUES (?1)", [image])
            .unwrap();
    }
    drop(conn);
    file.into_temp_path()
}

fn run(
    images: &[&str],
    source: &str,
    dest: &str,
    max_path_components: i64,
) -> (MirrorPlan, catalog_mirror_core::orchestrator::AggregateError) {
    let db_path = seeded_catalog(images).to_path_buf();
    let manifest_dir = tempfile::tempdir().unwrap();

    let options = Options {
        source: source.to_owned(),
        dest: dest.to_owned(),
        manifest_dir: manifest_dir.path().to_string_lossy().into_owned(),
        max_path_components,
        policy_scope: catalog_mirror_core::artifact::PolicyScope::Repository,
        image_mirrorer: Some(Arc::new(RecordingMirrorer::default())),
        database_extractor: Some(Arc::new(FixtureExtractor { db_path })),
    };
    let orchestrator = Orchestrator::new(options).unwrap();
    orchestrator.mirror(&Cancellation::new())
}

#[test]
fn scenario_1_maps_related_and_bundle_images_to_registry_destination() {
    let digest = "sha256:".to_owned() + &"d".repeat(64);
    let (plan, aggregate) = run(
        &[
            &format!("quay.io/coreos/etcd-operator@{digest}"),
            "quay.io/test/etcd.0.9.0:latest",
        ],
        "quay.io/example/image:tag",
        "localhost:5000",
        2,
    );
    assert!(aggregate.is_empty());

    let etcd_operator = plan
        .iter()
        .find(|(k, _)| k.reference.name == "etcd-operator")
        .unwrap()
        .1;
    assert!(etcd_operator.reference.to_string().starts_with("localhost:5000/coreos/etcd-operator:"));
    assert_eq!(etcd_operator.reference.id.as_ref().unwrap().to_string(), digest);

    let etcd_bundle = plan
        .iter()
        .find(|(k, _)| k.reference.name == "etcd.0.9.0")
        .unwrap()
        .1;
    assert_eq!(etcd_bundle.reference.to_string(), "localhost:5000/test/etcd.0.9.0:latest");
}

#[test]
fn scenario_2_maps_into_single_registry_namespace() {
    let digest = "sha256:".to_owned() + &"e".repeat(64);
    let (plan, aggregate) = run(
        &[&format!("quay.io/coreos/etcd-operator@{digest}")],
        "quay.io/example/image:tag",
        "localhost:5000/org",
        2,
    );
    assert!(aggregate.is_empty());

    let value = plan
        .iter()
        .find(|(k, _)| k.reference.name == "etcd-operator")
        .unwrap()
        .1;
    assert_eq!(value.reference.namespace, "org");
    assert_eq!(value.reference.name, "coreos-etcd-operator");
}

#[test]
fn scenario_3_untagged_nested_destination_no_budget() {
    let (plan, aggregate) = run(
        &["docker.io/my/image"],
        "docker.io/other/catalog:latest",
        "quay.io/my-org/sub-org",
        0,
    );
    assert!(aggregate.is_empty());

    let value = plan.iter().find(|(k, _)| k.reference.name == "image").unwrap().1;
    assert_eq!(value.reference.to_string(), "quay.io/my-org/sub-org/my/image:latest");
}

#[test]
fn scenario_4_digest_only_nested_destination_budget_three() {
    let digest = "sha256:".to_owned() + &"1".repeat(64);
    let (plan, aggregate) = run(
        &[&format!("docker.io/my/image@{digest}")],
        "docker.io/other/catalog:latest",
        "quay.io/my-org/sub-org",
        3,
    );
    assert!(aggregate.is_empty());

    let value = plan.iter().find(|(k, _)| k.reference.name == "image").unwrap().1;
    assert_eq!(value.reference.namespace, "my-org");
    assert_eq!(value.reference.name, "sub-org/my-image");
    assert_eq!(value.reference.id.as_ref().unwrap().to_string(), digest);
    assert!(value.reference.tag.is_some());
}

#[test]
fn scenario_5_policy_output_for_mixed_tagged_and_digested_inputs() {
    let digest = "sha256:".to_owned() + &"d".repeat(64);
    let manifest_dir = tempfile::tempdir().unwrap();

    let images = &[
        "quay.io/halkyonio/operator:v0.1.8",
        &format!("docker.io/strimzi/operator@{digest}"),
    ];
    let db_path = seeded_catalog(images).to_path_buf();

    let options = Options {
        source: "quay.io/example/catalog:v1".to_owned(),
        dest: "quay.io/olmtest".to_owned(),
        manifest_dir: manifest_dir.path().to_string_lossy().into_owned(),
        max_path_components: 2,
        policy_scope: catalog_mirror_core::artifact::PolicyScope::Repository,
        image_mirrorer: Some(Arc::new(RecordingMirrorer::default())),
        database_extractor: Some(Arc::new(FixtureExtractor { db_path })),
    };
    let orchestrator = Orchestrator::new(options).unwrap();
    let (_, aggregate) = orchestrator.mirror(&Cancellation::new());
    assert!(aggregate.is_empty());

    let policy = std::fs::read_to_string(manifest_dir.path().join("imageContentSourcePolicy.yaml")).unwrap();
    assert!(policy.contains("docker.io/strimzi/operator"));
    assert!(!policy.contains("halkyonio"));
}

#[test]
fn scenario_6_registry_scoped_policy() {
    let digest = "sha256:".to_owned() + &"d".repeat(64);
    let manifest_dir = tempfile::tempdir().unwrap();
    let images = &[&format!("docker.io/strimzi/operator@{digest}")[..]];
    let db_path = seeded_catalog(images).to_path_buf();

    let options = Options {
        source: "quay.io/example/catalog:v1".to_owned(),
        dest: "quay.io/olmtest".to_owned(),
        manifest_dir: manifest_dir.path().to_string_lossy().into_owned(),
        max_path_components: 2,
        policy_scope: catalog_mirror_core::artifact::PolicyScope::Registry,
        image_mirrorer: Some(Arc::new(RecordingMirrorer::default())),
        database_extractor: Some(Arc::new(FixtureExtractor { db_path })),
    };
    let orchestrator = Orchestrator::new(options).unwrap();
    let (_, aggregate) = orchestrator.mirror(&Cancellation::new());
    assert!(aggregate.is_empty());

    let policy = std::fs::read_to_string(manifest_dir.path().join("imageContentSourcePolicy.yaml")).unwrap();
    assert!(policy.contains("source: docker.io"));
    assert!(policy.contains("quay.io"));
    assert!(!policy.contains("strimzi"));
}

#[test]
fn mapping_file_and_self_mirror_are_present() {
    let (plan, aggregate) = run(&["quay.io/a/b:v1"], "quay.io/example/catalog:v1", "localhost:5000", 2);
    assert!(aggregate.is_empty());
    assert!(plan.keys().any(|k| k.reference.name == "catalog"));
}
