//! Serializes a realized [`crate::MirrorPlan`] to `mapping.txt` and a
//! digest-mirror policy document.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::reference::ImageReference;
use crate::{Error, MirrorPlan, Result};

/// Scope at which source/mirror repositories are reduced in the policy
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyScope {
    /// Keep the full repository path (registry/namespace/name).
    #[default]
    Repository,
    /// Collapse each repository to its registry hostname.
    Registry,
}

#[derive(Serialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Serialize)]
struct RepositoryDigestMirror {
    source: String,
    mirrors: Vec<String>,
}

#[derive(Serialize)]
struct ImageContentSourcePolicySpec {
    #[serde(rename = "repositoryDigestMirrors")]
    repository_digest_mirrors: Vec<RepositoryDigestMirror>,
}

#[derive(Serialize)]
struct ImageContentSourcePolicy {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    metadata: ObjectMeta,
    spec: ImageContentSourcePolicySpec,
}

#[derive(Serialize)]
struct ImageDigestMirrorSpec {
    #[serde(rename = "imageDigestMirrors")]
    image_digest_mirrors: Vec<RepositoryDigestMirror>,
}

#[derive(Serialize)]
struct ImageDigestMirrorSet {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    metadata: ObjectMeta,
    spec: ImageDigestMirrorSpec,
}

/// Writes `mapping.txt` and both policy document forms under `manifest_dir`.
///
/// `source_name` becomes `metadata.name` on both policy documents — the
/// name of the source catalog reference the run was given.
///
/// Mirrors step 5/artifact-writing of the orchestrator: best-effort, and
/// every I/O or serialization failure is returned so the caller can
/// accumulate it rather than abort a run that already moved bits.
///
/// # Errors
///
/// Returns [`Error::Artifact`] if the directory cannot be created or a
/// file cannot be written or serialized.
pub fn write_all(manifest_dir: &Path, plan: &MirrorPlan, scope: PolicyScope, source_name: &str) -> Result<()> {
    fs::create_dir_all(manifest_dir)
        .map_err(|e| Error::Artifact(format!("creating {}: {e}", manifest_dir.display())))?;

    write_mapping(manifest_dir, plan)?;
    write_policy_documents(manifest_dir, plan, scope, source_name)
}

fn write_mapping(manifest_dir: &Path, plan: &MirrorPlan) -> Result<()> {
    let mut body = String::new();
    for (src, dst) in plan {
        body.push_str(&src.reference.canonical());
        body.push('=');
        body.push_str(&format_destination(&dst.reference));
        body.push('\n');
    }
    let path = manifest_dir.join("mapping.txt");
    fs::write(&path, body).map_err(|e| Error::Artifact(format!("writing {}: {e}", path.display())))
}

/// Renders a destination reference, dropping the digest when both a tag
/// and a digest are present so the file stays usable with low-level copy
/// tools that address by tag.
fn format_destination(reference: &ImageReference) -> String {
    if reference.tag.is_some() && reference.id.is_some() {
        let mut tag_only = reference.clone();
        tag_only.id = None;
        tag_only.canonical()
    } else {
        reference.canonical()
    }
}

fn write_policy_documents(
    manifest_dir: &Path,
    plan: &MirrorPlan,
    scope: PolicyScope,
    source_name: &str,
) -> Result<()> {
    let rows = digest_mirror_rows(plan, scope);

    let icsp = ImageContentSourcePolicy {
        api_version: "operator.openshift.io/v1alpha1".to_owned(),
        kind: "ImageContentSourcePolicy".to_owned(),
        metadata: ObjectMeta {
            name: source_name.to_owned(),
        },
        spec: ImageContentSourcePolicySpec {
            repository_digest_mirrors: rows.clone(),
        },
    };
    write_yaml(manifest_dir, "imageContentSourcePolicy.yaml", &icsp)?;

    let idms = ImageDigestMirrorSet {
        api_version: "config.openshift.io/v1".to_owned(),
        kind: "ImageDigestMirrorSet".to_owned(),
        metadata: ObjectMeta {
            name: source_name.to_owned(),
        },
        spec: ImageDigestMirrorSpec {
            image_digest_mirrors: rows,
        },
    };
    write_yaml(manifest_dir, "imageDigestMirrorSet.yaml", &idms)
}

fn write_yaml<T: Serialize>(manifest_dir: &Path, file_name: &str, value: &T) -> Result<()> {
    let text =
        serde_yaml::to_string(value).map_err(|e| Error::Artifact(format!("serializing {file_name}: {e}")))?;
    let path = manifest_dir.join(file_name);
    fs::write(&path, text).map_err(|e| Error::Artifact(format!("writing {}: {e}", path.display())))
}

/// Builds the deduplicated, source-repo-sorted digest-mirror rows shared by
/// both policy document forms.
///
/// Only entries whose source carries a digest produce a row; tag-only
/// entries are not pinnable and are dropped. Rows are deduplicated by
/// source repository, keeping every distinct mirror repository seen for
/// that source.
fn digest_mirror_rows(plan: &MirrorPlan, scope: PolicyScope) -> Vec<RepositoryDigestMirror> {
    let mut by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (src, dst) in plan {
        if src.reference.id.is_none() {
            continue;
        }
        let (source_repo, mirror_repo) = match scope {
            PolicyScope::Repository => (
                src.reference.repository().canonical(),
                dst.reference.repository().canonical(),
            ),
            PolicyScope::Registry => (src.reference.registry.clone(), dst.reference.registry.clone()),
        };
        let mirrors = by_source.entry(source_repo).or_default();
        if !mirrors.contains(&mirror_repo) {
            mirrors.push(mirror_repo);
        }
    }

    by_source
        .into_iter()
        .map(|(source, mirrors)| RepositoryDigestMirror { source, mirrors })
        .collect()
}
