//! A registry-backed [`DatabaseExtractor`] and [`ImageMirrorer`] for the
//! catalog mirroring engine: pulls manifests and layers over HTTP(S) using
//! [`oci_client`], extracts a single well-known path out of a layer
//! tarball, and copies images registry-to-registry.
//!
//! The engine's collaborator traits are synchronous (see
//! `catalog-mirror-core::extract`); this crate bridges that synchronous
//! contract to `oci_client`'s async API with a dedicated single-threaded
//! runtime per collaborator, the way a caller that is not itself async
//! (a plain `fn main`) would.

#![allow(clippy::missing_docs_in_private_items)]

use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;

use catalog_mirror_core::digest::{Algorithm, ImageDigest};
use catalog_mirror_core::extract::{Cancellation, DatabaseExtractor, ImageMirrorer};
use catalog_mirror_core::reference::{DestinationKind, TypedImageReference};
use catalog_mirror_core::{Error, MirrorPlan, Result};
use flate2::read::GzDecoder;
use oci_client::client::ClientConfig;
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference};
use sha2::Digest as _;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const ACCEPTED_LAYER_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.layer.v1.tar+gzip",
    "application/vnd.docker.image.rootfs.diff.tar.gzip",
];

const DEFAULT_MAX_PARALLEL: usize = 4;

/// Builds the `oci_client` config shared by every client this crate creates.
///
/// Sets `platform_resolver` so that pulling a reference which resolves to a
/// manifest index (rather than a single-platform manifest) picks the
/// `linux/amd64` entry instead of failing with "this is a manifest list".
fn client_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.platform_resolver = Some(Box::new(oci_client::client::linux_amd64_resolver));
    config
}

/// Parses a [`TypedImageReference`] into the `oci_client` reference type,
/// rejecting anything that isn't a registry coordinate.
fn oci_reference(typed: &TypedImageReference) -> Result<Reference> {
    if typed.kind != DestinationKind::Registry {
        return Err(Error::Unavailable(format!(
            "{typed} is not a registry reference"
        )));
    }
    typed
        .reference
        .canonical()
        .parse()
        .map_err(|e: oci_client::ParseError| Error::InvalidReference {
            reference: typed.reference.canonical(),
            reason: e.to_string(),
        })
}

/// Pulls catalog images from a registry and extracts a single in-image path.
///
/// Owns one run-scoped [`TempDir`]; a fresh extraction replaces it, and the
/// directory is removed when this extractor (and thus the run that holds
/// it) is dropped.
pub struct RegistryExtractor {
    client: Client,
    auth: RegistryAuth,
    runtime: tokio::runtime::Runtime,
    workdir: Mutex<Option<TempDir>>,
}

impl std::fmt::Debug for RegistryExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryExtractor").finish_non_exhaustive()
    }
}

impl RegistryExtractor {
    /// Builds an extractor using anonymous registry credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the bridging runtime cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_auth(RegistryAuth::Anonymous)
    }

    /// Builds an extractor using the given registry credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the bridging runtime cannot be built.
    pub fn with_auth(auth: RegistryAuth) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Unavailable(format!("building runtime: {e}")))?;
        Ok(Self {
            client: Client::new(client_config()),
            auth,
            runtime,
            workdir: Mutex::new(None),
        })
    }

    async fn extract_async(
        &self,
        from: &TypedImageReference,
        from_inside_path: &str,
        cancel: &Cancellation,
    ) -> Result<PathBuf> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let reference = oci_reference(from)?;
        info!(image = %reference, "pulling manifest and layers");

        let image_data = self
            .client
            .pull(&reference, &self.auth, ACCEPTED_LAYER_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(manifest) = image_data.manifest.as_ref() {
            for (layer, descriptor) in image_data.layers.iter().zip(manifest.layers.iter()) {
                verify_layer_digest(&layer.data, &descriptor.digest)?;
            }
        }

        let wanted = from_inside_path.trim_start_matches('/');
        let mut found: Option<Vec<u8>> = None;

        for layer in image_data.layers.iter().rev() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(bytes) = find_in_layer(&layer.data, wanted)? {
                found = Some(bytes);
                break;
            }
        }

        let Some(bytes) = found else {
            return Err(Error::NotFound {
                path: from_inside_path.to_owned(),
                reference: reference.to_string(),
            });
        };

        let dir = TempDir::new().map_err(Error::Io)?;
        let final_path = dir.path().join("bundles.db");
        let tmp_path = dir.path().join("bundles.db.part");
        std::fs::write(&tmp_path, &bytes).map_err(Error::Io)?;
        std::fs::rename(&tmp_path, &final_path).map_err(Error::Io)?;

        self.workdir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(dir);

        Ok(final_path)
    }
}

/// Hashes `data` against `expected` (an `<algorithm>:<hex>` descriptor
/// digest) and errors if they don't match.
///
/// This is the registry-side half of catching a truncated or tampered
/// transfer: a layer whose bytes don't hash to what the manifest promised
/// is corrupt, the same as a layer whose tar/gzip framing won't parse.
fn verify_layer_digest(data: &[u8], expected: &str) -> Result<()> {
    let digest = ImageDigest::parse(expected)
        .map_err(|e| Error::Corrupt(format!("layer descriptor digest {expected:?}: {e}")))?;
    let computed = match digest.algorithm() {
        Algorithm::Sha256 => hex_encode(sha2::Sha256::digest(data).as_slice()),
        Algorithm::Sha384 => hex_encode(sha2::Sha384::digest(data).as_slice()),
        Algorithm::Sha512 => hex_encode(sha2::Sha512::digest(data).as_slice()),
        _ => {
            return Err(Error::Corrupt(format!(
                "unsupported digest algorithm in {expected:?}"
            )))
        }
    };
    if computed != digest.hex() {
        return Err(Error::Corrupt(format!(
            "layer digest mismatch: descriptor says {expected}, computed {computed}"
        )));
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Searches a single gzip-compressed tar layer for `wanted`, returning its
/// decompressed contents if present.
fn find_in_layer(layer: &[u8], wanted: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(GzDecoder::new(layer));
    let entries = archive.entries().map_err(|e| Error::Corrupt(e.to_string()))?;
    for raw_entry in entries {
        let mut entry = raw_entry.map_err(|e| Error::Corrupt(e.to_string()))?;
        let path = entry.path().map_err(|e| Error::Corrupt(e.to_string()))?;
        let Some(path_str) = path.to_str() else {
            continue;
        };
        if path_str.trim_start_matches("./").trim_start_matches('/') == wanted {
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| Error::Corrupt(e.to_string()))?;
            return Ok(Some(contents));
        }
    }
    Ok(None)
}

impl DatabaseExtractor for RegistryExtractor {
    fn extract(
        &self,
        from: &TypedImageReference,
        from_inside_path: &str,
        cancel: &Cancellation,
    ) -> Result<PathBuf> {
        self.runtime.block_on(self.extract_async(from, from_inside_path, cancel))
    }
}

/// Copies plan entries registry-to-registry using `oci_client`, with a
/// bounded number of concurrent transfers.
///
/// Only registry-to-registry entries are supported; an entry whose source
/// or destination is a `file://`/`s3://` kind is reported as an error
/// rather than silently skipped, since a real copier implementation for
/// those destinations is a distinct, out-of-scope concern (see DESIGN.md).
pub struct RegistryMirrorer {
    client: Client,
    auth: RegistryAuth,
    runtime: tokio::runtime::Runtime,
    max_parallel: usize,
}

impl std::fmt::Debug for RegistryMirrorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryMirrorer")
            .field("max_parallel", &self.max_parallel)
            .finish_non_exhaustive()
    }
}

impl RegistryMirrorer {
    /// Builds a mirrorer using anonymous registry credentials and the
    /// default parallelism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the bridging runtime cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_auth(RegistryAuth::Anonymous, DEFAULT_MAX_PARALLEL)
    }

    /// Builds a mirrorer with explicit credentials and transfer parallelism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the bridging runtime cannot be built.
    pub fn with_auth(auth: RegistryAuth, max_parallel: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Unavailable(format!("building runtime: {e}")))?;
        Ok(Self {
            client: Client::new(client_config()),
            auth,
            runtime,
            max_parallel: max_parallel.max(1),
        })
    }

    async fn copy_one(client: Client, auth: RegistryAuth, src: TypedImageReference, dst: TypedImageReference) -> Result<()> {
        let src_ref = oci_reference(&src)?;
        let dst_ref = oci_reference(&dst)?;

        debug!(src = %src_ref, dst = %dst_ref, "copying manifest and layers");

        let image_data = client
            .pull(&src_ref, &auth, ACCEPTED_LAYER_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        client
            .push(&dst_ref, &image_data, &auth)
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn mirror_async(&self, plan: &MirrorPlan, cancel: &Cancellation) -> Result<()> {
        let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(self.max_parallel));
        let mut join_set = tokio::task::JoinSet::new();

        for (src, dst) in plan {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if src.kind != DestinationKind::Registry || dst.kind != DestinationKind::Registry {
                return Err(Error::Unavailable(format!(
                    "unsupported destination kind for {src} -> {dst}"
                )));
            }

            let semaphore = std::sync::Arc::clone(&semaphore);
            let client = self.client.clone();
            let auth = self.auth.clone();
            let src = src.clone();
            let dst = dst.clone();
            join_set.spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let result = Self::copy_one(client, auth, src.clone(), dst).await;
                        drop(permit);
                        (src, result)
                    }
                    Err(e) => (src, Err(Error::Unavailable(e.to_string()))),
                }
            });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let (src, result) = joined.map_err(|e| Error::Unavailable(e.to_string()))?;
            if let Err(e) = result {
                warn!(src = %src, error = %e, "copy failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl ImageMirrorer for RegistryMirrorer {
    fn mirror(&self, plan: &MirrorPlan, cancel: &Cancellation) -> Result<()> {
        self.runtime.block_on(self.mirror_async(plan, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_mirror_core::reference::ImageReference;

    #[test]
    fn oci_reference_rejects_non_registry_kind() {
        let typed = TypedImageReference {
            reference: ImageReference::parse("quay.io/org/app:v1").unwrap(),
            kind: DestinationKind::File,
        };
        assert!(oci_reference(&typed).is_err());
    }

    #[test]
    fn verify_layer_digest_accepts_matching_sha256() {
        let data = b"hello world";
        let expected = format!("sha256:{}", hex_encode(sha2::Sha256::digest(data).as_slice()));
        assert!(verify_layer_digest(data, &expected).is_ok());
    }

    #[test]
    fn verify_layer_digest_rejects_mismatch() {
        let expected = format!("sha256:{}", "0".repeat(64));
        assert!(matches!(
            verify_layer_digest(b"hello world", &expected),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn verify_layer_digest_rejects_malformed_descriptor() {
        assert!(matches!(
            verify_layer_digest(b"hello world", "not-a-digest"),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn find_in_layer_locates_nested_path() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"hello world";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, "bundles.db", &data[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let found = find_in_layer(&gz_bytes, "bundles.db").unwrap();
        assert_eq!(found.unwrap(), data);
    }

    #[test]
    fn find_in_layer_returns_none_when_absent() {
        let builder = tar::Builder::new(Vec::new());
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        assert!(find_in_layer(&gz_bytes, "bundles.db").unwrap().is_none());
    }
}
