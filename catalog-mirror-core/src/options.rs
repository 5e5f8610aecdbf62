//! Validated option bundle consumed by the orchestrator.

use std::sync::Arc;

use crate::artifact::PolicyScope;
use crate::extract::{DatabaseExtractor, ImageMirrorer};
use crate::{Error, Result};

const DEFAULT_MANIFEST_DIR: &str = "./manifests";

/// Options for one mirror run.
///
/// `Validate` and `Complete` mirror the two-phase contract common to
/// Kubernetes-style option types: `Complete` fills in defaults, `Validate`
/// rejects a bundle that is still unusable after completion.
#[derive(Clone)]
pub struct Options {
    /// Source image reference string.
    pub source: String,
    /// Destination reference string (registry, `file://`, or `s3://`).
    pub dest: String,
    /// Directory the artifact writer writes into.
    pub manifest_dir: String,
    /// Maximum path components in a destination repository (`0` = unlimited).
    pub max_path_components: i64,
    /// Scope at which the digest-mirror policy documents are written.
    pub policy_scope: PolicyScope,
    /// The image mirrorer the orchestrator drives in step 4.
    pub image_mirrorer: Option<Arc<dyn ImageMirrorer>>,
    /// The database extractor the orchestrator drives in step 1.
    pub database_extractor: Option<Arc<dyn DatabaseExtractor>>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("manifest_dir", &self.manifest_dir)
            .field("max_path_components", &self.max_path_components)
            .field("policy_scope", &self.policy_scope)
            .field("image_mirrorer", &self.image_mirrorer.is_some())
            .field("database_extractor", &self.database_extractor.is_some())
            .finish()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source: String::new(),
            dest: String::new(),
            manifest_dir: String::new(),
            max_path_components: 0,
            policy_scope: PolicyScope::default(),
            image_mirrorer: None,
            database_extractor: None,
        }
    }
}

impl Options {
    /// Fills in defaults for fields that are still empty.
    pub fn complete(&mut self) {
        if self.manifest_dir.is_empty() {
            self.manifest_dir = DEFAULT_MANIFEST_DIR.to_owned();
        }
    }

    /// Rejects an option bundle that is missing required collaborators or
    /// carries an invalid field, after [`Options::complete`] has run.
    pub fn validate(&self) -> Result<()> {
        if self.database_extractor.is_none() {
            return Err(Error::InvalidOptions("database_extractor is required".into()));
        }
        if self.image_mirrorer.is_none() {
            return Err(Error::InvalidOptions("image_mirrorer is required".into()));
        }
        if self.source.is_empty() {
            return Err(Error::InvalidOptions("source is required".into()));
        }
        if self.dest.is_empty() {
            return Err(Error::InvalidOptions("dest is required".into()));
        }
        if self.manifest_dir.is_empty() {
            return Err(Error::InvalidOptions("manifest_dir is required".into()));
        }
        if self.max_path_components < 0 {
            return Err(Error::InvalidOptions(
                "max_path_components must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Copies every non-zero field of `self` into `target`, leaving
    /// `target`'s existing values where `self`'s are unset. Applying the
    /// same transform twice is a no-op past the first application.
    pub fn layer_onto(&self, target: &mut Self) {
        if !self.source.is_empty() {
            target.source.clone_from(&self.source);
        }
        if !self.dest.is_empty() {
            target.dest.clone_from(&self.dest);
        }
        if !self.manifest_dir.is_empty() {
            target.manifest_dir.clone_from(&self.manifest_dir);
        }
        if self.max_path_components != 0 {
            target.max_path_components = self.max_path_components;
        }
        if self.policy_scope != PolicyScope::default() {
            target.policy_scope = self.policy_scope;
        }
        if self.image_mirrorer.is_some() {
            target.image_mirrorer.clone_from(&self.image_mirrorer);
        }
        if self.database_extractor.is_some() {
            target.database_extractor.clone_from(&self.database_extractor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Cancellation;
    use crate::{MirrorPlan, TypedImageReference};
    use std::path::PathBuf;

    struct NullExtractor;
    impl DatabaseExtractor for NullExtractor {
        fn extract(
            &self,
            _from: &TypedImageReference,
            _from_inside_path: &str,
            _cancel: &Cancellation,
        ) -> Result<PathBuf> {
            Ok(PathBuf::from("/dev/null"))
        }
    }

    struct NullMirrorer;
    impl ImageMirrorer for NullMirrorer {
        fn mirror(&self, _plan: &MirrorPlan, _cancel: &Cancellation) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn complete_defaults_manifest_dir() {
        let mut opts = Options::default();
        opts.complete();
        assert_eq!(opts.manifest_dir, "./manifests");
    }

    #[test]
    fn validate_requires_collaborators() {
        let opts = Options {
            source: "quay.io/a/b".into(),
            dest: "localhost:5000".into(),
            manifest_dir: "./manifests".into(),
            ..Options::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn validate_passes_with_full_bundle() {
        let mut opts = Options {
            source: "quay.io/a/b".into(),
            dest: "localhost:5000".into(),
            image_mirrorer: Some(Arc::new(NullMirrorer)),
            database_extractor: Some(Arc::new(NullExtractor)),
            ..Options::default()
        };
        opts.complete();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_budget() {
        let opts = Options {
            source: "quay.io/a/b".into(),
            dest: "localhost:5000".into(),
            manifest_dir: "./manifests".into(),
            max_path_components: -1,
            policy_scope: PolicyScope::default(),
            image_mirrorer: Some(Arc::new(NullMirrorer)),
            database_extractor: Some(Arc::new(NullExtractor)),
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn layer_onto_is_idempotent() {
        let source = Options {
            source: "quay.io/a/b".into(),
            max_path_components: 2,
            ..Options::default()
        };
        let mut target_once = Options::default();
        source.layer_onto(&mut target_once);
        let mut target_twice = Options::default();
        source.layer_onto(&mut target_twice);
        source.layer_onto(&mut target_twice);

        assert_eq!(target_once.source, target_twice.source);
        assert_eq!(target_once.max_path_components, target_twice.max_path_components);
    }
}
