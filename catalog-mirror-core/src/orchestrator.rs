//! Drives extraction, catalog reading, planning, mirroring, and artifact
//! writing in the fixed sequence the run requires.

use std::path::Path;

use tracing::{info, warn};

use crate::extract::Cancellation;
use crate::options::Options;
use crate::reference::TypedImageReference;
use crate::{artifact, catalog, plan, Error};

/// A collection of every non-fatal error a run accumulated, plus at most one
/// fatal error that ended the run early.
///
/// This is not a `thiserror` leaf: it aggregates heterogeneous failures from
/// across the whole run rather than describing one failure mode, mirroring
/// the propagation policy of collecting per-step errors into a single value
/// the caller reports once.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    /// `true` if no step recorded a failure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The accumulated errors, in the order steps 1-5 recorded them.
    #[must_use]
    pub fn entries(&self) -> &[Error] {
        &self.errors
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no errors");
        }
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Composes the catalog mirror engine's components over one validated
/// [`Options`] bundle.
pub struct Orchestrator {
    options: Options,
}

impl Orchestrator {
    /// Builds an orchestrator from an already-completed and validated
    /// option bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if `options` does not validate.
    pub fn new(mut options: Options) -> crate::Result<Self> {
        options.complete();
        options.validate()?;
        Ok(Self { options })
    }

    /// Runs the mirror: extract, read, plan, mirror, write artifacts.
    ///
    /// Steps 1 and 2 are fatal: a failure there returns immediately with
    /// the plan empty. Steps 3, 4, and artifact writing accumulate their
    /// errors into the returned aggregate and never short-circuit.
    pub fn mirror(&self, cancel: &Cancellation) -> (crate::MirrorPlan, AggregateError) {
        let mut aggregate = AggregateError::default();

        let src = match TypedImageReference::parse(&self.options.source) {
            Ok(r) => r,
            Err(e) => {
                aggregate.push(e);
                return (crate::MirrorPlan::new(), aggregate);
            }
        };
        let dest = match TypedImageReference::parse(&self.options.dest) {
            Ok(r) => r,
            Err(e) => {
                aggregate.push(e);
                return (crate::MirrorPlan::new(), aggregate);
            }
        };

        let Some(extractor) = self.options.database_extractor.as_ref() else {
            aggregate.push(Error::InvalidOptions("database_extractor is required".into()));
            return (crate::MirrorPlan::new(), aggregate);
        };
        let Some(mirrorer) = self.options.image_mirrorer.as_ref() else {
            aggregate.push(Error::InvalidOptions("image_mirrorer is required".into()));
            return (crate::MirrorPlan::new(), aggregate);
        };

        info!(source = %self.options.source, dest = %self.options.dest, "starting mirror run");

        // Step 1: extraction. Fatal.
        let db_path = match extractor.extract(&src, "/bundles.db", cancel) {
            Ok(path) => path,
            Err(e) => {
                aggregate.push(e);
                return (crate::MirrorPlan::new(), aggregate);
            }
        };

        // Step 2: catalog read. Fatal, but row-scan errors are accumulated.
        let (images, row_errors) = match catalog::read_images(&db_path) {
            Ok(result) => result,
            Err(e) => {
                aggregate.push(e);
                return (crate::MirrorPlan::new(), aggregate);
            }
        };
        for row_error in row_errors {
            aggregate.push(Error::RowScanFailed(row_error));
        }

        // Step 3: planning. Accumulated.
        let max_components = usize::try_from(self.options.max_path_components).unwrap_or(0);
        let (realized, plan_errors) = plan::plan(&images, &src, &dest, max_components);
        for entry in plan_errors {
            aggregate.push(Error::InvalidReference {
                reference: entry.image,
                reason: entry.reason,
            });
        }

        // Step 4: mirroring. Accumulated.
        if let Err(e) = mirrorer.mirror(&realized, cancel) {
            aggregate.push(Error::Mirror(e.to_string()));
        }

        // Best-effort artifact writing, also accumulated.
        if let Err(e) = artifact::write_all(
            Path::new(&self.options.manifest_dir),
            &realized,
            self.options.policy_scope,
            &src.reference.name,
        ) {
            aggregate.push(e);
        }

        if !aggregate.is_empty() {
            warn!(
                error_count = aggregate.entries().len(),
                "errors during mirroring. the full contents of the catalog may not have been mirrored"
            );
        }

        (realized, aggregate)
    }
}
