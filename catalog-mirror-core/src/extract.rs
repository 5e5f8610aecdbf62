//! Collaborator traits the orchestrator drives but never implements itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::reference::TypedImageReference;
use crate::{MirrorPlan, Result};

/// A cheap, cloneable cooperative-cancellation flag.
///
/// Extractors and mirrorers are expected to check [`Cancellation::is_cancelled`]
/// at I/O boundaries and return [`crate::Error::Cancelled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a fresh, not-yet-cancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; visible to every clone of this handle.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`Cancellation::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetches a single in-image path out of a container image and returns its
/// local filesystem location.
///
/// Implementations own the lifetime of the returned path for the duration
/// of the run that requested it; the orchestrator does not delete it.
pub trait DatabaseExtractor: Send + Sync {
    /// Extracts `from_inside_path` (e.g. `/bundles.db`) from `from` into a
    /// run-scoped temporary directory and returns the resulting path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if no layer contains the path,
    /// [`crate::Error::Unavailable`] if the registry cannot be reached,
    /// [`crate::Error::Unauthorized`] if credentials are rejected, or
    /// [`crate::Error::Corrupt`] if an extracted blob fails an integrity
    /// check.
    fn extract(
        &self,
        from: &TypedImageReference,
        from_inside_path: &str,
        cancel: &Cancellation,
    ) -> Result<PathBuf>;
}

/// Moves the bits described by a [`MirrorPlan`] from source to destination.
///
/// The core never implements this trait; it only calls through it. See
/// `catalog-mirror-registry` for a registry-to-registry implementation.
pub trait ImageMirrorer: Send + Sync {
    /// Realizes every entry in `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error describing the failure; the orchestrator wraps it
    /// with the `"mirroring failed: "` prefix before accumulating it.
    fn mirror(&self, plan: &MirrorPlan, cancel: &Cancellation) -> Result<()>;
}
