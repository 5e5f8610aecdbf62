//! Operator catalog mirroring engine.
//!
//! Given a source container image holding an operator catalog (a SQLite
//! database embedded in one of its layers), this crate discovers every
//! image the catalog references, plans a rewrite of each reference under a
//! destination, drives an injected copier over the plan, and serializes the
//! realized plan to the artifacts a cluster needs to pull the catalog and
//! its dependents from the mirror.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (orchestrator)
//!  ├── DatabaseExtractor (extract, trait — concrete impl in catalog-mirror-registry)
//!  ├── Catalog Reader (catalog)
//!  ├── Rewrite Planner (plan)
//!  ├── ImageMirrorer (extract, trait — concrete impl in catalog-mirror-registry)
//!  └── Artifact Writer (artifact)
//! ```

#![allow(clippy::missing_docs_in_private_items)]

pub mod artifact;
pub mod catalog;
pub mod digest;
mod error;
pub mod extract;
pub mod options;
pub mod orchestrator;
pub mod plan;
pub mod reference;

use std::collections::{BTreeSet, HashMap};

pub use digest::ImageDigest;
pub use error::{Error, Result};
pub use extract::{Cancellation, DatabaseExtractor, ImageMirrorer};
pub use options::Options;
pub use orchestrator::{AggregateError, Orchestrator};
pub use plan::PlanEntryError;
pub use reference::{DestinationKind, ImageReference, TypedImageReference};

/// The deduplicated set of image strings a catalog names.
pub type ImageReferenceSet = BTreeSet<String>;

/// A mapping from source reference to destination reference.
///
/// Always contains an entry for the source catalog image itself (the
/// "self-mirror" entry, see [`plan::plan`]).
pub type MirrorPlan = HashMap<TypedImageReference, TypedImageReference>;
