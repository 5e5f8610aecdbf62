//! Rewrite planning: the mount rule, tag synthesis, and self-mapping.

use crate::reference::{DestinationKind, ImageReference, TypedImageReference};
use crate::MirrorPlan;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// One image string from the catalog that failed to parse or plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntryError {
    /// The offending catalog entry.
    pub image: String,
    /// Human-readable reason the entry was dropped from the plan.
    pub reason: String,
}

impl std::fmt::Display for PlanEntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.image, self.reason)
    }
}

/// FNV-1a over 32 bits.
fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Synthesizes a stable destination-side tag for a digest-only source reference.
///
/// `prefix` lets a caller prepend a short label when their destination
/// registry forbids pure-hex tags; the purity property (same source,
/// same synthesized suffix) holds regardless of the prefix used.
#[must_use]
pub fn synthesize_tag(canonical: &str, prefix: &str) -> String {
    format!("{prefix}{:08x}", fnv1a32(canonical.as_bytes()))
}

/// Splits a flat component list into `(namespace, name)` honoring the
/// component budget (`0` = unlimited). See spec §4.D step 6.
fn collapse_components(components: &[String], max_components: usize) -> (String, String) {
    if components.len() == 1 {
        return (String::new(), components[0].clone());
    }
    if max_components == 0 {
        return (components[0].clone(), components[1..].join("/"));
    }
    if max_components == 1 {
        return (components[0].clone(), components[1..].join("-"));
    }
    if components.len() > max_components {
        let keep = &components[..max_components - 1];
        let tail = components[max_components - 1..].join("-");
        let namespace = keep[0].clone();
        let mut rest: Vec<String> = keep[1..].to_vec();
        rest.push(tail);
        return (namespace, rest.join("/"));
    }
    (components[0].clone(), components[1..].join("/"))
}

/// Builds the ordered component list for the mount rule: destination
/// namespace/name first, then the source's namespace/name.
fn build_components(dest: &ImageReference, source: &ImageReference) -> Vec<String> {
    let mut components = Vec::new();
    if !dest.namespace.is_empty() {
        components.push(dest.namespace.clone());
    }
    if !dest.name.is_empty() {
        components.extend(dest.name.split('/').map(str::to_owned));
    }
    if !source.namespace.is_empty() {
        components.push(source.namespace.clone());
    }
    if !source.name.is_empty() {
        components.extend(source.name.split('/').map(str::to_owned));
    }
    components
}

/// Mounts `source` under `dest`, honoring `max_components`. The output
/// carries `dest`'s registry and `source`'s tag/digest.
fn mount(source: &ImageReference, dest: &ImageReference, max_components: usize) -> ImageReference {
    let components = build_components(dest, source);
    let (namespace, name) = if components.is_empty() {
        (String::new(), String::new())
    } else {
        collapse_components(&components, max_components)
    };

    ImageReference {
        registry: dest.registry.clone(),
        namespace,
        name: name.trim_start_matches('/').to_owned(),
        tag: source.tag.clone(),
        id: source.id.clone(),
    }
}

/// Plans one already-parsed source reference against `src`/`dest`, returning
/// the `(key, value)` pair the mount rule produces for it.
fn plan_one(
    parsed: &ImageReference,
    src: &TypedImageReference,
    dest: &TypedImageReference,
    max_components: usize,
) -> (TypedImageReference, TypedImageReference) {
    let mut defaulted = parsed.clone();

    let synthesized_tag = if defaulted.tag.is_none() && defaulted.id.is_some() {
        Some(synthesize_tag(&defaulted.canonical(), ""))
    } else {
        None
    };

    defaulted.apply_docker_hub_defaults();

    let mut for_dest = defaulted.clone();
    if let Some(tag) = synthesized_tag {
        for_dest.tag = Some(tag);
    }

    let dest_max_components = if dest.kind == DestinationKind::Registry {
        max_components
    } else {
        0
    };
    let dest_reference = mount(&for_dest, &dest.reference, dest_max_components);

    let key_reference = if src.kind == DestinationKind::Registry {
        defaulted
    } else {
        mount(&defaulted, &src.reference, 0)
    };

    (
        TypedImageReference {
            reference: key_reference,
            kind: src.kind,
        },
        TypedImageReference {
            reference: dest_reference,
            kind: dest.kind,
        },
    )
}

/// Plans the rewrite of every image string in `images` plus the source
/// catalog image itself (the "self-mirror" entry), returning the resulting
/// plan and any per-entry errors.
///
/// Determinism: identical inputs always produce an identical plan and
/// identical synthesized tags (see spec §8, properties 1 and 5).
#[must_use]
pub fn plan(
    images: &std::collections::BTreeSet<String>,
    src: &TypedImageReference,
    dest: &TypedImageReference,
    max_components: usize,
) -> (MirrorPlan, Vec<PlanEntryError>) {
    let mut result = MirrorPlan::new();
    let mut errors = Vec::new();

    for image in images {
        if image.is_empty() {
            continue;
        }
        match ImageReference::parse(image) {
            Ok(parsed) => {
                let (key, value) = plan_one(&parsed, src, dest, max_components);
                result.insert(key, value);
            }
            Err(e) => errors.push(PlanEntryError {
                image: image.clone(),
                reason: e.to_string(),
            }),
        }
    }

    let (self_key, self_value) = plan_one(&src.reference, src, dest, max_components);
    result.insert(self_key, self_value);

    (result, errors)
}
