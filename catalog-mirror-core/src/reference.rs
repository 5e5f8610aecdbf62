//! Image reference parsing and typed destination kinds.
//!
//! Two dialects of the same docker-naming grammar are exposed: [`parse`]
//! (source dialect — ambiguous bare names default toward Docker Hub) and
//! [`parse_target`] (target dialect — ambiguous single-segment inputs are
//! registries). See the module-level grammar notes on [`validate_component`].

use std::fmt;

use crate::digest::ImageDigest;
use crate::{Error, Result};

const MAX_REFERENCE_LEN: usize = 255;
const DOCKER_HUB_REGISTRY: &str = "docker.io";
const DOCKER_HUB_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";

/// A parsed, structured image coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, e.g. `quay.io` or `localhost:5000`. Empty until defaulted.
    pub registry: String,
    /// First repository path segment, e.g. `library` or `coreos`.
    pub namespace: String,
    /// Remaining repository path, possibly itself containing `/`.
    pub name: String,
    /// Tag, if present.
    pub tag: Option<String>,
    /// Content digest, if present.
    pub id: Option<ImageDigest>,
}

impl ImageReference {
    /// Parses `s` using the source dialect (see module docs).
    pub fn parse(s: &str) -> Result<Self> {
        parse_generic(s, Dialect::Source, true)
    }

    /// Parses `s` using the target dialect (see module docs).
    pub fn parse_target(s: &str) -> Result<Self> {
        parse_generic(s, Dialect::Target, false)
    }

    /// Applies Docker Hub defaulting in place: an empty registry becomes
    /// `docker.io` (gaining an empty namespace of `library`), and a
    /// reference with neither tag nor digest gains the `latest` tag.
    pub fn apply_docker_hub_defaults(&mut self) {
        if self.registry.is_empty() {
            self.registry = DOCKER_HUB_REGISTRY.to_owned();
            if self.namespace.is_empty() {
                self.namespace = DOCKER_HUB_NAMESPACE.to_owned();
            }
        }
        if self.tag.is_none() && self.id.is_none() {
            self.tag = Some(DEFAULT_TAG.to_owned());
        }
    }

    /// The canonical string form, used as the input to tag synthesis.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Returns a copy with tag and digest stripped — the "repository" form
    /// used by the artifact writer's digest-mirror rows.
    #[must_use]
    pub fn repository(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            tag: None,
            id: None,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if !self.registry.is_empty() {
            write!(f, "{}", self.registry)?;
            wrote = true;
        }
        if !self.namespace.is_empty() {
            if wrote {
                write!(f, "/")?;
            }
            write!(f, "{}", self.namespace)?;
            wrote = true;
        }
        if !self.name.is_empty() {
            if wrote {
                write!(f, "/")?;
            }
            write!(f, "{}", self.name)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(id) = &self.id {
            write!(f, "@{id}")?;
        }
        Ok(())
    }
}

/// Which dialect [`parse_generic`] should apply when a bare single segment
/// is ambiguous between "registry host" and "repository name".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// Ambiguous single segments are repository names; Docker Hub defaulting
    /// is the caller's job (applied later, see [`ImageReference::apply_docker_hub_defaults`]).
    Source,
    /// Ambiguous single segments are registry hosts.
    Target,
}

fn parse_generic(input: &str, dialect: Dialect, require_name: bool) -> Result<ImageReference> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::InvalidReference {
            reference: input.to_owned(),
            reason: "empty reference".into(),
        });
    }
    if s.contains("://") {
        return Err(Error::InvalidReference {
            reference: input.to_owned(),
            reason: "contains a URL scheme".into(),
        });
    }
    if s.len() > MAX_REFERENCE_LEN {
        return Err(Error::InvalidReference {
            reference: input.to_owned(),
            reason: format!("exceeds {MAX_REFERENCE_LEN} characters"),
        });
    }

    let (left, id) = match s.split_once('@') {
        Some((l, digest)) => (l, Some(ImageDigest::parse(digest)?)),
        None => (s, None),
    };

    let (path, tag) = split_tag(left)?;

    let (registry, rest) = split_registry(path, dialect);
    let (namespace, name) = split_namespace(rest, dialect);

    if require_name && name.is_empty() {
        return Err(Error::InvalidReference {
            reference: input.to_owned(),
            reason: "name is empty".into(),
        });
    }
    if !namespace.is_empty() {
        validate_path(&namespace)?;
    }
    if !name.is_empty() {
        validate_path(&name)?;
    }

    Ok(ImageReference {
        registry,
        namespace,
        name,
        tag,
        id,
    })
}

/// Splits a trailing `:tag`, ignoring any `:` that belongs to a registry port.
fn split_tag(left: &str) -> Result<(&str, Option<String>)> {
    let search_from = left.rfind('/').map_or(0, |i| i + 1);
    match left[search_from..].rfind(':') {
        Some(rel) => {
            let at = search_from + rel;
            let tag = &left[at + 1..];
            validate_tag(tag)?;
            Ok((&left[..at], Some(tag.to_owned())))
        }
        None => Ok((left, None)),
    }
}

/// Splits off a leading registry host, if `path`'s first segment looks like one.
fn split_registry(path: &str, dialect: Dialect) -> (String, &str) {
    match path.split_once('/') {
        Some((first, rest)) if looks_like_registry(first) => (first.to_owned(), rest),
        Some(_) => (String::new(), path),
        None => {
            if dialect == Dialect::Target && looks_like_registry(path) {
                (path.to_owned(), "")
            } else {
                (String::new(), path)
            }
        }
    }
}

/// Splits a repository path into its first segment (namespace) and the rest (name).
///
/// A single remaining segment is ambiguous: under the target dialect it is a
/// bare namespace (as in a destination given as `registry/namespace`); under
/// the source dialect it is a bare repository name (as in `docker pull ubuntu`).
fn split_namespace(rest: &str, dialect: Dialect) -> (String, String) {
    if rest.is_empty() {
        return (String::new(), String::new());
    }
    match rest.split_once('/') {
        Some((ns, name)) => (ns.to_owned(), name.to_owned()),
        None => match dialect {
            Dialect::Target => (rest.to_owned(), String::new()),
            Dialect::Source => (String::new(), rest.to_owned()),
        },
    }
}

/// Returns `true` if `s` looks like a registry hostname rather than a name component.
fn looks_like_registry(s: &str) -> bool {
    s.contains('.') || s.contains(':') || s == "localhost"
}

/// Validates every `/`-separated component of a namespace or name string.
fn validate_path(path: &str) -> Result<()> {
    for component in path.split('/') {
        validate_component(component)?;
    }
    Ok(())
}

/// Validates a single docker name component against
/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`: alternating runs of lowercase
/// alphanumerics, separated by exactly one `.`, one `_`, exactly `__`, or a
/// uniform run of one or more `-`. Never leading/trailing a separator, and
/// never a mixed or doubled-up separator run (`..`, `___`, `.-`).
fn validate_component(component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::InvalidReference {
            reference: component.to_owned(),
            reason: "empty path component".into(),
        });
    }
    if component.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(Error::InvalidReference {
            reference: component.to_owned(),
            reason: "name contains uppercase characters".into(),
        });
    }
    let valid_chars = component
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
    if !valid_chars {
        return Err(Error::InvalidReference {
            reference: component.to_owned(),
            reason: "contains characters outside [a-z0-9._-]".into(),
        });
    }

    let bytes = component.as_bytes();
    let bad_separator = || Error::InvalidReference {
        reference: component.to_owned(),
        reason: "separator run must be '.', '_', '__', or one or more '-'".into(),
    };

    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return Err(Error::InvalidReference {
            reference: component.to_owned(),
            reason: "component starts or ends with a separator".into(),
        });
    }

    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        if i == bytes.len() {
            break;
        }
        let sep_start = i;
        while i < bytes.len() && matches!(bytes[i], b'.' | b'_' | b'-') {
            i += 1;
        }
        let sep = &component[sep_start..i];
        let sep_valid = sep == "." || sep == "_" || sep == "__" || sep.bytes().all(|b| b == b'-');
        if !sep_valid {
            return Err(bad_separator());
        }
    }
    Ok(())
}

/// Validates a tag string: docker tags allow `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`.
fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || tag.len() > 128 {
        return Err(Error::InvalidReference {
            reference: tag.to_owned(),
            reason: "invalid tag length".into(),
        });
    }
    let mut chars = tag.bytes();
    let first = chars.next().unwrap_or(0);
    if !(first.is_ascii_alphanumeric() || first == b'_') {
        return Err(Error::InvalidReference {
            reference: tag.to_owned(),
            reason: "tag must start with an alphanumeric or underscore".into(),
        });
    }
    let valid = tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
    if !valid {
        return Err(Error::InvalidReference {
            reference: tag.to_owned(),
            reason: "tag contains invalid characters".into(),
        });
    }
    Ok(())
}

/// Classifies a destination by scheme prefix, defaulting to `registry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DestinationKind {
    /// A container image registry (the default).
    Registry,
    /// A local filesystem directory tree.
    File,
    /// An S3-style object store.
    S3,
}

/// An [`ImageReference`] tagged with the kind of destination it denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedImageReference {
    /// The structured reference.
    pub reference: ImageReference,
    /// The destination kind lifted from a scheme prefix, if any.
    pub kind: DestinationKind,
}

impl TypedImageReference {
    /// Parses `s`, lifting a `s3://` or `file://` prefix into [`DestinationKind`]
    /// and parsing the remainder with the target dialect.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("s3://") {
            return Ok(Self {
                reference: ImageReference::parse_target(rest)?,
                kind: DestinationKind::S3,
            });
        }
        if let Some(rest) = s.strip_prefix("file://") {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return Ok(Self {
                reference: ImageReference::parse_target(rest)?,
                kind: DestinationKind::File,
            });
        }
        Ok(Self {
            reference: ImageReference::parse_target(s)?,
            kind: DestinationKind::Registry,
        })
    }
}

impl fmt::Display for TypedImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Registry => write!(f, "{}", self.reference),
            DestinationKind::File => write!(f, "file://{}", self.reference),
            DestinationKind::S3 => write!(f, "s3://{}", self.reference),
        }
    }
}
