//! CLI front-end for the operator catalog mirroring engine.

#![allow(clippy::print_stdout, clippy::print_stderr, clippy::missing_docs_in_private_items)]

use std::sync::Arc;

use anyhow::Context;
use catalog_mirror_core::artifact::PolicyScope;
use catalog_mirror_core::extract::Cancellation;
use catalog_mirror_core::options::Options;
use catalog_mirror_core::orchestrator::Orchestrator;
use catalog_mirror_registry::{RegistryExtractor, RegistryMirrorer};
use clap::Parser;
use oci_client::secrets::RegistryAuth;
use tracing::info;

/// Mirrors an operator catalog image and every image it references to a
/// destination registry, filesystem tree, or object store.
#[derive(Parser)]
#[command(name = "catalog-mirror", version, about)]
struct Cli {
    /// Source catalog image reference (e.g. `quay.io/example/my-catalog:v1`).
    #[arg(long)]
    from: String,

    /// Destination locator: a registry/namespace, or a `file://`/`s3://` URL.
    #[arg(long)]
    to: String,

    /// Maximum path components in the destination repository (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_path_components: i64,

    /// Directory the mapping file and policy documents are written into.
    #[arg(long, default_value = "./manifests")]
    manifests: String,

    /// Maximum number of concurrent registry transfers.
    #[arg(long, default_value_t = 4)]
    max_parallel: usize,

    /// Scope at which the digest-mirror policy document is generated.
    #[arg(long, value_enum, default_value_t = PolicyScopeArg::Repository)]
    policy_scope: PolicyScopeArg,
}

/// `clap`-facing mirror of [`PolicyScope`]; kept distinct so the core crate
/// carries no `clap` dependency.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PolicyScopeArg {
    /// Keep the full repository path in policy rows.
    Repository,
    /// Collapse policy rows to registry hostnames.
    Registry,
}

impl From<PolicyScopeArg> for PolicyScope {
    fn from(value: PolicyScopeArg) -> Self {
        match value {
            PolicyScopeArg::Repository => Self::Repository,
            PolicyScopeArg::Registry => Self::Registry,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let exit_code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("catalog-mirror: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let extractor =
        Arc::new(RegistryExtractor::new().context("building database extractor")?);
    let mirrorer = Arc::new(
        RegistryMirrorer::with_auth(RegistryAuth::Anonymous, cli.max_parallel)
            .context("building image mirrorer")?,
    );

    let options = Options {
        source: cli.from,
        dest: cli.to,
        manifest_dir: cli.manifests,
        max_path_components: cli.max_path_components,
        policy_scope: cli.policy_scope.into(),
        image_mirrorer: Some(mirrorer),
        database_extractor: Some(extractor),
    };
    let orchestrator = Orchestrator::new(options).context("validating options")?;

    let cancel = Cancellation::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    // The orchestrator's trait is synchronous; run it on a blocking-pool
    // thread so its internal bridging runtimes don't nest inside this one.
    let (plan, aggregate) = tokio::task::spawn_blocking(move || orchestrator.mirror(&cancel))
        .await
        .context("mirror task panicked")?;

    info!(entries = plan.len(), "mirror plan realized");

    if aggregate.is_empty() {
        return Ok(0);
    }

    eprintln!("errors during mirroring. the full contents of the catalog may not have been mirrored");
    for err in aggregate.entries() {
        eprintln!("  - {err}");
    }
    Ok(1)
}
