pub mod acl;
pub mod cli;
pub mod config;
pub mod fixture;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod settings;
pub mod util;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    acl::{
        Acl, AclOutcome, AclStore, Decision, RequestView, collaborators::Collaborators,
        compile_config,
    },
    cli::{Cli, Command},
    fixture::{CommittedRequest, StaticRequest},
    settings::Settings,
};

/// Loads and compiles the access control list named by `settings`.
pub fn build_acl(settings: &Settings, collaborators: &Collaborators) -> Result<Acl> {
    let config = settings.load_acl_config()?;
    compile_config(&config, collaborators, &settings.compile_options())
}

/// Builds the first ACL, publishes it and installs the SIGHUP reload task.
/// Must be called from within a Tokio runtime.
pub fn start(settings: Settings, collaborators: Collaborators) -> Result<AclStore> {
    let acl = build_acl(&settings, &collaborators)?;
    tracing::info!(block_count = acl.block_count(), "access control list loaded");
    let (acl_tx, acl_rx) = watch::channel(Arc::new(acl));
    spawn_reload_task(Arc::new(settings), Arc::new(collaborators), acl_tx);
    Ok(AclStore::new(acl_rx))
}

/// Rebuilds the ACL and publishes it. On error the published snapshot is left untouched.
pub fn reload_acl(
    settings: &Settings,
    collaborators: &Collaborators,
    acl_tx: &watch::Sender<Arc<Acl>>,
) -> Result<usize> {
    let acl = build_acl(settings, collaborators)?;
    let block_count = acl.block_count();
    acl_tx
        .send(Arc::new(acl))
        .context("failed to publish reloaded access control list")?;
    Ok(block_count)
}

#[cfg(unix)]
fn spawn_reload_task(
    settings: Arc<Settings>,
    collaborators: Arc<Collaborators>,
    acl_tx: watch::Sender<Arc<Acl>>,
) {
    use tokio::signal::unix::{SignalKind, signal};

    // Register before returning: the default SIGHUP action terminates the process.
    let mut hup = match signal(SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGHUP handler");
            return;
        }
    };

    tokio::spawn(async move {
        while hup.recv().await.is_some() {
            tracing::info!("received SIGHUP; reloading access control list");
            match reload_acl(&settings, &collaborators, &acl_tx) {
                Ok(block_count) => {
                    tracing::info!(block_count, "access control list reloaded");
                }
                Err(err) => {
                    tracing::error!(error = ?err, "access control list reload failed");
                    if acl_tx.is_closed() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_task(
    _settings: Arc<Settings>,
    _collaborators: Arc<Collaborators>,
    _acl_tx: watch::Sender<Arc<Acl>>,
) {
    tracing::info!("SIGHUP reload is not supported on this platform");
}

/// Decision report printed by `indexgate eval`.
#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub request_id: String,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    pub authentication_required: bool,
    pub history: Vec<String>,
    pub committed: CommittedRequest,
}

impl EvalReport {
    pub fn new(request_id: impl Into<String>, outcome: AclOutcome) -> Self {
        let history = outcome.history.iter().map(ToString::to_string).collect();
        let block = outcome.block.as_deref().map(str::to_string);
        let decision = outcome.decision;
        let authentication_required = outcome.authentication_required;
        let mut committed = CommittedRequest::default();
        outcome.commit(&mut committed);
        Self {
            request_id: request_id.into(),
            decision,
            block,
            authentication_required,
            history,
            committed,
        }
    }
}

/// Evaluates a request fixture against the ACL named by `settings`.
pub async fn evaluate_fixture(settings: &Settings, request: &Path) -> Result<EvalReport> {
    let acl = build_acl(settings, &Collaborators::default())?;
    let request = StaticRequest::load(request)?;
    let outcome = acl.check(&request).await;
    Ok(EvalReport::new(request.id(), outcome))
}

pub async fn run(cli: &Cli, settings: Settings) -> Result<()> {
    match &cli.command {
        None | Some(Command::Check) => {
            let acl = build_acl(&settings, &Collaborators::default())?;
            tracing::info!(
                acl = %settings.acl.display(),
                block_count = acl.block_count(),
                "access control list is valid"
            );
            Ok(())
        }
        Some(Command::Eval { request }) => {
            let report = evaluate_fixture(&settings, request).await?;
            let rendered =
                serde_json::to_string_pretty(&report).context("failed to render report")?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{rendered}").context("failed to write report")?;
            Ok(())
        }
    }
}
