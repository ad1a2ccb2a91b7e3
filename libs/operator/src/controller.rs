//! The worker loop (spec §4.1, §5): informer events are classified into
//! `Command`s, funneled through a single deduplicating `WorkQueue`, and a
//! fixed pool of workers each execute one command to completion before
//! dequeuing the next.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::events::{EventRecorder, EventSource};
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Span};

use crate::announcer::RecorderAnnouncer;
use crate::command::{classify_chi, classify_chit, classify_chop_config, Command, EventKind};
use crate::creator::DefaultCreator;
use crate::crd::chi::ClickHouseInstallation;
use crate::crd::chit::ClickHouseInstallationTemplate;
use crate::crd::chop_config::{ChopConfigSpec, ClickHouseOperatorConfiguration};
use crate::delete;
use crate::error::{Error, Result};
use crate::finalizer;
use crate::metrics::Metrics;
use crate::model::tree::Chi;
use crate::normalizer;
use crate::planner;
use crate::queue::WorkQueue;
use crate::reconcile::{self, ReconcileContext};
use crate::schemer::NullSchemer;
use crate::status;
use crate::telemetry;

/// How many workers drain the queue concurrently (spec §5 "Multiple workers
/// may run in parallel").
const WORKER_COUNT: usize = 4;

/// Diagnostics exposed by the web server, mirroring the teacher's shape.
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: EventSource,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: EventSource {
                component: "chop-operator".to_string(),
                host: None,
            },
        }
    }
}

/// Every CHI's last-normalized tree, kept purely in memory so the Action
/// Planner (spec §4.2) has an "old" to diff the next event against. Not
/// persisted: a restarted operator treats the first post-restart reconcile
/// of each CHI as if `old` were absent, which is safe since normalize and
/// reconcile are both idempotent (spec §8 round-trip properties).
type ChiCache = Mutex<HashMap<(String, String), Chi>>;

/// Context injected into every worker iteration.
pub struct Context {
    pub client: Client,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<RwLock<ChopConfigSpec>>,
    cache: Arc<ChiCache>,
    /// Cancelled on shutdown (spec §6): every in-flight reconcile checks a
    /// child of this token so a long host walk stops between steps instead
    /// of running to completion after the process has been asked to exit.
    shutdown: CancellationToken,
}

/// State shared between the controller and the web server.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
    config: Arc<RwLock<ChopConfigSpec>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            diagnostics: Arc::default(),
            metrics: Arc::default(),
            config: Arc::new(RwLock::new(ChopConfigSpec::default())),
        }
    }
}

impl State {
    /// Build `State` around a registry the caller already started
    /// populating (e.g. with the Kubernetes client's own HTTP metrics), so
    /// reconcile metrics land in the same `/metrics` output.
    pub fn new(registry: prometheus_client::registry::Registry) -> Self {
        Self {
            metrics: Arc::new(Metrics::new(registry)),
            ..Self::default()
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    fn to_context(&self, client: Client, shutdown: CancellationToken) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            config: self.config.clone(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        })
    }
}

/// Build a `ReconcileContext` scoped to one CHI (Design Notes §9: "creator
/// is request-scoped"), with an announcer bound to that object's reference.
fn reconcile_context(client: Client, config: ChopConfigSpec, namespace: &str, name: &str) -> ReconcileContext {
    let event_source = EventSource {
        component: "chop-operator".to_string(),
        host: None,
    };
    let object_ref = ObjectReference {
        api_version: Some("clickhouse.altinity.com/v1".to_string()),
        kind: Some("ClickHouseInstallation".to_string()),
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    };
    let recorder = EventRecorder::new(client.clone(), event_source, object_ref);
    ReconcileContext {
        client,
        creator: Arc::new(DefaultCreator),
        schemer: Arc::new(NullSchemer::default()),
        announcer: Arc::new(RecorderAnnouncer::new(recorder)),
        config,
    }
}

/// Dispatch a single `ReconcileChi` command (spec §4.1, §4.6, §4.7).
#[instrument(skip(ctx), fields(trace_id))]
async fn reconcile_chi_command(ctx: &Context, namespace: &str, name: &str) -> Result<()> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", tracing::field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);

    let api: Api<ClickHouseInstallation> = Api::namespaced(ctx.client.clone(), namespace);
    let Some(chi) = api.get_opt(name).await? else {
        ctx.cache.lock().await.remove(&(namespace.to_string(), name.to_string()));
        return Ok(());
    };

    if finalizer::is_deleting(&chi) {
        return finalize(ctx, &api, &chi).await;
    }

    finalizer::ensure(&api, &chi, &ctx.config.read().await.finalizer_name).await?;
    if let Err(e) = status::patch_reconcile_start(&api, &chi).await {
        warn!(msg = "status patch failed", namespace, name, %e);
    }

    let new = normalizer::normalize(&chi)?;
    let key = (namespace.to_string(), name.to_string());
    let old = ctx.cache.lock().await.get(&key).cloned();
    let is_update = old.is_some();

    let chi_plan = planner::plan(old.as_ref(), &new);
    let mut attrs = planner::attributes_for(&chi_plan, &new, is_update);

    let config = ctx.config.read().await.clone();
    let reconcile_ctx = reconcile_context(ctx.client.clone(), config, namespace, name);
    let cancelled = ctx.shutdown.child_token();
    reconcile::reconcile_chi(&reconcile_ctx, old.as_ref(), &new, &mut attrs, &|| cancelled.is_cancelled()).await?;

    ctx.cache.lock().await.insert(key, new);
    if let Err(e) = status::patch_reconcile_complete(&api, &chi, &chi_plan).await {
        warn!(msg = "status patch failed", namespace, name, %e);
    }
    Ok(())
}

/// `finalizeCHI` (spec §4.6): re-fetch, run the delete cascade, then remove
/// the finalizer so the platform can garbage-collect the object.
async fn finalize(ctx: &Context, api: &Api<ClickHouseInstallation>, chi: &ClickHouseInstallation) -> Result<()> {
    if !chi.finalizers().iter().any(|f| f == &ctx.config.read().await.finalizer_name) {
        return Ok(());
    }
    let tree = normalizer::normalize(chi)?;
    if let Err(e) = status::patch_delete_start(api, chi).await {
        warn!(msg = "status patch failed", namespace = %tree.namespace, name = %tree.name, %e);
    }
    delete::cascade(ctx.client.clone(), &NullSchemer::default(), &tree).await;
    finalizer::remove(api, chi, &ctx.config.read().await.finalizer_name).await?;
    ctx.cache
        .lock()
        .await
        .remove(&(tree.namespace.clone(), tree.name.clone()));
    Ok(())
}

/// `ReconcileChit` (spec §4.1): a CHIT changed. Expanding this into every
/// referencing CHI's `ReconcileChi` is wiring the spec explicitly leaves to
/// the informer layer (spec §1 Non-goals), so the worker only logs it.
fn reconcile_chit_command(namespace: &str, name: &str) {
    info!(msg = "ClickHouseInstallationTemplate changed", namespace, name);
}

/// `ReconcileChopConfig` (spec §4.1): refresh the shared operator
/// configuration consumed by every subsequent CHI reconcile.
async fn reconcile_chop_config_command(ctx: &Context) -> Result<()> {
    let api: Api<ClickHouseOperatorConfiguration> = Api::all(ctx.client.clone());
    let Some(conf) = api.get_opt("chop").await? else {
        return Ok(());
    };
    *ctx.config.write().await = conf.spec;
    Ok(())
}

/// `DropDNS` (spec §8 scenario 6): issue the fleet-wide DNS cache drop for
/// the named CHI, swallowing Schemer errors (spec §7).
async fn drop_dns_command(ctx: &Context, namespace: &str, chi_name: &str) {
    let config = ctx.config.read().await.clone();
    let reconcile_ctx = reconcile_context(ctx.client.clone(), config, namespace, chi_name);
    if let Err(e) = reconcile_ctx.schemer.chi_drop_dns_cache(namespace, chi_name).await {
        warn!(msg = "DropDNS failed", namespace, chi_name, %e);
    }
}

async fn dispatch(ctx: &Context, command: &Command) {
    ctx.diagnostics.write().await.last_event = Utc::now();
    let result: Result<()> = match command {
        Command::ReconcileChi { namespace, name } => reconcile_chi_command(ctx, namespace, name).await,
        Command::ReconcileChit { namespace, name } => {
            reconcile_chit_command(namespace, name);
            Ok(())
        }
        Command::ReconcileChopConfig => reconcile_chop_config_command(ctx).await,
        Command::DropDns { namespace, chi_name, .. } => {
            drop_dns_command(ctx, namespace, chi_name).await;
            Ok(())
        }
    };
    if let Err(e) = result {
        error!(msg = "command failed", %command, error = %e);
        ctx.metrics
            .reconcile
            .failures
            .get_or_create(&crate::metrics::ErrorLabels {
                instance: command.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }
}

async fn worker(ctx: Arc<Context>, queue: Arc<WorkQueue<Command>>) {
    loop {
        let command = queue.get().await;
        dispatch(&ctx, &command).await;
        queue.forget(&command).await;
        queue.done(&command).await;
    }
}

/// Feed the queue from a CHI watch (spec §4.1's informer source for
/// `ReconcileChi`).
async fn watch_chis(client: Client, queue: Arc<WorkQueue<Command>>) {
    let api: Api<ClickHouseInstallation> = Api::all(client);
    watcher(api, watcher::Config::default().any_semantic())
        .default_backoff()
        .for_each(|event| {
            let queue = queue.clone();
            async move {
                match event {
                    Ok(watcher::Event::Apply(chi)) => {
                        if let (Some(namespace), name) = (chi.namespace(), chi.name_any()) {
                            queue.add(classify_chi(&namespace, &name, EventKind::Modify)).await;
                        }
                    }
                    Ok(watcher::Event::Delete(chi)) => {
                        if let (Some(namespace), name) = (chi.namespace(), chi.name_any()) {
                            queue.add(classify_chi(&namespace, &name, EventKind::Delete)).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(msg = "CHI watch error", %e),
                }
            }
        })
        .await;
}

async fn watch_chits(client: Client, queue: Arc<WorkQueue<Command>>) {
    let api: Api<ClickHouseInstallationTemplate> = Api::all(client);
    watcher(api, watcher::Config::default().any_semantic())
        .default_backoff()
        .for_each(|event| {
            let queue = queue.clone();
            async move {
                match event {
                    Ok(watcher::Event::Apply(chit)) | Ok(watcher::Event::Delete(chit)) => {
                        if let (Some(namespace), name) = (chit.namespace(), chit.name_any()) {
                            queue.add(classify_chit(&namespace, &name, EventKind::Modify)).await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(msg = "CHIT watch error", %e),
                }
            }
        })
        .await;
}

async fn watch_chop_config(client: Client, queue: Arc<WorkQueue<Command>>) {
    let api: Api<ClickHouseOperatorConfiguration> = Api::all(client);
    watcher(api, watcher::Config::default().any_semantic())
        .default_backoff()
        .for_each(|event| {
            let queue = queue.clone();
            async move {
                match event {
                    Ok(watcher::Event::Apply(_)) | Ok(watcher::Event::Delete(_)) => {
                        queue.add(classify_chop_config(EventKind::Modify)).await;
                    }
                    Ok(_) => {}
                    Err(e) => error!(msg = "ChopConfig watch error", %e),
                }
            }
        })
        .await;
}

/// Initialize the worker pool and its informer feeds (given the CRDs are
/// installed).
pub async fn run(state: State, client: Client) {
    let chis: Api<ClickHouseInstallation> = Api::all(client.clone());
    if let Err(e) = chis.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    let shutdown = CancellationToken::new();
    let ctx = state.to_context(client.clone(), shutdown.clone());
    let queue = Arc::new(WorkQueue::<Command>::new());

    // Startup policy (spec §4.1): give the informer caches a moment to fill
    // before the first worker dequeue.
    tokio::time::sleep(ctx.config.read().await.warmup_deadline()).await;

    let workers: Vec<_> = (0..WORKER_COUNT)
        .map(|_| tokio::spawn(worker(ctx.clone(), queue.clone())))
        .collect();

    info!(msg = "starting chop-operator controller", workers = WORKER_COUNT);
    tokio::select! {
        _ = watch_chis(client.clone(), queue.clone()) => {},
        _ = watch_chits(client.clone(), queue.clone()) => {},
        _ = watch_chop_config(client.clone(), queue.clone()) => {},
        _ = tokio::signal::ctrl_c() => {
            info!(msg = "shutdown signal received, cancelling in-flight reconciles");
        },
    }
    shutdown.cancel();
    for w in workers {
        w.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_default_reports_operator_as_source() {
        let d = Diagnostics::default();
        assert_eq!(d.reporter.component, "chop-operator");
    }
}
