//! Per-host reconciliation (spec §4.5): the 11-step sequence that converges
//! one ClickHouse server process, bracketed by the exclude/include state
//! machine (§4.5.1) that keeps `remote_servers` from ever showing a host
//! mid-mutation to its peers.

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Patch, PatchParams};
use kube::runtime::events::EventType;
use kube::Api;

use crate::creator::{pvc_name, RemoteServersOptions};
use crate::error::Result;
use crate::model::address::Address;
use crate::model::attributes::{AttributesTable, ReconcileAttributes};
use crate::model::tree::{Chi, Host, ReconcileWaitPolicy, Shard};
use crate::model::workload::WorkloadStatus;

use super::{configmap, pvc, service, statefulset, ReconcileContext};

/// Spec §4.5.1, §8 invariant 5: whether the exclude step must actually wait
/// for `IsHostInCluster` to flip before proceeding.
fn should_wait_exclude_host(chi: &Chi, shard: &Shard, status: WorkloadStatus, config_wait_exclude: bool) -> bool {
    if status.needs_no_wait() {
        return false;
    }
    if shard.has_single_host() {
        return false;
    }
    match chi.reconcile_wait_policy {
        ReconcileWaitPolicy::NoWait => false,
        ReconcileWaitPolicy::Wait => true,
        ReconcileWaitPolicy::Default => config_wait_exclude,
    }
}

/// Symmetric to `should_wait_exclude_host`, keyed on `ReconcileWaitInclude`.
fn should_wait_include_host(chi: &Chi, shard: &Shard, status: WorkloadStatus, config_wait_include: bool) -> bool {
    if status.needs_no_wait() {
        return false;
    }
    if shard.has_single_host() {
        return false;
    }
    match chi.reconcile_wait_policy {
        ReconcileWaitPolicy::NoWait => false,
        ReconcileWaitPolicy::Wait => true,
        ReconcileWaitPolicy::Default => config_wait_include,
    }
}

/// Spec §5 "`pollHostContext(host, predicate)`": loop at the configured
/// tick interval until the Schemer reports the wanted membership state.
/// Schemer errors are logged (via the announcer) and retried rather than
/// aborting the reconcile — §7 "Schemer error... does not abort".
async fn poll_host_in_cluster(ctx: &ReconcileContext, host: &Address, want: bool, is_cancelled: &(dyn Fn() -> bool + Sync)) -> Result<()> {
    loop {
        if is_cancelled() {
            return Ok(());
        }
        match ctx.schemer.is_host_in_cluster(host).await {
            Ok(actual) if actual == want => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                let _ = ctx
                    .announcer
                    .announce(EventType::Warning, "Reconcile", &format!("membership poll for {host} failed: {e}"))
                    .await;
            }
        }
        tokio::time::sleep(ctx.config.poll_interval()).await;
    }
}

/// Spec §4.5.1 `Exclude(host)`: re-render the topology ConfigMap excluding
/// this host, apply with `update=true`, then — if waiting is required —
/// poll until it has left `system.clusters`.
async fn exclude(
    ctx: &ReconcileContext,
    chi: &Chi,
    shard: &Shard,
    host: &Host,
    attrs: &AttributesTable,
    status: WorkloadStatus,
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<()> {
    let wait = should_wait_exclude_host(chi, shard, status, ctx.config.reconcile_wait_exclude);
    if !wait {
        return Ok(());
    }
    let options = RemoteServersOptions::excluding(host.address.clone());
    let cm = ctx.creator.config_map_chi_common(chi, attrs, &options);
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &cm, true, &ctx.config.field_manager).await?;
    poll_host_in_cluster(ctx, &host.address, false, is_cancelled).await
}

/// Spec §4.5.1 `Include(host)`: re-render the topology without excluding
/// this host (but still excluding never-added hosts), apply, then — if
/// waiting is required — poll until it has rejoined `system.clusters`.
async fn include(
    ctx: &ReconcileContext,
    chi: &Chi,
    shard: &Shard,
    host: &Host,
    attrs: &AttributesTable,
    status: WorkloadStatus,
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<()> {
    let options = RemoteServersOptions::excluding_unadded_only();
    let cm = ctx.creator.config_map_chi_common(chi, attrs, &options);
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &cm, true, &ctx.config.field_manager).await?;

    let wait = should_wait_include_host(chi, shard, status, ctx.config.reconcile_wait_include);
    if !wait {
        return Ok(());
    }
    poll_host_in_cluster(ctx, &host.address, true, is_cancelled).await
}

/// Reconcile the PersistentVolumes bound to `host`'s PVCs: fetch the bound
/// volume name off each PVC (absence tolerated — not yet bound, or no
/// template), prepare it with the Creator, and patch its labels in place
/// (spec §4.5 step 6).
async fn reconcile_persistent_volumes(ctx: &ReconcileContext, host: &Host) -> Result<()> {
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &host.address.namespace);
    let pvs: Api<PersistentVolume> = Api::namespaced(ctx.client.clone(), &host.address.namespace);

    for mount in &host.volume_mounts {
        let name = pvc_name(&mount.template.name, host);
        let Some(claim) = pvcs.get_opt(&name).await? else {
            continue;
        };
        let Some(volume_name) = claim.spec.as_ref().and_then(|s| s.volume_name.clone()) else {
            continue;
        };
        let Some(current) = pvs.get_opt(&volume_name).await? else {
            continue;
        };
        let prepared = ctx.creator.prepare_persistent_volume(current, host);
        let patch = serde_json::json!({ "metadata": { "labels": prepared.metadata.labels } });
        let pp = PatchParams::apply(&ctx.config.field_manager).force();
        pvs.patch(&volume_name, &pp, &Patch::Merge(&patch)).await?;
    }
    Ok(())
}

/// The per-host sequence (spec §4.5, steps 1-11).
pub async fn reconcile_host(
    ctx: &ReconcileContext,
    chi: &Chi,
    shard: &Shard,
    host: &Host,
    attrs: &mut AttributesTable,
    is_update: bool,
) -> Result<()> {
    reconcile_host_cancellable(ctx, chi, shard, host, attrs, is_update, &|| false).await
}

/// As `reconcile_host`, but threading a cancellation predicate through the
/// exclude/include polls (spec §5 "a context-done check is evaluated...
/// inside every polling loop").
pub async fn reconcile_host_cancellable(
    ctx: &ReconcileContext,
    chi: &Chi,
    shard: &Shard,
    host: &Host,
    attrs: &mut AttributesTable,
    is_update: bool,
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<()> {
    if is_cancelled() {
        return Ok(());
    }

    // Step 1: build desired artifacts from the external Creator.
    let desired_config_map = ctx.creator.config_map_host(host);
    let desired_stateful_set = ctx.creator.stateful_set(host);
    let desired_service = ctx.creator.service_host(host);

    // Step 2: classify the existing StatefulSet.
    let stateful_sets: Api<k8s_openapi::api::apps::v1::StatefulSet> = Api::namespaced(ctx.client.clone(), &host.address.namespace);
    let current_stateful_set = stateful_sets.get_opt(&desired_stateful_set.metadata.name.clone().unwrap_or_default()).await?;
    let status = statefulset::classify(current_stateful_set.as_ref(), &desired_stateful_set);

    // Step 3: Exclude.
    exclude(ctx, chi, shard, host, attrs, status, is_cancelled).await?;

    // Step 4: host ConfigMap.
    configmap::reconcile_config_map(ctx.client.clone(), &host.address.namespace, &desired_config_map, true, &ctx.config.field_manager).await?;

    // Step 5: host StatefulSet, with a PVC reconcile wired into the
    // delete-then-recreate fallback so a resize survives recreation.
    let reconcile_pvcs = || async {
        for mount in &host.volume_mounts {
            let name = pvc_name(&mount.template.name, host);
            pvc::reconcile_pvc(ctx.client.clone(), &host.address.namespace, &name, &mount.template.requests, &ctx.config.field_manager).await?;
        }
        Ok(())
    };
    statefulset::reconcile_stateful_set(ctx.client.clone(), &host.address.namespace, &desired_stateful_set, &ctx.config.field_manager, reconcile_pvcs).await?;

    // Step 6: host PersistentVolumes.
    reconcile_persistent_volumes(ctx, host).await?;

    // Step 7: host Service.
    service::reconcile_service(ctx.client.clone(), &host.address.namespace, desired_service, &ctx.config.field_manager).await?;

    // Step 8: clear the host's Add flag.
    attrs.entry(host.address.clone()).and_modify(|a| a.remove(ReconcileAttributes::ADD));

    // Step 9: schema migration, best-effort (spec §7: Schemer errors are
    // logged and swallowed, never abort the outer reconcile).
    let migrate = is_update && attrs.get(&host.address).copied().unwrap_or_default().contains(ReconcileAttributes::MIGRATE);
    if migrate {
        if let Err(e) = ctx.schemer.host_create_tables(&host.address).await {
            let _ = ctx
                .announcer
                .announce(EventType::Warning, "Reconcile", &format!("schema migration for {} failed: {e}", host.address))
                .await;
        }
    }

    // Step 10: Include.
    include(ctx, chi, shard, host, attrs, status, is_cancelled).await?;

    // Step 11: mark Reconciled.
    attrs.entry(host.address.clone()).and_modify(|a| *a |= ReconcileAttributes::RECONCILED).or_insert(ReconcileAttributes::RECONCILED);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::{ClusterAddress, ShardAddress};
    use crate::model::tree::new_host;

    fn chi_with_policy(policy: ReconcileWaitPolicy) -> Chi {
        Chi {
            namespace: "ns".into(),
            name: "c1".into(),
            resource_version: "1".into(),
            deletion_timestamp: None,
            finalizers: vec![],
            stop: false,
            reconcile_wait_policy: policy,
            clusters: vec![],
        }
    }

    fn shard_with_hosts(count: usize) -> Shard {
        let hosts: Vec<Host> = (0..count)
            .map(|i| new_host("ns", "c1", "main", 0, 0, i, "img", "hash"))
            .collect();
        Shard {
            address: ShardAddress {
                namespace: "ns".into(),
                chi_name: "c1".into(),
                cluster_name: "main".into(),
                cluster_index: 0,
                shard_index: 0,
            },
            internal_replication: true,
            hosts,
        }
    }

    #[test]
    fn single_host_shard_never_waits() {
        let chi = chi_with_policy(ReconcileWaitPolicy::Wait);
        let shard = shard_with_hosts(1);
        assert!(!should_wait_exclude_host(&chi, &shard, WorkloadStatus::Modified, true));
        assert!(!should_wait_include_host(&chi, &shard, WorkloadStatus::Modified, true));
    }

    #[test]
    fn new_or_same_status_never_waits() {
        let chi = chi_with_policy(ReconcileWaitPolicy::Wait);
        let shard = shard_with_hosts(3);
        assert!(!should_wait_exclude_host(&chi, &shard, WorkloadStatus::New, true));
        assert!(!should_wait_exclude_host(&chi, &shard, WorkloadStatus::Same, true));
    }

    #[test]
    fn no_wait_policy_overrides_operator_default() {
        let chi = chi_with_policy(ReconcileWaitPolicy::NoWait);
        let shard = shard_with_hosts(3);
        assert!(!should_wait_exclude_host(&chi, &shard, WorkloadStatus::Modified, true));
    }

    #[test]
    fn default_policy_defers_to_operator_configuration() {
        let chi = chi_with_policy(ReconcileWaitPolicy::Default);
        let shard = shard_with_hosts(3);
        assert!(should_wait_exclude_host(&chi, &shard, WorkloadStatus::Modified, true));
        assert!(!should_wait_exclude_host(&chi, &shard, WorkloadStatus::Modified, false));
    }
}
