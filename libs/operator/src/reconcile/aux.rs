//! Aux Object Reconciler (spec §4.4): the installation-wide entry-point
//! Service and the two shared ConfigMaps (common topology, common users),
//! reconciled in a preliminary pass (create-without-update) and a final
//! pass (update enabled) that brackets the per-host walk.

use crate::creator::RemoteServersOptions;
use crate::error::Result;
use crate::model::attributes::AttributesTable;
use crate::model::tree::{Chi, Cluster, Shard};

use super::{configmap, service, ReconcileContext};

/// Spec §4.3 step 1: ensure the entry-point Service (or delete it if the
/// CHI `IsStopped`), and create — but do not update — the common
/// ConfigMaps, so hosts that mount them on first boot see a consistent
/// topology before any exclude/include dance has touched it.
pub async fn reconcile_aux_preliminary(ctx: &ReconcileContext, chi: &Chi, attrs: &AttributesTable) -> Result<()> {
    if chi.is_stopped() {
        let name = format!("chi-{}-{}", chi.namespace, chi.name);
        let api: kube::Api<k8s_openapi::api::core::v1::Service> = kube::Api::namespaced(ctx.client.clone(), &chi.namespace);
        let _ = api.delete(&name, &Default::default()).await;
    } else {
        let desired = ctx.creator.service_chi(chi);
        service::reconcile_service(ctx.client.clone(), &chi.namespace, desired, &ctx.config.field_manager).await?;
    }

    let common = ctx.creator.config_map_chi_common(chi, attrs, &RemoteServersOptions::default());
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &common, false, &ctx.config.field_manager).await?;

    let users = ctx.creator.config_map_chi_common_users(chi);
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &users, false, &ctx.config.field_manager).await?;

    Ok(())
}

/// Spec §4.3 step 5: update (not merely create) the common ConfigMaps once
/// every host in this reconcile has converged, so topology changes become
/// visible cluster-wide exactly once.
pub async fn reconcile_aux_final(ctx: &ReconcileContext, chi: &Chi, attrs: &AttributesTable) -> Result<()> {
    if chi.is_stopped() {
        return Ok(());
    }
    let common = ctx.creator.config_map_chi_common(chi, attrs, &RemoteServersOptions::default());
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &common, true, &ctx.config.field_manager).await?;

    let users = ctx.creator.config_map_chi_common_users(chi);
    configmap::reconcile_config_map(ctx.client.clone(), &chi.namespace, &users, true, &ctx.config.field_manager).await?;

    Ok(())
}

pub async fn reconcile_cluster_service(ctx: &ReconcileContext, cluster: &Cluster) -> Result<()> {
    let desired = ctx.creator.service_cluster(cluster);
    service::reconcile_service(ctx.client.clone(), &cluster.address.namespace, desired, &ctx.config.field_manager).await
}

pub async fn reconcile_shard_service(ctx: &ReconcileContext, shard: &Shard) -> Result<()> {
    let desired = ctx.creator.service_shard(shard);
    service::reconcile_service(ctx.client.clone(), &shard.address.namespace, desired, &ctx.config.field_manager).await
}
