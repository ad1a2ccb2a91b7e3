//! Status subresource updates (spec §6, §8 scenario 1): the reconcile phase
//! and added/updated/deleted host counters the driver stamps onto a CHI so
//! an observer can see progress (`Status.AddedHostsCount == 2`, etc.)
//! without inspecting the owned objects directly.
//!
//! Grounded on `finalizer.rs`'s JSON-merge-patch approach, applied to the
//! `status` subresource instead of `metadata`.

use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};

use crate::crd::chi::{ClickHouseInstallation, ClickHouseInstallationStatus, ReconcilePhase};
use crate::error::Result;
use crate::model::plan::ActionPlan;

async fn apply(api: &Api<ClickHouseInstallation>, chi: &ClickHouseInstallation, status: ClickHouseInstallationStatus) -> Result<()> {
    let name = chi.name_any();
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

/// Mark the start of a live reconcile (spec §4.1 step before the walk
/// begins).
pub async fn patch_reconcile_start(api: &Api<ClickHouseInstallation>, chi: &ClickHouseInstallation) -> Result<()> {
    let mut status = chi.status.clone().unwrap_or_default();
    status.phase = Some(ReconcilePhase::ReconcileStart);
    status.push_action("reconcile started");
    apply(api, chi, status).await
}

/// Mark a reconcile's completion, stamping the host counters the action
/// plan computed (spec §8 scenario 1).
pub async fn patch_reconcile_complete(api: &Api<ClickHouseInstallation>, chi: &ClickHouseInstallation, plan: &ActionPlan) -> Result<()> {
    let mut status = chi.status.clone().unwrap_or_default();
    status.phase = Some(ReconcilePhase::ReconcileComplete);
    status.added_hosts_count = plan.hosts_added.len() as i32;
    status.updated_hosts_count = plan.hosts_modified.len() as i32;
    status.deleted_hosts_count = 0;
    status.hosts_to_delete_count = plan.hosts_removed.len() as i32;
    status.push_action("reconcile complete");
    apply(api, chi, status).await
}

/// Mark the start of the delete cascade (spec §4.7).
pub async fn patch_delete_start(api: &Api<ClickHouseInstallation>, chi: &ClickHouseInstallation) -> Result<()> {
    let mut status = chi.status.clone().unwrap_or_default();
    status.phase = Some(ReconcilePhase::DeleteStart);
    status.push_action("delete cascade started");
    apply(api, chi, status).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::chi::ACTION_LOG_CAPACITY;

    #[test]
    fn push_action_caps_at_capacity() {
        let mut status = ClickHouseInstallationStatus::default();
        for i in 0..ACTION_LOG_CAPACITY + 5 {
            status.push_action(format!("event {i}"));
        }
        assert_eq!(status.action_log.len(), ACTION_LOG_CAPACITY);
        assert_eq!(status.action_log.back().unwrap().message, format!("event {}", ACTION_LOG_CAPACITY + 4));
    }
}
