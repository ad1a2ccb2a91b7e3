use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::chi::ClickHouseInstallationSpec;

/// A reusable template that a `ClickHouseInstallation` can reference from
/// its `templates`/`defaults` sections. Its normalization/merge semantics
/// are the Normalizer's concern (external collaborator, spec §1); this
/// operator only needs to recognize the object well enough to dispatch a
/// `ReconcileChit` command (spec §4.1) — reconciling a CHIT re-triggers
/// reconciliation of every CHI that references it, which is out of scope
/// here (left to the informer/watch wiring in `cmd/operator`).
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clickhouse.altinity.com",
    version = "v1",
    kind = "ClickHouseInstallationTemplate",
    shortname = "chit",
    namespaced
)]
pub struct ClickHouseInstallationTemplateSpec {
    #[serde(flatten)]
    pub template: ClickHouseInstallationSpec,
}
