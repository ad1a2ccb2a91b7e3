use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The declarative ClickHouse cluster-of-clusters aggregate (spec model §3).
///
/// Normalization/templating is an external collaborator (spec §1); this type
/// is the as-submitted shape the Normalizer consumes, not the canonical tree
/// the reconcile core actually walks (see `model::tree::Chi`).
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clickhouse.altinity.com",
    version = "v1",
    kind = "ClickHouseInstallation",
    shortname = "chi",
    namespaced
)]
#[kube(status = "ClickHouseInstallationStatus")]
pub struct ClickHouseInstallationSpec {
    pub configuration: ConfigurationSpec,
    #[serde(default)]
    pub templates: Option<TemplatesSpec>,
    #[serde(default)]
    pub defaults: Option<DefaultsSpec>,
    /// "yes"/"true" stops the installation: the entry-point Service is torn
    /// down and no host is reconciled further (spec §4.3 step 1).
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub reconciling: Option<ReconcilingSpec>,
}

impl ClickHouseInstallationSpec {
    pub fn is_stopped(&self) -> bool {
        matches!(self.stop.as_deref(), Some("yes") | Some("true") | Some("1"))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ConfigurationSpec {
    pub clusters: Vec<ClusterSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default)]
    pub layout: Option<LayoutSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct LayoutSpec {
    #[serde(default, rename = "shardsCount")]
    pub shards_count: Option<i32>,
    #[serde(default, rename = "replicasCount")]
    pub replicas_count: Option<i32>,
    #[serde(default)]
    pub shards: Option<Vec<ShardSpec>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ShardSpec {
    #[serde(default, rename = "replicasCount")]
    pub replicas_count: Option<i32>,
    #[serde(default, rename = "internalReplication")]
    pub internal_replication: Option<bool>,
    #[serde(default)]
    pub replicas: Option<Vec<ReplicaSpec>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ReplicaSpec {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct TemplatesSpec {
    #[serde(default, rename = "volumeClaimTemplates")]
    pub volume_claim_templates: Vec<VolumeClaimTemplateSpec>,
    #[serde(default, rename = "podTemplates")]
    pub pod_templates: Vec<PodTemplateSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct VolumeClaimTemplateSpec {
    pub name: String,
    pub spec: PersistentVolumeClaimSpec,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct PodTemplateSpec {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct DefaultsSpec {
    #[serde(default, rename = "templates")]
    pub templates: Option<DefaultTemplatesSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct DefaultTemplatesSpec {
    #[serde(default, rename = "podTemplate")]
    pub pod_template: Option<String>,
    #[serde(default, rename = "volumeClaimTemplate")]
    pub volume_claim_template: Option<String>,
}

/// The CHI-level wait policy for the host exclude/include state machine
/// (spec §4.5.1).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReconcilePolicy {
    Wait,
    NoWait,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ReconcilingSpec {
    #[serde(default)]
    pub policy: Option<ReconcilePolicy>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReconcilePhase {
    ReconcileStart,
    ReconcileComplete,
    DeleteStart,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ActionLogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

/// Maximum number of entries kept in `Status.action_log`: an unbounded
/// append would eventually exceed the CHI object's etcd size limit.
pub const ACTION_LOG_CAPACITY: usize = 20;

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ClickHouseInstallationStatus {
    #[serde(default)]
    pub phase: Option<ReconcilePhase>,
    #[serde(default, rename = "addedHostsCount")]
    pub added_hosts_count: i32,
    #[serde(default, rename = "updatedHostsCount")]
    pub updated_hosts_count: i32,
    #[serde(default, rename = "deletedHostsCount")]
    pub deleted_hosts_count: i32,
    #[serde(default, rename = "hostsToDeleteCount")]
    pub hosts_to_delete_count: i32,
    #[serde(default, rename = "actionLog")]
    pub action_log: VecDeque<ActionLogEntry>,
}

impl ClickHouseInstallationStatus {
    pub fn push_action(&mut self, message: impl Into<String>) {
        if self.action_log.len() >= ACTION_LOG_CAPACITY {
            self.action_log.pop_front();
        }
        self.action_log.push_back(ActionLogEntry {
            time: Utc::now(),
            message: message.into(),
        });
    }
}
