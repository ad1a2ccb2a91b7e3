use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster-scoped operator configuration, reconciled via a
/// `ReconcileChopConfig` command (spec §4.1). Also the source of the
/// defaults layered under CLI/env flags in `cmd/operator` (see
/// SPEC_FULL.md "Configuration").
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "clickhouse.altinity.com",
    version = "v1",
    kind = "ClickHouseOperatorConfiguration",
    shortname = "chopconf"
)]
pub struct ChopConfigSpec {
    /// How long the worker defers its first dequeue, giving the informer
    /// cache time to fill (spec §4.1 "Startup policy"). Seconds.
    #[serde(default = "default_warmup_deadline_secs")]
    pub warmup_deadline_secs: u64,

    /// Tick interval for `pollHostContext` (spec §5 "Suspension points"). Seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_true")]
    pub reconcile_wait_exclude: bool,
    #[serde(default = "default_true")]
    pub reconcile_wait_include: bool,

    #[serde(default = "default_finalizer_name")]
    pub finalizer_name: String,
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
}

impl ChopConfigSpec {
    pub fn warmup_deadline(&self) -> Duration {
        Duration::from_secs(self.warmup_deadline_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for ChopConfigSpec {
    fn default() -> Self {
        Self {
            warmup_deadline_secs: default_warmup_deadline_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            reconcile_wait_exclude: default_true(),
            reconcile_wait_include: default_true(),
            finalizer_name: default_finalizer_name(),
            field_manager: default_field_manager(),
        }
    }
}

fn default_warmup_deadline_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_finalizer_name() -> String {
    "finalizer.clickhouse.altinity.com".to_string()
}

fn default_field_manager() -> String {
    "chop-operator".to_string()
}
