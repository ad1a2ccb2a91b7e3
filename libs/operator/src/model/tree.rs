use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::model::address::{derive_host_name, Address, ClusterAddress, ShardAddress};

/// Wait policy carried on the CHI spec for the exclude/include state
/// machine (spec §4.5.1). `Default` defers to the operator's configured
/// `reconcile_wait_exclude`/`reconcile_wait_include` booleans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReconcileWaitPolicy {
    Wait,
    NoWait,
    #[default]
    Default,
}

/// A single named PVC template as declared on the CHI (or inherited from a
/// cluster/pod template); `requests` is the desired resource quantities.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeClaimTemplate {
    pub name: String,
    pub requests: BTreeMap<String, Quantity>,
}

/// A volume mount on a host that references one of the CHI's
/// `VolumeClaimTemplate`s by name.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMount {
    pub mount_name: String,
    pub template: VolumeClaimTemplate,
}

/// A single ClickHouse server process (spec model §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    pub address: Address,
    pub image: String,
    pub volume_mounts: Vec<VolumeMount>,
    /// Opaque digest of everything that would cause a StatefulSet spec diff
    /// (image, resources, config references). Compared by value, not
    /// recomputed here — the normalizer is the single source of this hash.
    pub spec_hash: String,
}

impl Host {
    pub fn host_name(&self) -> &str {
        &self.address.host_name
    }
}

/// A data-partition group; its hosts are replicas of each other.
#[derive(Clone, Debug, PartialEq)]
pub struct Shard {
    pub address: ShardAddress,
    pub internal_replication: bool,
    pub hosts: Vec<Host>,
}

impl Shard {
    /// §4.5.1 / §8 invariant 5: a single-replica shard never waits on
    /// exclude/include, since there is no peer to take over traffic.
    pub fn has_single_host(&self) -> bool {
        self.hosts.len() == 1
    }
}

/// A cluster: a named set of shards.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub address: ClusterAddress,
    pub shards: Vec<Shard>,
}

impl Cluster {
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.shards.iter().flat_map(|s| s.hosts.iter())
    }
}

/// The normalized CHI: defaults applied, templates resolved, addresses
/// assigned. Produced by the Normalizer (§6, external collaborator).
#[derive(Clone, Debug, PartialEq)]
pub struct Chi {
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
    pub deletion_timestamp: Option<Time>,
    pub finalizers: Vec<String>,
    pub stop: bool,
    pub reconcile_wait_policy: ReconcileWaitPolicy,
    pub clusters: Vec<Cluster>,
}

impl Chi {
    pub fn is_live(&self) -> bool {
        self.deletion_timestamp.is_none()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.clusters.iter().flat_map(|c| c.hosts())
    }

    pub fn host_count(&self) -> usize {
        self.hosts().count()
    }

    pub fn find_shard(&self, addr: &ShardAddress) -> Option<&Shard> {
        self.clusters
            .iter()
            .find(|c| c.address == addr.cluster_address())
            .and_then(|c| c.shards.iter().find(|s| s.address == *addr))
    }
}

impl ShardAddress {
    fn cluster_address(&self) -> ClusterAddress {
        ClusterAddress {
            namespace: self.namespace.clone(),
            chi_name: self.chi_name.clone(),
            cluster_name: self.cluster_name.clone(),
            cluster_index: self.cluster_index,
        }
    }
}

/// Builds a deterministic `Host` for tests and the default normalizer: a
/// thin convenience, not part of the spec surface.
pub fn new_host(
    namespace: &str,
    chi_name: &str,
    cluster_name: &str,
    cluster_index: usize,
    shard_index: usize,
    replica_index: usize,
    image: &str,
    spec_hash: &str,
) -> Host {
    let host_name = derive_host_name(chi_name, cluster_name, shard_index, replica_index);
    Host {
        address: Address {
            namespace: namespace.to_string(),
            chi_name: chi_name.to_string(),
            cluster_name: cluster_name.to_string(),
            cluster_index,
            shard_index,
            replica_index,
            host_name,
        },
        image: image.to_string(),
        volume_mounts: Vec::new(),
        spec_hash: spec_hash.to_string(),
    }
}
