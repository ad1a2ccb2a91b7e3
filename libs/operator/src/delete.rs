//! The deletion cascade (spec §4.7, §8 scenario 4): tears down every object
//! a CHI owns, innermost first. Per host: drop its tables via the Schemer
//! (otherwise Zookeeper retains dead replica metadata), then its
//! StatefulSet, ConfigMap, Service, and PVCs. Per shard and per cluster:
//! their headless Services. Finally the CHI-wide common ConfigMaps and the
//! entry-point Service.
//!
//! Per spec §4.7, "errors from individual deletes are logged but do not
//! abort the cascade": every delete here is attempted even if an earlier one
//! failed, so the finalizer manager can always proceed to remove the
//! finalizer once the cascade returns. Each delete treats `NotFound` as
//! success, so a retried cascade (e.g. after an operator restart mid-delete)
//! is idempotent. Schemer errors are likewise logged and swallowed (spec
//! §7): a host whose tables can't be dropped still has its Kubernetes
//! objects torn down.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::api::DeleteParams;
use kube::{Api, Client};
use tracing::warn;

use crate::model::tree::{Chi, Cluster, Shard};
use crate::schemer::Schemer;

fn chi_service_name(chi: &Chi) -> String {
    format!("chi-{}-{}", chi.namespace, chi.name)
}

fn host_stateful_set_name(host_name: &str) -> String {
    format!("chi-{host_name}")
}

fn host_service_name(host_name: &str) -> String {
    format!("chi-{host_name}")
}

fn host_config_map_name(host_name: &str) -> String {
    format!("chi-{host_name}-common-configd")
}

fn pvc_name(template_name: &str, host_name: &str) -> String {
    format!("{template_name}-chi-{host_name}-0")
}

fn cluster_service_name(cluster: &Cluster) -> String {
    format!("cluster-{}-{}", cluster.address.chi_name, cluster.address.cluster_name)
}

fn shard_service_name(shard: &Shard) -> String {
    format!(
        "shard-{}-{}-{}",
        shard.address.chi_name, shard.address.cluster_name, shard.address.shard_index
    )
}

fn common_config_map_name(chi: &Chi) -> String {
    format!("chi-{}-common-configd", chi.name)
}

fn common_users_config_map_name(chi: &Chi) -> String {
    format!("chi-{}-common-usersd", chi.name)
}

/// Delete `name` via `api`, treating `NotFound` as success. Any other
/// failure is logged, not propagated — the cascade never aborts (spec
/// §4.7).
async fn delete_if_present<K>(api: &Api<K>, kind: &str, name: &str)
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => warn!(msg = "delete failed during cascade", kind, name, %e),
    }
}

/// Tear down every object owned by `chi`, in the order spec §8 scenario 4
/// enumerates. Every step is attempted regardless of earlier failures, so
/// `finalizer::remove` can always be called once this returns.
pub async fn cascade(client: Client, schemer: &dyn Schemer, chi: &Chi) {
    let stateful_sets: Api<StatefulSet> = Api::namespaced(client.clone(), &chi.namespace);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &chi.namespace);
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &chi.namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), &chi.namespace);

    for cluster in &chi.clusters {
        for shard in &cluster.shards {
            for host in &shard.hosts {
                if let Err(e) = schemer.host_delete_tables(&host.address).await {
                    warn!(msg = "table drop failed during cascade", host = %host.address, %e);
                }
                delete_if_present(&stateful_sets, "StatefulSet", &host_stateful_set_name(host.host_name())).await;
                delete_if_present(&config_maps, "ConfigMap", &host_config_map_name(host.host_name())).await;
                delete_if_present(&services, "Service", &host_service_name(host.host_name())).await;
                for mount in &host.volume_mounts {
                    delete_if_present(&pvcs, "PersistentVolumeClaim", &pvc_name(&mount.template.name, host.host_name())).await;
                }
            }
            delete_if_present(&services, "Service", &shard_service_name(shard)).await;
        }
        delete_if_present(&services, "Service", &cluster_service_name(cluster)).await;
    }

    delete_if_present(&config_maps, "ConfigMap", &common_config_map_name(chi)).await;
    delete_if_present(&config_maps, "ConfigMap", &common_users_config_map_name(chi)).await;
    delete_if_present(&services, "Service", &chi_service_name(chi)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_deterministic() {
        assert_eq!(host_stateful_set_name("c1-main-0-0"), "chi-c1-main-0-0");
        assert_eq!(host_config_map_name("c1-main-0-0"), "chi-c1-main-0-0-common-configd");
        assert_eq!(pvc_name("data", "c1-main-0-0"), "data-chi-c1-main-0-0-0");
    }
}
