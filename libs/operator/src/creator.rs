//! The Creator (spec §1, §6, external collaborator): a pure builder from
//! normalized model types to desired Kubernetes objects. No I/O happens
//! here — applying/updating/deleting the objects this produces is the
//! in-scope Object Reconcilers' job (`reconcile::{configmap,service,
//! statefulset,pvc}`).

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolume, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::model::address::Address;
use crate::model::attributes::ReconcileAttributes;
use crate::model::tree::{Chi, Cluster, Host, Shard};

/// The config generator's recognized option set (spec §4.4, §9): exactly
/// `ExcludeHost` and `ExcludeReconcileAttributes`. Used to render the
/// `remote_servers` topology so that the exclude/include dance (§4.5.1) can
/// omit a single host, and every not-yet-added host, from the view other
/// hosts see.
#[derive(Clone, Debug, Default)]
pub struct RemoteServersOptions {
    pub exclude_host: Option<Address>,
    pub exclude_reconcile_attributes: ReconcileAttributes,
}

impl RemoteServersOptions {
    pub fn excluding(host: Address) -> Self {
        Self {
            exclude_host: Some(host),
            exclude_reconcile_attributes: ReconcileAttributes::ADD,
        }
    }

    pub fn excluding_unadded_only() -> Self {
        Self {
            exclude_host: None,
            exclude_reconcile_attributes: ReconcileAttributes::ADD,
        }
    }

    fn is_excluded(&self, address: &Address, attrs: ReconcileAttributes) -> bool {
        self.exclude_host.as_ref() == Some(address) || attrs.intersects(self.exclude_reconcile_attributes)
    }
}

fn labels(extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    extra.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Pure builder seam; every method returns the desired object, unowned by
/// any API call.
pub trait Creator: Send + Sync {
    fn service_chi(&self, chi: &Chi) -> Service;
    fn config_map_chi_common(&self, chi: &Chi, attrs: &std::collections::HashMap<Address, ReconcileAttributes>, options: &RemoteServersOptions) -> ConfigMap;
    fn config_map_chi_common_users(&self, chi: &Chi) -> ConfigMap;
    fn service_cluster(&self, cluster: &Cluster) -> Service;
    fn service_shard(&self, shard: &Shard) -> Service;
    fn config_map_host(&self, host: &Host) -> ConfigMap;
    fn stateful_set(&self, host: &Host) -> StatefulSet;
    fn service_host(&self, host: &Host) -> Service;
    fn prepare_persistent_volume(&self, pv: PersistentVolume, host: &Host) -> PersistentVolume;
}

/// The default, in-tree `Creator`: produces minimal-but-valid objects
/// named and labeled deterministically from the model tree. A deployment
/// that needs ClickHouse-specific pod specs, resource templates or
/// annotation schemes swaps this out for its own implementation of the
/// trait; the reconcile core never constructs an object itself.
#[derive(Clone, Copy, Default)]
pub struct DefaultCreator;

fn chi_service_name(chi: &Chi) -> String {
    format!("chi-{}-{}", chi.namespace, chi.name)
}

fn host_stateful_set_name(host: &Host) -> String {
    format!("chi-{}", host.host_name())
}

fn host_config_map_name(host: &Host) -> String {
    format!("chi-{}-common-configd", host.host_name())
}

fn host_service_name(host: &Host) -> String {
    format!("chi-{}", host.host_name())
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

impl Creator for DefaultCreator {
    fn service_chi(&self, chi: &Chi) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(chi_service_name(chi)),
                namespace: Some(chi.namespace.clone()),
                labels: Some(labels(&[("clickhouse.altinity.com/chi", &chi.name)])),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(labels(&[("clickhouse.altinity.com/chi", &chi.name)])),
                ports: Some(vec![ServicePort {
                    name: Some("tcp".to_string()),
                    port: 9000,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn config_map_chi_common(
        &self,
        chi: &Chi,
        attrs: &std::collections::HashMap<Address, ReconcileAttributes>,
        options: &RemoteServersOptions,
    ) -> ConfigMap {
        let mut remote_servers = String::new();
        remote_servers.push_str("<clickhouse><remote_servers>\n");
        for cluster in &chi.clusters {
            remote_servers.push_str(&format!("<{}>\n", cluster.address.cluster_name));
            for shard in &cluster.shards {
                remote_servers.push_str("<shard>\n");
                for host in &shard.hosts {
                    let attr = attrs.get(&host.address).copied().unwrap_or_default();
                    if options.is_excluded(&host.address, attr) {
                        continue;
                    }
                    remote_servers.push_str(&format!("<replica><host>{}</host></replica>\n", host.host_name()));
                }
                remote_servers.push_str("</shard>\n");
            }
            remote_servers.push_str(&format!("</{}>\n", cluster.address.cluster_name));
        }
        remote_servers.push_str("</remote_servers></clickhouse>\n");

        let mut data = BTreeMap::new();
        data.insert("remote_servers.xml".to_string(), remote_servers);

        ConfigMap {
            metadata: ObjectMeta {
                name: Some(format!("chi-{}-common-configd", chi.name)),
                namespace: Some(chi.namespace.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    fn config_map_chi_common_users(&self, chi: &Chi) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(format!("chi-{}-common-usersd", chi.name)),
                namespace: Some(chi.namespace.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::new()),
            ..Default::default()
        }
    }

    fn service_cluster(&self, cluster: &Cluster) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(cluster_service_name(cluster)),
                namespace: Some(cluster.address.namespace.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn service_shard(&self, shard: &Shard) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(shard_service_name(shard)),
                namespace: Some(shard.address.namespace.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn config_map_host(&self, host: &Host) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(host_config_map_name(host)),
                namespace: Some(host.address.namespace.clone()),
                ..Default::default()
            },
            data: Some(BTreeMap::new()),
            ..Default::default()
        }
    }

    fn stateful_set(&self, host: &Host) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(host_stateful_set_name(host)),
                namespace: Some(host.address.namespace.clone()),
                labels: Some(labels(&[
                    ("clickhouse.altinity.com/chi", &host.address.chi_name),
                    ("StatefulSetVersion", &host.spec_hash),
                ])),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(1),
                service_name: host_service_name(host),
                selector: LabelSelector {
                    match_labels: Some(labels(&[("clickhouse.altinity.com/host", host.host_name())])),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels(&[("clickhouse.altinity.com/host", host.host_name())])),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![k8s_openapi::api::core::v1::Container {
                            name: "clickhouse".to_string(),
                            image: Some(host.image.clone()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn service_host(&self, host: &Host) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(host_service_name(host)),
                namespace: Some(host.address.namespace.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                selector: Some(labels(&[("clickhouse.altinity.com/host", host.host_name())])),
                ports: Some(vec![ServicePort {
                    name: Some("tcp".to_string()),
                    port: 9000,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn prepare_persistent_volume(&self, mut pv: PersistentVolume, host: &Host) -> PersistentVolume {
        pv.metadata.labels.get_or_insert_with(Default::default).insert(
            "clickhouse.altinity.com/host".to_string(),
            host.host_name().to_string(),
        );
        pv
    }
}

/// Deterministic per-template PVC name, as consumed by
/// `reconcile::pvc::reconcile_pvc` (spec §4.5.4).
pub fn pvc_name(template_name: &str, host: &Host) -> String {
    format!("{template_name}-chi-{}-0", host.host_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::new_host;

    #[test]
    fn builder_names_are_deterministic() {
        let host = new_host("ns", "c1", "main", 0, 0, 0, "img", "hash");
        let creator = DefaultCreator;
        let ss = creator.stateful_set(&host);
        assert_eq!(ss.metadata.name.as_deref(), Some("chi-c1-main-0-0"));
    }

    #[test]
    fn remote_servers_excludes_marked_host() {
        let host0 = new_host("ns", "c1", "main", 0, 0, 0, "img", "hash");
        let host1 = new_host("ns", "c1", "main", 0, 0, 1, "img", "hash");
        let chi = Chi {
            namespace: "ns".into(),
            name: "c1".into(),
            resource_version: "1".into(),
            deletion_timestamp: None,
            finalizers: vec![],
            stop: false,
            reconcile_wait_policy: Default::default(),
            clusters: vec![Cluster {
                address: host0.address.cluster_address(),
                shards: vec![Shard {
                    address: host0.address.shard_address(),
                    internal_replication: true,
                    hosts: vec![host0.clone(), host1.clone()],
                }],
            }],
        };
        let options = RemoteServersOptions::excluding(host0.address.clone());
        let creator = DefaultCreator;
        let cm = creator.config_map_chi_common(&chi, &std::collections::HashMap::new(), &options);
        let xml = cm.data.unwrap().remove("remote_servers.xml").unwrap();
        assert!(!xml.contains(host0.host_name()));
        assert!(xml.contains(host1.host_name()));
    }
}
