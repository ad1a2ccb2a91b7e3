//! The Normalizer (spec §1, "external collaborator"): turns the as-submitted
//! `ClickHouseInstallationSpec` into the canonical `model::tree::Chi` the
//! rest of the reconcile core walks. Template/default merging (CHIT
//! inheritance) is out of scope (spec Non-goals) — this is the minimal,
//! literal expansion of `configuration.clusters[].layout` into shards/hosts.

use crate::crd::chi::{ClickHouseInstallation, ReconcilePolicy};
use crate::error::{Error, Result};
use crate::model::address::{derive_host_name, Address, ClusterAddress};
use crate::model::tree::{Chi, Cluster, Host, ReconcileWaitPolicy, Shard, VolumeClaimTemplate, VolumeMount};
use kube::ResourceExt;

/// Default image used when no pod template names one explicitly. Real
/// deployments are expected to always set `templates.podTemplates`; this is
/// only a last-resort fallback so a minimal CHI still normalizes.
const DEFAULT_IMAGE: &str = "clickhouse/clickhouse-server:latest";

pub fn normalize(chi: &ClickHouseInstallation) -> Result<Chi> {
    let namespace = chi
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(chi.name_any()))?;
    let name = chi.name_any();

    let image = chi
        .spec
        .templates
        .as_ref()
        .and_then(|t| t.pod_templates.first())
        .and_then(|p| p.image.clone())
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

    let volume_mounts = volume_mounts_from_templates(chi);

    let mut clusters = Vec::new();
    for (cluster_index, cluster_spec) in chi.spec.configuration.clusters.iter().enumerate() {
        let cluster_address = ClusterAddress {
            namespace: namespace.clone(),
            chi_name: name.clone(),
            cluster_name: cluster_spec.name.clone(),
            cluster_index,
        };

        let layout = cluster_spec.layout.clone().unwrap_or_default();
        let shards_count = layout.shards_count.unwrap_or(1).max(0) as usize;
        let default_replicas = layout.replicas_count.unwrap_or(1).max(0) as usize;

        let mut shards = Vec::new();
        for shard_index in 0..shards_count {
            let shard_spec = layout.shards.as_ref().and_then(|s| s.get(shard_index));
            let replicas_count = shard_spec
                .and_then(|s| s.replicas_count)
                .map(|r| r.max(0) as usize)
                .unwrap_or(default_replicas);
            let internal_replication = shard_spec.and_then(|s| s.internal_replication).unwrap_or(true);

            let mut hosts = Vec::new();
            for replica_index in 0..replicas_count {
                let host_name = shard_spec
                    .and_then(|s| s.replicas.as_ref())
                    .and_then(|r| r.get(replica_index))
                    .and_then(|r| r.name.clone())
                    .unwrap_or_else(|| {
                        derive_host_name(&name, &cluster_spec.name, shard_index, replica_index)
                    });

                hosts.push(Host {
                    address: Address {
                        namespace: namespace.clone(),
                        chi_name: name.clone(),
                        cluster_name: cluster_spec.name.clone(),
                        cluster_index,
                        shard_index,
                        replica_index,
                        host_name,
                    },
                    image: image.clone(),
                    volume_mounts: volume_mounts.clone(),
                    spec_hash: spec_hash(chi),
                });
            }

            shards.push(Shard {
                address: crate::model::address::ShardAddress {
                    namespace: namespace.clone(),
                    chi_name: name.clone(),
                    cluster_name: cluster_spec.name.clone(),
                    cluster_index,
                    shard_index,
                },
                internal_replication,
                hosts,
            });
        }

        clusters.push(Cluster {
            address: cluster_address,
            shards,
        });
    }

    let wait_policy = match chi.spec.reconciling.as_ref().and_then(|r| r.policy) {
        Some(ReconcilePolicy::Wait) => ReconcileWaitPolicy::Wait,
        Some(ReconcilePolicy::NoWait) => ReconcileWaitPolicy::NoWait,
        None => ReconcileWaitPolicy::Default,
    };

    Ok(Chi {
        namespace,
        name,
        resource_version: chi.resource_version().unwrap_or_default(),
        deletion_timestamp: chi.meta().deletion_timestamp.clone(),
        finalizers: chi.meta().finalizers.clone().unwrap_or_default(),
        stop: chi.spec.is_stopped(),
        reconcile_wait_policy: wait_policy,
        clusters,
    })
}

/// Expand `templates.volumeClaimTemplates` into the `VolumeMount`s every
/// host gets (spec §4.5.4). Per-template selection (a host choosing a
/// subset of the CHI's templates) isn't modeled by the as-submitted spec
/// (spec Non-goals) — every host mounts every declared template, same as
/// `image` falls back to the CHI's first pod template.
fn volume_mounts_from_templates(chi: &ClickHouseInstallation) -> Vec<VolumeMount> {
    chi.spec
        .templates
        .as_ref()
        .map(|t| &t.volume_claim_templates)
        .into_iter()
        .flatten()
        .map(|vct| {
            let requests = vct
                .spec
                .resources
                .as_ref()
                .and_then(|r| r.requests.clone())
                .unwrap_or_default();
            VolumeMount {
                mount_name: vct.name.clone(),
                template: VolumeClaimTemplate {
                    name: vct.name.clone(),
                    requests,
                },
            }
        })
        .collect()
}

/// A coarse content hash used to classify a host's workload as
/// New/Same/Modified (spec §4.6). Hashing the whole CHI spec is
/// conservative — any spec change anywhere bumps every host's hash — but is
/// simple and correct; a per-host hash is a possible refinement, not
/// required by the spec.
fn spec_hash(chi: &ClickHouseInstallation) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    // `ClickHouseInstallationSpec` doesn't derive `Hash` (it embeds
    // schema-only types); hash its serialized form instead.
    if let Ok(bytes) = serde_json::to_vec(&chi.spec) {
        bytes.hash(&mut hasher);
    }
    format!("{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::chi::{ClusterSpec, ConfigurationSpec, LayoutSpec};
    use kube::core::ObjectMeta;

    fn minimal_chi() -> ClickHouseInstallation {
        ClickHouseInstallation {
            metadata: ObjectMeta {
                name: Some("c1".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: crate::crd::chi::ClickHouseInstallationSpec {
                configuration: ConfigurationSpec {
                    clusters: vec![ClusterSpec {
                        name: "main".to_string(),
                        layout: Some(LayoutSpec {
                            shards_count: Some(2),
                            replicas_count: Some(1),
                            shards: None,
                        }),
                    }],
                },
                templates: None,
                defaults: None,
                stop: None,
                reconciling: None,
            },
            status: None,
        }
    }

    #[test]
    fn normalize_expands_layout_into_shards_and_hosts() {
        let chi = minimal_chi();
        let tree = normalize(&chi).unwrap();
        assert_eq!(tree.clusters.len(), 1);
        assert_eq!(tree.clusters[0].shards.len(), 2);
        assert_eq!(tree.host_count(), 2);
    }

    #[test]
    fn normalize_derives_deterministic_host_names() {
        let chi = minimal_chi();
        let tree = normalize(&chi).unwrap();
        let host = &tree.clusters[0].shards[0].hosts[0];
        assert_eq!(host.address.host_name, "c1-main-0-0");
    }

    #[test]
    fn missing_namespace_is_rejected() {
        let mut chi = minimal_chi();
        chi.metadata.namespace = None;
        assert!(normalize(&chi).is_err());
    }

    #[test]
    fn normalize_populates_volume_mounts_from_templates() {
        use crate::crd::chi::{TemplatesSpec, VolumeClaimTemplateSpec};
        use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;

        let mut chi = minimal_chi();
        chi.spec.templates = Some(TemplatesSpec {
            volume_claim_templates: vec![VolumeClaimTemplateSpec {
                name: "data".to_string(),
                spec: PersistentVolumeClaimSpec::default(),
            }],
            pod_templates: Vec::new(),
        });

        let tree = normalize(&chi).unwrap();
        for host in tree.hosts() {
            assert_eq!(host.volume_mounts.len(), 1);
            assert_eq!(host.volume_mounts[0].mount_name, "data");
            assert_eq!(host.volume_mounts[0].template.name, "data");
        }
    }
}
