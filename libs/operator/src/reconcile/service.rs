//! Service object reconciler (spec §4.5.3): preserves platform-assigned
//! immutable fields across updates, falling back to delete-then-recreate
//! when the in-place update itself fails.
//!
//! Open question resolution (see DESIGN.md): the recreate fallback fires
//! only when `updateService` itself returns an error, not on every update —
//! the alternative (always recreating) would destroy the ClusterIP/NodePort
//! stability this function exists to preserve.

use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};

use crate::error::Result;

fn is_node_port_like(spec: &k8s_openapi::api::core::v1::ServiceSpec) -> bool {
    matches!(spec.type_.as_deref(), Some("NodePort") | Some("LoadBalancer"))
}

/// Merge platform-assigned fields from `current` into `desired`, in place,
/// per spec §4.5.3. Called before submitting an update so the merged
/// object is what actually gets sent.
pub fn merge_immutable_fields(current: &Service, desired: &mut Service) {
    desired.metadata.resource_version = current.metadata.resource_version.clone();

    if let Some(current_labels) = &current.metadata.labels {
        let merged = desired.metadata.labels.get_or_insert_with(Default::default);
        for (k, v) in current_labels {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    if let Some(current_annotations) = &current.metadata.annotations {
        let merged = desired.metadata.annotations.get_or_insert_with(Default::default);
        for (k, v) in current_annotations {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    if let Some(current_finalizers) = &current.metadata.finalizers {
        let merged = desired.metadata.finalizers.get_or_insert_with(Vec::new);
        for f in current_finalizers {
            if !merged.contains(f) {
                merged.push(f.clone());
            }
        }
    }

    let (Some(current_spec), Some(desired_spec)) = (&current.spec, &mut desired.spec) else {
        return;
    };

    desired_spec.cluster_ip = current_spec.cluster_ip.clone();

    let policies_both_local = current_spec.external_traffic_policy.as_deref() == Some("Local")
        && desired_spec.external_traffic_policy.as_deref() == Some("Local");
    if policies_both_local {
        desired_spec.health_check_node_port = current_spec.health_check_node_port;
    }

    if is_node_port_like(current_spec) && is_node_port_like(desired_spec) {
        if let (Some(current_ports), Some(desired_ports)) = (&current_spec.ports, &mut desired_spec.ports) {
            for desired_port in desired_ports.iter_mut() {
                if let Some(current_port) = current_ports.iter().find(|p| p.port == desired_port.port) {
                    *desired_port = current_port.clone();
                }
            }
        }
    }
}

/// Converge `desired` against the live object: create if absent, else
/// merge immutable fields and update; on update failure, delete and
/// recreate (spec §4.5.3 final sentence).
pub async fn reconcile_service(client: Client, namespace: &str, mut desired: Service, field_manager: &str) -> Result<()> {
    let api: Api<Service> = Api::namespaced(client, namespace);
    let name = desired.metadata.name.clone().unwrap_or_default();

    let Some(current) = api.get_opt(&name).await? else {
        let pp = PostParams::default();
        api.create(&pp, &desired).await?;
        return Ok(());
    };

    merge_immutable_fields(&current, &mut desired);

    let pp = PatchParams::apply(field_manager).force();
    if api.patch(&name, &pp, &Patch::Apply(&desired)).await.is_err() {
        let _ = api.delete(&name, &DeleteParams::default()).await;
        desired.metadata.resource_version = None;
        api.create(&PostParams::default(), &desired).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use kube::core::ObjectMeta;

    fn service_with(cluster_ip: &str, node_port: Option<i32>) -> Service {
        Service {
            metadata: ObjectMeta::default(),
            spec: Some(ServiceSpec {
                cluster_ip: Some(cluster_ip.to_string()),
                ports: Some(vec![ServicePort {
                    port: 9000,
                    node_port,
                    ..Default::default()
                }]),
                type_: Some("NodePort".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn cluster_ip_is_preserved() {
        let current = service_with("10.0.0.5", Some(31000));
        let mut desired = service_with("", None);
        merge_immutable_fields(&current, &mut desired);
        assert_eq!(desired.spec.unwrap().cluster_ip.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn node_port_is_preserved_for_matching_port_number() {
        let current = service_with("10.0.0.5", Some(31000));
        let mut desired = service_with("10.0.0.5", None);
        merge_immutable_fields(&current, &mut desired);
        let port = &desired.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.node_port, Some(31000));
    }
}
