//! PersistentVolumeClaim object reconciler (spec §4.5.4): per-resource-name
//! monotonic update — growth only, and only for resource names present on
//! both the live PVC and the desired template.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use crate::error::Result;

/// Compute the merged `requests` map for `current` against `desired`: for
/// each resource name present in both, take `desired`'s quantity if it
/// differs; names present on only one side are left untouched (spec
/// §4.5.4, §8 invariant 6).
pub fn merged_requests(
    current: &BTreeMap<String, Quantity>,
    desired: &BTreeMap<String, Quantity>,
) -> BTreeMap<String, Quantity> {
    let mut out = current.clone();
    for (name, desired_qty) in desired {
        if let Some(current_qty) = current.get(name) {
            if current_qty.0 != desired_qty.0 {
                out.insert(name.clone(), desired_qty.clone());
            }
        }
    }
    out
}

/// Fetch the PVC named `name` (absence tolerated) and, if present, apply
/// the monotonic `requests` update in place. A PVC that doesn't exist yet
/// is left for the StatefulSet's volume-claim-template machinery to
/// create; this reconciler only handles in-place resizing.
pub async fn reconcile_pvc(
    client: Client,
    namespace: &str,
    name: &str,
    desired_requests: &BTreeMap<String, Quantity>,
    field_manager: &str,
) -> Result<()> {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client, namespace);
    let Some(current) = api.get_opt(name).await? else {
        return Ok(());
    };
    let current_requests = current
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.clone())
        .unwrap_or_default();

    let merged = merged_requests(&current_requests, desired_requests);
    if merged == current_requests {
        return Ok(());
    }

    let patch = serde_json::json!({
        "spec": { "resources": { "requests": merged } }
    });
    let pp = PatchParams::apply(field_manager).force();
    api.patch(name, &pp, &Patch::Merge(&patch)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn shared_resource_name_takes_desired_quantity() {
        let mut current = BTreeMap::new();
        current.insert("storage".to_string(), qty("10Gi"));
        let mut desired = BTreeMap::new();
        desired.insert("storage".to_string(), qty("20Gi"));

        let merged = merged_requests(&current, &desired);
        assert_eq!(merged.get("storage").unwrap().0, "20Gi");
    }

    #[test]
    fn resource_name_present_on_only_one_side_is_unchanged() {
        let mut current = BTreeMap::new();
        current.insert("storage".to_string(), qty("10Gi"));
        current.insert("only-current".to_string(), qty("1Gi"));
        let mut desired = BTreeMap::new();
        desired.insert("storage".to_string(), qty("10Gi"));
        desired.insert("only-desired".to_string(), qty("5Gi"));

        let merged = merged_requests(&current, &desired);
        assert_eq!(merged.get("storage").unwrap().0, "10Gi");
        assert_eq!(merged.get("only-current").unwrap().0, "1Gi");
        assert!(!merged.contains_key("only-desired"));
    }
}
