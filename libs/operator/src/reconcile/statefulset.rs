//! StatefulSet object reconciler (spec §4.5.2): classifies the live
//! workload against the desired one, then converges — falling back to
//! delete-then-recreate (with a PVC reconcile pass in between, so a
//! resize is realized even though the StatefulSet itself is immutable on
//! that axis) when an in-place update fails.

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};

use crate::error::Result;
use crate::model::workload::WorkloadStatus;

fn stateful_set_version(ss: &StatefulSet) -> Option<&str> {
    ss.metadata.labels.as_ref()?.get("StatefulSetVersion").map(String::as_str)
}

/// Classify `current` (if any) against `desired` (spec §4.5.2). `Unknown`
/// covers "fetched, but neither the version-label fast path nor a value
/// spec comparison was conclusive" — in practice this never triggers here
/// since `PartialEq` on `StatefulSetSpec` is total, but the variant is kept
/// to mirror the spec's own fetch-error case, surfaced by the caller
/// instead (a fetch error is not passed into this function at all).
pub fn classify(current: Option<&StatefulSet>, desired: &StatefulSet) -> WorkloadStatus {
    let Some(current) = current else {
        return WorkloadStatus::New;
    };
    match (stateful_set_version(current), stateful_set_version(desired)) {
        (Some(a), Some(b)) if a == b => WorkloadStatus::Same,
        _ if current.spec == desired.spec => WorkloadStatus::Same,
        _ => WorkloadStatus::Modified,
    }
}

/// Converge `desired` against the live object, classifying first so the
/// caller (the host reconciler) can skip the whole step on `Same`.
pub async fn reconcile_stateful_set<F, Fut>(
    client: Client,
    namespace: &str,
    desired: &StatefulSet,
    field_manager: &str,
    reconcile_pvcs: F,
) -> Result<WorkloadStatus>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
    let name = desired.metadata.name.clone().unwrap_or_default();
    let current = api.get_opt(&name).await?;
    let status = classify(current.as_ref(), desired);

    match status {
        WorkloadStatus::Same => return Ok(status),
        WorkloadStatus::New => {
            api.create(&PostParams::default(), desired).await?;
            return Ok(status);
        }
        WorkloadStatus::Modified | WorkloadStatus::Unknown => {
            let pp = PatchParams::apply(field_manager).force();
            if api.patch(&name, &pp, &Patch::Apply(desired)).await.is_err() {
                api.delete(&name, &DeleteParams::default()).await?;
                reconcile_pvcs().await?;
                api.create(&PostParams::default(), desired).await?;
            }
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn labeled(version: &str) -> StatefulSet {
        let mut labels = BTreeMap::new();
        labels.insert("StatefulSetVersion".to_string(), version.to_string());
        StatefulSet {
            metadata: ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            },
            spec: None,
            status: None,
        }
    }

    #[test]
    fn absent_current_is_new() {
        assert_eq!(classify(None, &labeled("hash-v1")), WorkloadStatus::New);
    }

    #[test]
    fn matching_version_label_is_same() {
        let current = labeled("hash-v1");
        let desired = labeled("hash-v1");
        assert_eq!(classify(Some(&current), &desired), WorkloadStatus::Same);
    }

    #[test]
    fn differing_version_label_is_modified() {
        let current = labeled("hash-v1");
        let desired = labeled("hash-v2");
        assert_eq!(classify(Some(&current), &desired), WorkloadStatus::Modified);
    }
}
