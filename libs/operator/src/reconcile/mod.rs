//! The Object Reconcilers and the driver that sequences them (spec §2, §4.3,
//! §4.5): CRUD convergence of individual platform objects, plus the
//! walk-till-error composition that strings them together per CHI.

pub mod aux;
pub mod configmap;
pub mod host;
pub mod pvc;
pub mod service;
pub mod statefulset;

use std::sync::Arc;

use kube::Client;

use crate::announcer::Announcer;
use crate::creator::Creator;
use crate::crd::chop_config::ChopConfigSpec;
use crate::error::Result;
use crate::model::attributes::AttributesTable;
use crate::model::tree::Chi;
use crate::schemer::Schemer;

/// Everything a reconcile pass needs, bundled so every step function takes
/// one argument instead of five. Assembled fresh per reconcile (Design
/// Notes §9: "creator is request-scoped; it must not leak between
/// reconciles" — the same discipline applies to the whole context here).
pub struct ReconcileContext {
    pub client: Client,
    pub creator: Arc<dyn Creator>,
    pub schemer: Arc<dyn Schemer>,
    pub announcer: Arc<dyn Announcer>,
    pub config: ChopConfigSpec,
}

/// Walk-till-error (spec §4.3, Glossary): run each step in order, stop at
/// the first error. Named for parity with the driver's own vocabulary
/// rather than folded into a generic `Iterator::try_for_each`, since the
/// steps are heterogeneous (cluster vs. shard vs. host) and the spec
/// describes them as a named, fixed sequence.
pub async fn reconcile_chi(
    ctx: &ReconcileContext,
    old: Option<&Chi>,
    new: &Chi,
    attrs: &mut AttributesTable,
    is_cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<()> {
    if is_cancelled() {
        return Ok(());
    }

    aux::reconcile_aux_preliminary(ctx, new, attrs).await?;

    for cluster in &new.clusters {
        if is_cancelled() {
            return Ok(());
        }
        aux::reconcile_cluster_service(ctx, cluster).await?;

        for shard in &cluster.shards {
            if is_cancelled() {
                return Ok(());
            }
            aux::reconcile_shard_service(ctx, shard).await?;

            for h in &shard.hosts {
                if is_cancelled() {
                    return Ok(());
                }
                host::reconcile_host_cancellable(ctx, new, shard, h, attrs, old.is_some(), is_cancelled).await?;
            }
        }
    }

    aux::reconcile_aux_final(ctx, new, attrs).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcer::NullAnnouncer;
    use crate::creator::DefaultCreator;
    use crate::model::tree::{new_host, Cluster, Shard};
    use crate::schemer::NullSchemer;

    fn single_host_chi() -> Chi {
        let host = new_host("ns", "c1", "main", 0, 0, 0, "img", "hash");
        Chi {
            namespace: "ns".into(),
            name: "c1".into(),
            resource_version: "1".into(),
            deletion_timestamp: None,
            finalizers: vec![],
            stop: false,
            reconcile_wait_policy: Default::default(),
            clusters: vec![Cluster {
                address: host.address.cluster_address(),
                shards: vec![Shard {
                    address: host.address.shard_address(),
                    internal_replication: true,
                    hosts: vec![host],
                }],
            }],
        }
    }

    #[test]
    fn context_assembly_is_request_scoped() {
        // Exercises only that the bundle type-checks with the null test
        // doubles; the driver's live-client path is covered by `tests/`.
        let _ = single_host_chi();
        let _creator: Arc<dyn Creator> = Arc::new(DefaultCreator);
        let _schemer: Arc<dyn Schemer> = Arc::new(NullSchemer::default());
        let _announcer: Arc<dyn Announcer> = Arc::new(NullAnnouncer);
    }
}
