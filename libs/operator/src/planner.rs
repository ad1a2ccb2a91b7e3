//! The action planner (spec §4.2): a structural diff of two normalized CHIs
//! over cluster/shard/host, plus the stamping of `ReconcileAttributes` that
//! consumers use to decide what work a host actually needs.

use crate::model::attributes::{AttributesTable, ReconcileAttributes};
use crate::model::plan::ActionPlan;
use crate::model::tree::Chi;

/// Diff `old` (nullable) against `new`. If `old` is `None` every node in
/// `new` is `Added`. Otherwise identity at each level is by address; a
/// "modified" cluster/shard is purely informational — concrete per-host
/// effects are produced by walking that cluster/shard's hosts separately,
/// so a host can be `Modified` even under an address-identical, spec-equal
/// parent shard, and vice versa.
pub fn plan(old: Option<&Chi>, new: &Chi) -> ActionPlan {
    let mut out = ActionPlan::default();

    let Some(old) = old else {
        for cluster in &new.clusters {
            out.clusters_added.push(cluster.address.clone());
            for shard in &cluster.shards {
                out.shards_added.push(shard.address.clone());
                for host in &shard.hosts {
                    out.hosts_added.push(host.address.clone());
                }
            }
        }
        return out;
    };

    for cluster in &new.clusters {
        match old.clusters.iter().find(|c| c.address == cluster.address) {
            None => out.clusters_added.push(cluster.address.clone()),
            Some(old_cluster) if old_cluster != cluster => out.clusters_modified.push(cluster.address.clone()),
            Some(_) => {}
        }

        for shard in &cluster.shards {
            let old_shard = old
                .clusters
                .iter()
                .find(|c| c.address == cluster.address)
                .and_then(|c| c.shards.iter().find(|s| s.address == shard.address));
            match old_shard {
                None => out.shards_added.push(shard.address.clone()),
                Some(old_shard) if old_shard != shard => out.shards_modified.push(shard.address.clone()),
                Some(_) => {}
            }

            for host in &shard.hosts {
                let old_host = old_shard.and_then(|s| s.hosts.iter().find(|h| h.address == host.address));
                match old_host {
                    None => out.hosts_added.push(host.address.clone()),
                    Some(old_host) if old_host != host => out.hosts_modified.push(host.address.clone()),
                    Some(_) => {}
                }
            }
        }
    }

    for cluster in &old.clusters {
        if !new.clusters.iter().any(|c| c.address == cluster.address) {
            out.clusters_removed.push(cluster.address.clone());
        }
        for shard in &cluster.shards {
            let still_present = new
                .clusters
                .iter()
                .find(|c| c.address == cluster.address)
                .map(|c| c.shards.iter().any(|s| s.address == shard.address))
                .unwrap_or(false);
            if !still_present {
                out.shards_removed.push(shard.address.clone());
            }
            for host in &shard.hosts {
                let host_still_present = new
                    .clusters
                    .iter()
                    .find(|c| c.address == cluster.address)
                    .and_then(|c| c.shards.iter().find(|s| s.address == shard.address))
                    .map(|s| s.hosts.iter().any(|h| h.address == host.address))
                    .unwrap_or(false);
                if !host_still_present {
                    out.hosts_removed.push(host.address.clone());
                }
            }
        }
    }

    out
}

/// Build the per-host `ReconcileAttributes` side table for `new`, given the
/// plan and whether this is an update reconcile (both old and new CHI
/// present). Cluster/shard callbacks are no-ops on attributes per spec
/// §4.2 ("only at host granularity").
pub fn attributes_for(plan: &ActionPlan, new: &Chi, is_update: bool) -> AttributesTable {
    let mut table = AttributesTable::new();

    plan.walk_added(
        new,
        |_cluster| {},
        |_shard| {},
        |host| {
            table
                .entry(host.address.clone())
                .or_default()
                .insert(ReconcileAttributes::ADD);
        },
    );
    plan.walk_modified(
        new,
        |_cluster| {},
        |_shard| {},
        |host| {
            table
                .entry(host.address.clone())
                .or_default()
                .insert(ReconcileAttributes::MODIFY);
        },
    );

    if is_update {
        for host in new.hosts() {
            table
                .entry(host.address.clone())
                .or_default()
                .insert(ReconcileAttributes::MIGRATE);
        }
    }

    for host in new.hosts() {
        let attrs = table.entry(host.address.clone()).or_default();
        if attrs.is_unmarked() {
            attrs.insert(ReconcileAttributes::UNCLEAR);
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::{new_host, Cluster, Shard};

    fn chi_with_hosts(namespace: &str, chi_name: &str, shard_hosts: &[usize]) -> Chi {
        let cluster_name = "main";
        let shards = shard_hosts
            .iter()
            .enumerate()
            .map(|(shard_index, &replicas)| {
                let hosts = (0..replicas)
                    .map(|replica_index| {
                        new_host(
                            namespace,
                            chi_name,
                            cluster_name,
                            0,
                            shard_index,
                            replica_index,
                            "clickhouse/clickhouse-server:24",
                            "hash-v1",
                        )
                    })
                    .collect();
                Shard {
                    address: crate::model::address::ShardAddress {
                        namespace: namespace.to_string(),
                        chi_name: chi_name.to_string(),
                        cluster_name: cluster_name.to_string(),
                        cluster_index: 0,
                        shard_index,
                    },
                    internal_replication: true,
                    hosts,
                }
            })
            .collect();
        Chi {
            namespace: namespace.to_string(),
            name: chi_name.to_string(),
            resource_version: "1".to_string(),
            deletion_timestamp: None,
            finalizers: vec![],
            stop: false,
            reconcile_wait_policy: Default::default(),
            clusters: vec![Cluster {
                address: crate::model::address::ClusterAddress {
                    namespace: namespace.to_string(),
                    chi_name: chi_name.to_string(),
                    cluster_name: cluster_name.to_string(),
                    cluster_index: 0,
                },
                shards,
            }],
        }
    }

    #[test]
    fn plan_with_no_old_marks_everything_added() {
        let new = chi_with_hosts("ns", "c1", &[2]);
        let p = plan(None, &new);
        assert_eq!(p.hosts_added.len(), 2);
        assert!(p.hosts_modified.is_empty());
        assert!(p.hosts_removed.is_empty());
    }

    #[test]
    fn plan_a_a_is_empty() {
        let a = chi_with_hosts("ns", "c1", &[2]);
        let p = plan(Some(&a), &a);
        assert!(p.is_empty());
    }

    #[test]
    fn scale_shard_adds_one_host_only() {
        let old = chi_with_hosts("ns", "c1", &[2]);
        let new = chi_with_hosts("ns", "c1", &[3]);
        let p = plan(Some(&old), &new);
        assert_eq!(p.hosts_added.len(), 1);
        assert!(p.hosts_modified.is_empty());
        assert!(p.hosts_removed.is_empty());
    }

    #[test]
    fn attributes_mark_migrate_on_update_and_unclear_when_unmarked() {
        let old = chi_with_hosts("ns", "c1", &[2]);
        let new = chi_with_hosts("ns", "c1", &[3]);
        let p = plan(Some(&old), &new);
        let table = attributes_for(&p, &new, true);
        let host0 = &new.clusters[0].shards[0].hosts[0].address;
        let host2 = &new.clusters[0].shards[0].hosts[2].address;
        assert!(table[host0].contains(ReconcileAttributes::MIGRATE));
        assert!(table[host0].contains(ReconcileAttributes::UNCLEAR));
        assert!(!table[host0].contains(ReconcileAttributes::ADD));
        assert!(table[host2].contains(ReconcileAttributes::ADD));
        assert!(table[host2].contains(ReconcileAttributes::MIGRATE));
    }

    #[test]
    fn single_replica_shard_never_waits() {
        let chi = chi_with_hosts("ns", "c1", &[1]);
        assert!(chi.clusters[0].shards[0].has_single_host());
    }
}
