use crate::model::address::{Address, ClusterAddress, ShardAddress};
use crate::model::tree::{Chi, Cluster, Host, Shard};

/// The three added/modified/removed sets at each of the three hierarchy
/// levels (spec §4.2). Identity at each level is by address; a host
/// appears in at most one of the host-level sets.
#[derive(Clone, Debug, Default)]
pub struct ActionPlan {
    pub clusters_added: Vec<ClusterAddress>,
    pub clusters_modified: Vec<ClusterAddress>,
    pub clusters_removed: Vec<ClusterAddress>,

    pub shards_added: Vec<ShardAddress>,
    pub shards_modified: Vec<ShardAddress>,
    pub shards_removed: Vec<ShardAddress>,

    pub hosts_added: Vec<Address>,
    pub hosts_modified: Vec<Address>,
    pub hosts_removed: Vec<Address>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.clusters_added.is_empty()
            && self.clusters_modified.is_empty()
            && self.clusters_removed.is_empty()
            && self.shards_added.is_empty()
            && self.shards_modified.is_empty()
            && self.shards_removed.is_empty()
            && self.hosts_added.is_empty()
            && self.hosts_modified.is_empty()
            && self.hosts_removed.is_empty()
    }

    /// Walk every cluster/shard/host named in the `*_added` sets, invoking
    /// the matching callback for each, in declaration order. No trait
    /// objects — the callback set is small and closed (Design Notes §9).
    pub fn walk_added<FC, FS, FH>(&self, chi: &Chi, mut on_cluster: FC, mut on_shard: FS, mut on_host: FH)
    where
        FC: FnMut(&Cluster),
        FS: FnMut(&Shard),
        FH: FnMut(&Host),
    {
        for cluster in &chi.clusters {
            if self.clusters_added.contains(&cluster.address) {
                on_cluster(cluster);
            }
            for shard in &cluster.shards {
                if self.shards_added.contains(&shard.address) {
                    on_shard(shard);
                }
                for host in &shard.hosts {
                    if self.hosts_added.contains(&host.address) {
                        on_host(host);
                    }
                }
            }
        }
    }

    /// Symmetric to `walk_added`, over the `*_modified` sets.
    pub fn walk_modified<FC, FS, FH>(&self, chi: &Chi, mut on_cluster: FC, mut on_shard: FS, mut on_host: FH)
    where
        FC: FnMut(&Cluster),
        FS: FnMut(&Shard),
        FH: FnMut(&Host),
    {
        for cluster in &chi.clusters {
            if self.clusters_modified.contains(&cluster.address) {
                on_cluster(cluster);
            }
            for shard in &cluster.shards {
                if self.shards_modified.contains(&shard.address) {
                    on_shard(shard);
                }
                for host in &shard.hosts {
                    if self.hosts_modified.contains(&host.address) {
                        on_host(host);
                    }
                }
            }
        }
    }
}
