use std::fmt;

/// Stable primary key for a cluster/shard/host within a single CHI.
///
/// Two `Address`es compare equal iff they name the same node; this is the
/// identity the action planner diffs on (spec model §3) rather than any
/// positional index alone, so a shard can be renamed without the old and
/// new addresses spuriously matching.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub namespace: String,
    pub chi_name: String,
    pub cluster_name: String,
    pub cluster_index: usize,
    pub shard_index: usize,
    pub replica_index: usize,
    pub host_name: String,
}

impl Address {
    /// The address of the cluster this host (or shard) belongs to, used as
    /// the key for cluster-level added/modified/removed sets.
    pub fn cluster_address(&self) -> ClusterAddress {
        ClusterAddress {
            namespace: self.namespace.clone(),
            chi_name: self.chi_name.clone(),
            cluster_name: self.cluster_name.clone(),
            cluster_index: self.cluster_index,
        }
    }

    /// The address of the shard this host belongs to.
    pub fn shard_address(&self) -> ShardAddress {
        ShardAddress {
            namespace: self.namespace.clone(),
            chi_name: self.chi_name.clone(),
            cluster_name: self.cluster_name.clone(),
            cluster_index: self.cluster_index,
            shard_index: self.shard_index,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}.{}.shard{}.replica{}.{}",
            self.namespace,
            self.chi_name,
            self.cluster_name,
            self.shard_index,
            self.replica_index,
            self.host_name
        )
    }
}

/// Deterministic hostname derivation: `<chi>-<cluster>-<shard>-<replica>`.
///
/// Kept separate from `Address` construction so a normalizer can compute it
/// once and carry it in the address itself (per spec §3's invariant that
/// hostname is derivable deterministically from the address components).
pub fn derive_host_name(chi_name: &str, cluster_name: &str, shard_index: usize, replica_index: usize) -> String {
    format!("{chi_name}-{cluster_name}-{shard_index}-{replica_index}")
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterAddress {
    pub namespace: String,
    pub chi_name: String,
    pub cluster_name: String,
    pub cluster_index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardAddress {
    pub namespace: String,
    pub chi_name: String,
    pub cluster_name: String,
    pub cluster_index: usize,
    pub shard_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_name_is_deterministic() {
        assert_eq!(derive_host_name("c1", "main", 0, 1), "c1-main-0-1");
        assert_eq!(
            derive_host_name("c1", "main", 0, 1),
            derive_host_name("c1", "main", 0, 1)
        );
    }

    #[test]
    fn addresses_order_by_declaration() {
        let a = Address {
            namespace: "ns".into(),
            chi_name: "c1".into(),
            cluster_name: "main".into(),
            cluster_index: 0,
            shard_index: 0,
            replica_index: 0,
            host_name: "c1-main-0-0".into(),
        };
        let b = Address {
            shard_index: 1,
            replica_index: 0,
            host_name: "c1-main-1-0".into(),
            ..a.clone()
        };
        assert!(a < b);
    }
}
