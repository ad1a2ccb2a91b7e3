//! The Schemer (spec §1, §6, external collaborator): single-host operations
//! over ClickHouse's native protocol. This operator never dials ClickHouse
//! directly — it is a pure seam — so only a trait plus test doubles are
//! provided here; wiring a real client is left to deployment-specific
//! configuration.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::address::Address;

#[async_trait]
pub trait Schemer: Send + Sync {
    /// Idempotent DDL to materialize configured schemas on one host (spec
    /// §6 `HostCreateTables`, gated on `ReconcileAttributes::MIGRATE`).
    async fn host_create_tables(&self, host: &Address) -> Result<()>;

    /// Drop all managed tables; prerequisite for safe volume discard (spec
    /// §6 `HostDeleteTables`, used by the delete cascade).
    async fn host_delete_tables(&self, host: &Address) -> Result<()>;

    /// Reads `system.clusters` to verify membership (spec §6
    /// `IsHostInCluster`); backs the exclude/include polls.
    async fn is_host_in_cluster(&self, host: &Address) -> Result<bool>;

    /// Issues `SYSTEM DROP DNS CACHE` fleet-wide (spec §6
    /// `CHIDropDnsCache`, the effect of a `DropDns` command).
    async fn chi_drop_dns_cache(&self, namespace: &str, chi_name: &str) -> Result<()>;
}

/// A `Schemer` that performs no network I/O: every mutating call trivially
/// succeeds, and `is_host_in_cluster` reports the state the exclude/include
/// poll is waiting for, so tests that don't care about the data plane don't
/// hang. Suitable for deployments that opt out of schema migration too —
/// the spec treats this as a valid, if inert, implementation of the seam.
#[derive(Clone, Copy)]
pub struct NullSchemer {
    /// What `is_host_in_cluster` reports. `true` models a cluster that
    /// already reflects membership changes instantly (so `Include`'s poll
    /// returns immediately); flip to `false` to model the opposite.
    pub in_cluster: bool,
}

impl Default for NullSchemer {
    fn default() -> Self {
        Self { in_cluster: true }
    }
}

#[async_trait]
impl Schemer for NullSchemer {
    async fn host_create_tables(&self, _host: &Address) -> Result<()> {
        Ok(())
    }

    async fn host_delete_tables(&self, _host: &Address) -> Result<()> {
        Ok(())
    }

    async fn is_host_in_cluster(&self, _host: &Address) -> Result<bool> {
        Ok(self.in_cluster)
    }

    async fn chi_drop_dns_cache(&self, _namespace: &str, _chi_name: &str) -> Result<()> {
        Ok(())
    }
}

/// A `Schemer` double that always fails, for exercising the driver's
/// walk-till-error behavior in tests.
pub struct FailingSchemer;

#[async_trait]
impl Schemer for FailingSchemer {
    async fn host_create_tables(&self, host: &Address) -> Result<()> {
        Err(schemer_error(host))
    }

    async fn host_delete_tables(&self, host: &Address) -> Result<()> {
        Err(schemer_error(host))
    }

    async fn is_host_in_cluster(&self, host: &Address) -> Result<bool> {
        Err(schemer_error(host))
    }

    async fn chi_drop_dns_cache(&self, _namespace: &str, _chi_name: &str) -> Result<()> {
        Err(Error::Schemer {
            host: "<chi>".to_string(),
            source: "forced test failure".into(),
        })
    }
}

fn schemer_error(host: &Address) -> Error {
    Error::Schemer {
        host: host.to_string(),
        source: "forced test failure".into(),
    }
}
