//! The event classifier (spec §4.1): maps an informer/watch event for any of
//! the three watched object kinds into a single `Command` the worker loop can
//! queue, dedupe and dispatch without caring which watch produced it.

use std::fmt;

/// Work item carried by the `WorkQueue`. Distinct CHIs/CHITs/ChopConfigs are
/// distinct `Command`s (by namespace+name), so a queue dedupe never collapses
/// two different objects into one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// A `ClickHouseInstallation` was added, modified or resynced.
    ReconcileChi { namespace: String, name: String },
    /// A `ClickHouseInstallationTemplate` changed; every CHI referencing it
    /// also needs a `ReconcileChi` (left to the caller to expand — the
    /// classifier itself only knows about the template object).
    ReconcileChit { namespace: String, name: String },
    /// The cluster-scoped operator configuration changed.
    ReconcileChopConfig,
    /// A host was excluded from the service and is now safe to drop from
    /// externally visible DNS (spec §4.5.1, the exclude/include machine's
    /// terminal housekeeping step).
    DropDns { namespace: String, chi_name: String, host_name: String },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ReconcileChi { namespace, name } => write!(f, "ReconcileChi({namespace}/{name})"),
            Command::ReconcileChit { namespace, name } => write!(f, "ReconcileChit({namespace}/{name})"),
            Command::ReconcileChopConfig => write!(f, "ReconcileChopConfig"),
            Command::DropDns {
                namespace,
                chi_name,
                host_name,
            } => write!(f, "DropDns({namespace}/{chi_name}/{host_name})"),
        }
    }
}

/// Raw classification kinds an informer can report, prior to being folded
/// into a `Command`. Kept separate from `Command` since a single `Modify`
/// can need more context (is this a spec change or just a status update?)
/// than the queue item itself carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Modify,
    Delete,
    Resync,
}

/// Fold a watch event on a CHI into the `Command` the worker queue sees.
/// Deletes still enqueue a `ReconcileChi`: the reconcile driver is what
/// distinguishes "delete requested" from "delete finished" by looking at
/// `deletion_timestamp`/finalizers on the object itself (spec §4.7).
pub fn classify_chi(namespace: &str, name: &str, _kind: EventKind) -> Command {
    Command::ReconcileChi {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

pub fn classify_chit(namespace: &str, name: &str, _kind: EventKind) -> Command {
    Command::ReconcileChit {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

pub fn classify_chop_config(_kind: EventKind) -> Command {
    Command::ReconcileChopConfig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_and_modify_fold_to_the_same_command() {
        let modify = classify_chi("ns", "c1", EventKind::Modify);
        let delete = classify_chi("ns", "c1", EventKind::Delete);
        assert_eq!(modify, delete);
    }

    #[test]
    fn distinct_objects_are_distinct_commands() {
        let a = classify_chi("ns", "c1", EventKind::Add);
        let b = classify_chi("ns", "c2", EventKind::Add);
        assert_ne!(a, b);
    }
}
