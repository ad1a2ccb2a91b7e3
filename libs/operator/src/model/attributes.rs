use bitflags::bitflags;

bitflags! {
    /// Per-host reconcile attributes (spec model §3).
    ///
    /// Stamped exclusively by the action planner and the host reconciler.
    /// Stored in a side table (`Address -> ReconcileAttributes`) owned by
    /// the plan/driver rather than mutated on host records in place, per
    /// the Design Notes' recommendation — see DESIGN.md.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
    pub struct ReconcileAttributes: u8 {
        /// Host did not exist in the prior normalized CHI.
        const ADD = 0b0000_0001;
        /// Host existed and its spec differs from the prior normalized CHI.
        const MODIFY = 0b0000_0010;
        /// Neither `ADD` nor `MODIFY`: the workload may still have drifted
        /// independently of the declarative spec.
        const UNCLEAR = 0b0000_0100;
        /// This is an update reconcile; schema migration may be needed.
        const MIGRATE = 0b0000_1000;
        /// Terminal within a single reconcile pass.
        const RECONCILED = 0b0001_0000;
    }
}

impl ReconcileAttributes {
    /// True once neither `ADD` nor `MODIFY` is set, meaning the planner
    /// should fall back to `UNCLEAR` for this host.
    pub fn is_unmarked(self) -> bool {
        !self.intersects(Self::ADD | Self::MODIFY)
    }
}

/// A side table mapping each host's `Address` to its accumulated
/// `ReconcileAttributes`, owned by the `ActionPlan` (and later amended by
/// the driver with `MIGRATE`/`UNCLEAR`/`RECONCILED`).
pub type AttributesTable = std::collections::HashMap<crate::model::address::Address, ReconcileAttributes>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarked_host_is_only_add_or_modify_free() {
        assert!(ReconcileAttributes::empty().is_unmarked());
        assert!(!ReconcileAttributes::ADD.is_unmarked());
        assert!(!ReconcileAttributes::MODIFY.is_unmarked());
        assert!((ReconcileAttributes::MIGRATE).is_unmarked());
    }

    #[test]
    fn mask_recognizes_excluded_set() {
        let mask = ReconcileAttributes::ADD | ReconcileAttributes::MODIFY;
        assert!(mask.contains(ReconcileAttributes::ADD));
        assert!(!mask.contains(ReconcileAttributes::UNCLEAR));
    }
}
