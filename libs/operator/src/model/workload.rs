/// Tag over the platform's StatefulSet for a host (spec model §3).
///
/// Drives whether the exclude/include waits are required (§4.5.1) and
/// whether the StatefulSet reconciler is a no-op, an in-place update, or a
/// delete-then-recreate (§4.5.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadStatus {
    /// Absent on the platform: this is a create.
    New,
    /// `StatefulSetVersion` label and spec hash both match the desired object.
    Same,
    /// A deep spec diff against the desired object is non-empty.
    Modified,
    /// Fetch error (other than not-found) or an indeterminate comparison.
    Unknown,
}

impl WorkloadStatus {
    /// Both `New` and `Same` mean "nothing about the host's workload needs
    /// converging right now" — the condition `shouldWaitExcludeHost` checks
    /// against (spec §4.5.1: wait only when the status is *not* one of these).
    pub fn needs_no_wait(self) -> bool {
        matches!(self, WorkloadStatus::New | WorkloadStatus::Same)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_and_same_need_no_wait() {
        assert!(WorkloadStatus::New.needs_no_wait());
        assert!(WorkloadStatus::Same.needs_no_wait());
        assert!(!WorkloadStatus::Modified.needs_no_wait());
        assert!(!WorkloadStatus::Unknown.needs_no_wait());
    }
}
