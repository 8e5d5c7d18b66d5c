/// What a bulk scan does with a record it cannot read or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPolicy {
    /// Abort the whole call on the first bad record.
    #[default]
    FailFast,
    /// Log the bad record and continue with the rest.
    Skip,
}

/// How the replicated driver places a record across its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Commit on a randomly chosen primary, then copy to every other node.
    #[default]
    Replicate,
    /// Keep the record only on the randomly chosen primary and drop copies
    /// held by any other node.
    Partition,
}

/// Engine configuration shared by [`Driver`](super::Driver) and
/// [`ReplicatedDriver`](super::ReplicatedDriver).
#[derive(Debug, Clone)]
pub struct Options {
    /// File extension of record files, without the dot.
    pub extension: String,
    /// Policy for `read_all` and `search`. The replicated overlay's
    /// `read_all` always skips.
    pub bulk_policy: ScanPolicy,
    /// Policy for `regex_search`.
    pub regex_policy: ScanPolicy,
    /// Placement mode of the replicated driver.
    pub placement: Placement,
    /// Seed for primary-node selection; OS entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
            bulk_policy: ScanPolicy::FailFast,
            regex_policy: ScanPolicy::Skip,
            placement: Placement::Replicate,
            seed: None,
        }
    }
}
