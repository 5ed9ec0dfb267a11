/// Errors surfaced by BVH construction and refitting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BvhError {
    /// The input arrays cannot describe a leaf set.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An intermediate buffer reservation failed.
    #[error("failed to reserve buffers for {requested_nodes} nodes")]
    OutOfMemory { requested_nodes: usize },
    /// An operation was issued against a hierarchy in the wrong state,
    /// e.g. refitting with a different leaf count than the topology holds.
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),
    /// The verification pass found a malformed radix tree. Outputs are not
    /// corrupted by the check itself; this signals a construction bug.
    #[error("radix tree verification found {errors} error(s)")]
    InternalInvariantViolated { errors: usize },
}
