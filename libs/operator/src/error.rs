/// All errors possible to occur during reconciliation.
///
/// Mirrors the error taxonomy in the reconcile design: a transient platform
/// error aborts the current walk-till-error chain, a `Schemer` error is
/// logged and swallowed by the caller, everything else is a programming or
/// user-input error surfaced to the runtime error handler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate.
    #[error("Kubernetes reported error: {0}")]
    Kube(#[from] kube::Error),

    /// The CHI (or a dependent object) is missing a namespace, which every
    /// namespaced resource this operator manages is required to carry.
    #[error("resource {0} is not namespaced")]
    MissingNamespace(String),

    /// Error in user input or CHI definition, typically missing or
    /// contradictory fields the normalizer could not default away.
    #[error("invalid ClickHouseInstallation: {0}")]
    UserInput(String),

    /// A `Schemer` (ClickHouse native-protocol) operation failed.
    #[error("schemer operation failed for host {host}: {source}")]
    Schemer {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Normalization failed — the raw CHI could not be reduced to a
    /// canonical tree (e.g. a template reference did not resolve).
    #[error("normalization failed: {0}")]
    Normalize(String),

    /// The current tracing span has no valid trace id (no active trace).
    #[error("no valid trace id in current span")]
    InvalidTraceId,

    /// A queue item could not be classified into a known `Command`.
    #[error("unrecognized work queue item: {0}")]
    UnknownCommand(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// A short, low-cardinality label suitable for a Prometheus metric.
    pub fn metric_label(&self) -> String {
        match self {
            Error::Kube(_) => "kube".to_string(),
            Error::MissingNamespace(_) => "missing_namespace".to_string(),
            Error::UserInput(_) => "user_input".to_string(),
            Error::Schemer { .. } => "schemer".to_string(),
            Error::Normalize(_) => "normalize".to_string(),
            Error::InvalidTraceId => "invalid_trace_id".to_string(),
            Error::UnknownCommand(_) => "unknown_command".to_string(),
        }
    }
}
