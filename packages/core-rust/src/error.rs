//! Error tree for remote registry operations.
//!
//! Every failure the engine can observe is a [`RegistryError`]. Nested causes
//! are held behind `Arc` so one cause can be shared by several parents (for
//! example the same transport failure recorded in a fan-out aggregate and in
//! the context wrapper of the operation that hit it). [`RegistryError::causes`]
//! flattens the tree depth-first, visiting each node once by identity.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Remote error codes with a known meaning to the engine.
pub mod codes {
    /// Nothing matches the query. Not a failure.
    pub const NO_OBJECTS_FOR_EXPORT: &str = "INT002012";
    /// The requested object is not present in the registry.
    pub const NOT_IN_REGISTRY: &str = "INT002000";
    /// The caller is not allowed to read the requested object.
    pub const ACCESS_DENIED: &str = "AUT011003";
    /// Transient server-side marker asking to repeat the transfer. Retrying an
    /// identical payload is only safe for idempotent operations.
    pub const RETRY_TRANSFER: &str = "EXP001000";
}

/// One failure observed inside a bounded fan-out, tagged with the position of
/// the input item that produced it.
#[derive(Debug, Clone)]
pub struct IndexedFailure {
    /// Zero-based position of the input item.
    pub index: usize,
    /// The failure itself.
    pub error: Arc<RegistryError>,
}

/// Errors raised by the operation engine and its collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Structured error delivered by the remote system.
    #[error("remote system returned error [{code}] {description}")]
    Remote { code: String, description: String },

    /// The remote system reports that nothing matches the query.
    #[error("no objects match the query: {description}")]
    NoResults { description: String },

    /// Transport-level failure (timeout, gateway error, dropped connection).
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        cause: Option<Arc<RegistryError>>,
    },

    /// Malformed acknowledgment, result or page marker.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A restartable operation waited longer than its restart timeout.
    #[error("waited more than {timeout:?} for {operation}, restart required")]
    RestartTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A non-restartable operation exceeded its wait limit.
    #[error("exceeded wait limit for {operation}")]
    WaitLimitExceeded {
        operation: &'static str,
        #[source]
        source: Arc<RegistryError>,
    },

    /// An ignorable error kept recurring past the retry cap.
    #[error("{operation} failed {attempts} times with ignorable errors, giving up")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Arc<RegistryError>,
    },

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A failure wrapped with the logical operation it belongs to.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Arc<RegistryError>,
    },

    /// One or more failures collected while draining a bounded fan-out.
    #[error("parallel processing failed after {completed} of {total} items with {} failure(s)", failures.len())]
    FanOut {
        completed: usize,
        total: usize,
        failures: Vec<IndexedFailure>,
    },
}

impl RegistryError {
    /// Builds the error for a remote error code. The "no objects" code maps to
    /// [`RegistryError::NoResults`].
    pub fn remote(code: impl Into<String>, description: impl Into<String>) -> Self {
        let code = code.into();
        let description = description.into();
        if code == codes::NO_OBJECTS_FOR_EXPORT {
            Self::NoResults { description }
        } else {
            Self::Remote { code, description }
        }
    }

    /// Transport failure without a nested cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            cause: None,
        }
    }

    /// Converts a foreign error and its `source()` chain into nested transport
    /// errors, so the classifier can inspect every message in the chain.
    #[must_use]
    pub fn from_std_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut messages = vec![err.to_string()];
        let mut next = err.source();
        while let Some(inner) = next {
            messages.push(inner.to_string());
            next = inner.source();
        }

        let mut cause = None;
        for message in messages.into_iter().rev() {
            cause = Some(Arc::new(Self::Transport { message, cause }));
        }
        match cause {
            Some(outer) => Arc::unwrap_or_clone(outer),
            None => Self::transport(err.to_string()),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Wraps `self` with a description of the operation it belongs to.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Arc::new(self),
        }
    }

    /// Remote error code carried by this node, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            Self::NoResults { .. } => Some(codes::NO_OBJECTS_FOR_EXPORT),
            _ => None,
        }
    }

    /// Short name of the variant, used in [`describe`](Self::describe).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "Remote",
            Self::NoResults { .. } => "NoResults",
            Self::Transport { .. } => "Transport",
            Self::Protocol(_) => "Protocol",
            Self::RestartTimeout { .. } => "RestartTimeout",
            Self::WaitLimitExceeded { .. } => "WaitLimitExceeded",
            Self::RetriesExhausted { .. } => "RetriesExhausted",
            Self::Cancelled => "Cancelled",
            Self::Context { .. } => "Context",
            Self::FanOut { .. } => "FanOut",
        }
    }

    /// Direct children of this node, in declaration order.
    fn children(&self) -> Vec<&RegistryError> {
        match self {
            Self::Transport {
                cause: Some(cause), ..
            } => vec![cause.as_ref()],
            Self::WaitLimitExceeded { source, .. }
            | Self::RetriesExhausted { source, .. }
            | Self::Context { source, .. } => vec![source.as_ref()],
            Self::FanOut { failures, .. } => failures.iter().map(|f| f.error.as_ref()).collect(),
            _ => Vec::new(),
        }
    }

    /// Flattens the error tree depth-first, starting with `self`. A node
    /// reachable through several parents is reported once.
    #[must_use]
    pub fn causes(&self) -> Vec<&RegistryError> {
        let mut visited: HashSet<*const RegistryError> = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![self];

        while let Some(node) = stack.pop() {
            if !visited.insert(std::ptr::from_ref(node)) {
                continue;
            }
            out.push(node);
            // Reverse so the first child is visited first.
            stack.extend(node.children().into_iter().rev());
        }
        out
    }

    /// Returns `true` if any cause carries the given remote error code.
    #[must_use]
    pub fn contains_code(&self, code: &str) -> bool {
        self.causes().iter().any(|e| e.code() == Some(code))
    }

    /// Returns `true` if any cause is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.causes()
            .iter()
            .any(|e| matches!(e, RegistryError::Cancelled))
    }

    /// Returns `true` if the remote system reported "nothing found" anywhere
    /// in the chain.
    #[must_use]
    pub fn is_no_results(&self) -> bool {
        self.contains_code(codes::NO_OBJECTS_FOR_EXPORT)
    }

    /// One-line rendering of the whole chain: `[Kind:message-->Kind:message]`.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut buf = String::from("[");
        for (i, cause) in self.causes().into_iter().enumerate() {
            if i > 0 {
                buf.push_str("-->");
            }
            let _ = write!(buf, "{}:{}", cause.kind(), cause);
        }
        buf.push(']');
        buf
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
