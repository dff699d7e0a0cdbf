//! Retry classification of [`RegistryError`] chains.
//!
//! The classifier inspects the flattened cause chain of an error and decides
//! whether the failed call may be repeated. It is a pure function of the
//! error and the marker tables; nothing is logged or mutated.

use serde::{Deserialize, Serialize};

use crate::error::{codes, RegistryError};

/// Message fragments of transient infrastructure failures. Matched
/// case-insensitively against every message in the cause chain.
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &[
    "gateway timeout",
    "(504)",
    "connection was closed",
    "connection reset",
    "retry the transfer",
    "(502) bad gateway",
    "(503) service unavailable",
];

/// Remote codes that signal a transient server condition.
pub const DEFAULT_TRANSIENT_CODES: &[&str] = &[codes::RETRY_TRANSFER];

/// Why an error was judged ignorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Gateway/timeout class failure: the request most likely never reached
    /// the service, so repeating it is always safe.
    Infrastructure,
    /// The service asked for the transfer to be repeated. Only safe when the
    /// operation is idempotent.
    ServerMarker,
}

/// Result of classifying one error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Whether the failed call may be repeated.
    pub ignorable: bool,
    /// The code or message fragment that matched, for logging.
    pub marker: Option<String>,
    /// Which kind of transient condition matched. `None` when fatal.
    pub transience: Option<Transience>,
}

impl Classification {
    #[must_use]
    pub fn fatal() -> Self {
        Self {
            ignorable: false,
            marker: None,
            transience: None,
        }
    }

    fn ignorable(marker: &str, transience: Transience) -> Self {
        Self {
            ignorable: true,
            marker: Some(marker.to_string()),
            transience: Some(transience),
        }
    }

    /// Whether the call may be repeated given the idempotency of the
    /// operation. Server markers are only honoured for idempotent calls.
    #[must_use]
    pub fn allows_retry(&self, idempotent: bool) -> bool {
        match self.transience {
            Some(Transience::Infrastructure) => true,
            Some(Transience::ServerMarker) => idempotent,
            None => false,
        }
    }
}

/// Marker tables driving [`ErrorClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorClassifier {
    /// Remote codes treated as transient server markers.
    pub transient_codes: Vec<String>,
    /// Message fragments treated as transient infrastructure failures.
    pub transient_markers: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            transient_codes: DEFAULT_TRANSIENT_CODES
                .iter()
                .map(ToString::to_string)
                .collect(),
            transient_markers: DEFAULT_TRANSIENT_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl ErrorClassifier {
    /// Classifies an error by walking its full cause chain.
    ///
    /// Priority order:
    /// 1. a cancellation anywhere in the chain is fatal;
    /// 2. a remote error carrying a transient code is ignorable;
    /// 3. any message containing a transient infrastructure fragment is ignorable;
    /// 4. anything else is fatal.
    #[must_use]
    pub fn classify(&self, error: &RegistryError) -> Classification {
        let causes = error.causes();

        if causes.iter().any(|e| matches!(e, RegistryError::Cancelled)) {
            return Classification::fatal();
        }

        for cause in &causes {
            if let RegistryError::Remote { code, .. } = cause {
                if let Some(known) = self.transient_codes.iter().find(|c| *c == code) {
                    return Classification::ignorable(known, Transience::ServerMarker);
                }
            }
        }

        for marker in &self.transient_markers {
            let needle = marker.to_lowercase();
            let found = causes
                .iter()
                .any(|e| node_message(e).to_lowercase().contains(&needle));
            if found {
                return Classification::ignorable(marker, Transience::Infrastructure);
            }
        }

        Classification::fatal()
    }
}

/// The message carried by a single node, excluding its children.
fn node_message(error: &RegistryError) -> String {
    match error {
        RegistryError::Transport { message, .. } => message.clone(),
        RegistryError::Remote { description, .. } | RegistryError::NoResults { description } => {
            description.clone()
        }
        RegistryError::Context { context, .. } => context.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::error::IndexedFailure;

    #[test]
    fn gateway_timeout_is_ignorable_infrastructure() {
        let classifier = ErrorClassifier::default();
        let err = RegistryError::transport("The remote server returned (504) Gateway Timeout");
        let c = classifier.classify(&err);
        assert!(c.ignorable);
        assert_eq!(c.transience, Some(Transience::Infrastructure));
        assert!(c.allows_retry(false));
    }

    #[test]
    fn transient_code_is_server_marker() {
        let classifier = ErrorClassifier::default();
        let err = RegistryError::remote(codes::RETRY_TRANSFER, "please repeat")
            .context("export contracts");
        let c = classifier.classify(&err);
        assert!(c.ignorable);
        assert_eq!(c.marker.as_deref(), Some(codes::RETRY_TRANSFER));
        assert!(c.allows_retry(true));
        assert!(!c.allows_retry(false));
    }

    #[test]
    fn business_error_is_fatal() {
        let classifier = ErrorClassifier::default();
        let err = RegistryError::remote(codes::ACCESS_DENIED, "access denied");
        assert_eq!(classifier.classify(&err), Classification::fatal());
    }

    #[test]
    fn cancellation_is_never_ignorable() {
        let classifier = ErrorClassifier::default();
        let err = RegistryError::FanOut {
            completed: 2,
            total: 2,
            failures: vec![
                IndexedFailure {
                    index: 0,
                    error: Arc::new(RegistryError::transport("(502) Bad Gateway")),
                },
                IndexedFailure {
                    index: 1,
                    error: Arc::new(RegistryError::Cancelled),
                },
            ],
        };
        assert!(!classifier.classify(&err).ignorable);
    }

    #[test]
    fn custom_markers_extend_classification() {
        let classifier = ErrorClassifier {
            transient_markers: vec!["content not found for guid".to_string()],
            ..ErrorClassifier::default()
        };
        let err = RegistryError::transport("Error loading content: Content not found for guid: x");
        assert!(classifier.classify(&err).ignorable);
    }

    fn wrap(mut err: RegistryError, depth: usize) -> RegistryError {
        for i in 0..depth {
            err = if i % 2 == 0 {
                err.context(format!("layer {i}"))
            } else {
                RegistryError::Transport {
                    message: format!("wrapped {i}"),
                    cause: Some(Arc::new(err)),
                }
            };
        }
        err
    }

    proptest! {
        #[test]
        fn marker_at_any_depth_is_ignorable(
            depth in 0usize..12,
            marker_idx in 0usize..DEFAULT_TRANSIENT_MARKERS.len(),
        ) {
            let classifier = ErrorClassifier::default();
            let leaf = RegistryError::transport(format!(
                "upstream said: {}",
                DEFAULT_TRANSIENT_MARKERS[marker_idx].to_uppercase()
            ));
            let err = wrap(leaf, depth);
            prop_assert!(classifier.classify(&err).ignorable);
        }

        #[test]
        fn chain_without_marker_is_fatal(depth in 0usize..12, text in "[a-z ]{0,24}") {
            let classifier = ErrorClassifier::default();
            let leaf = RegistryError::remote("INT999999", format!("business rule {text}"));
            let err = wrap(leaf, depth);
            prop_assert!(!classifier.classify(&err).ignorable);
        }
    }
}
