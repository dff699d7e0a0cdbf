//! Decoded values of the submit/acknowledge/poll contract.
//!
//! The engine only ever sees these types. Wire records are turned into them
//! by the gateway implementation, which is where malformed input is rejected
//! as a protocol violation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::RegistryError;
use crate::header::RequestHeader;

/// Receipt for a submitted operation; identifies it in every later poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acknowledgment {
    correlation_id: String,
}

impl Acknowledgment {
    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] if the correlation id is blank.
    pub fn new(correlation_id: impl Into<String>) -> Result<Self, RegistryError> {
        let correlation_id = correlation_id.into();
        if correlation_id.trim().is_empty() {
            return Err(RegistryError::protocol(
                "acknowledgment carries no correlation id",
            ));
        }
        Ok(Self { correlation_id })
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl fmt::Display for Acknowledgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.correlation_id)
    }
}

/// Processing state reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyState {
    Received,
    InProgress,
    Ready,
}

impl ReadyState {
    /// Decodes the numeric wire state (1, 2 or 3).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] for any other value.
    pub fn from_code(code: u8) -> Result<Self, RegistryError> {
        match code {
            1 => Ok(Self::Received),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Ready),
            other => Err(RegistryError::protocol(format!(
                "unknown request state {other}"
            ))),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Ready
    }
}

/// Structured error item delivered inside a ready result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub code: String,
    pub description: String,
}

impl RemoteFault {
    #[must_use]
    pub fn to_error(&self) -> RegistryError {
        RegistryError::remote(&self.code, &self.description)
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<P> {
    pub ready_state: ReadyState,
    pub payload: Option<P>,
    pub faults: Vec<RemoteFault>,
}

impl<P> OperationResult<P> {
    #[must_use]
    pub fn ready(payload: P) -> Self {
        Self {
            ready_state: ReadyState::Ready,
            payload: Some(payload),
            faults: Vec::new(),
        }
    }

    #[must_use]
    pub fn pending(state: ReadyState) -> Self {
        Self {
            ready_state: state,
            payload: None,
            faults: Vec::new(),
        }
    }

    #[must_use]
    pub fn failed(faults: Vec<RemoteFault>) -> Self {
        Self {
            ready_state: ReadyState::Ready,
            payload: None,
            faults,
        }
    }

    /// Converts a terminal result into its payload.
    ///
    /// # Errors
    ///
    /// Returns the first delivered fault as a remote error, or
    /// [`RegistryError::Protocol`] if the result is not ready or carries
    /// neither faults nor a payload.
    pub fn into_payload(self) -> Result<P, RegistryError> {
        if !self.ready_state.is_terminal() {
            return Err(RegistryError::protocol(format!(
                "result is not ready ({:?})",
                self.ready_state
            )));
        }
        if let Some(fault) = self.faults.first() {
            return Err(fault.to_error());
        }
        self.payload
            .ok_or_else(|| RegistryError::protocol("ready result carries no payload"))
    }
}

/// Opaque resume position of a paginated fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, RegistryError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(RegistryError::protocol("page cursor is empty"));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a page sits in its sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMarker {
    LastPage,
    Next(Cursor),
}

impl PageMarker {
    /// Decodes the wire marker, which carries either a `true` last-page flag or
    /// the cursor of the next page.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] when the marker is absent, the flag
    /// is `false` without a cursor, or the cursor is empty.
    pub fn from_wire(last_page: Option<bool>, next_cursor: Option<&str>) -> Result<Self, RegistryError> {
        match (last_page, next_cursor) {
            (Some(true), _) => Ok(Self::LastPage),
            (_, Some(cursor)) => Cursor::new(cursor).map(Self::Next),
            (Some(false), None) => Err(RegistryError::protocol(
                "page is not the last one but carries no next cursor",
            )),
            (None, None) => Err(RegistryError::protocol("page carries no marker")),
        }
    }
}

/// One page of a paginated fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub marker: PageMarker,
}

impl<T> Page<T> {
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            marker: PageMarker::LastPage,
        }
    }

    #[must_use]
    pub fn next(items: Vec<T>, cursor: Cursor) -> Self {
        Self {
            items,
            marker: PageMarker::Next(cursor),
        }
    }
}

/// A request the gateway can submit.
pub trait RemoteRequest: Send + Sync {
    /// Short operation name for logs and error context.
    fn kind(&self) -> &'static str;

    /// Endpoint that serves the request.
    fn endpoint(&self) -> Endpoint;
}

/// Everything the gateway needs to submit one request.
#[derive(Debug)]
pub struct Submission<'a, R> {
    pub header: RequestHeader,
    pub uri: String,
    pub request: &'a R,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
