//! Core types for the live cache.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a logical live resource (e.g. `active-calls`, `leads:42`).
///
/// Two different keys never share cached state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        ResourceKey(key.into())
    }

    /// Key with a parameter, joined as `{base}:{param}`.
    pub fn with_param(base: &str, param: impl fmt::Display) -> Self {
        ResourceKey(format!("{}:{}", base, param))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({})", self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        ResourceKey::new(s)
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        ResourceKey(s)
    }
}

/// Per-key fetch sequence number. Issued monotonically by the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct FetchSeq(pub u64);

impl fmt::Debug for FetchSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FetchSeq({})", self.0)
    }
}

impl FetchSeq {
    pub fn next(self) -> Self {
        FetchSeq(self.0 + 1)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Category of a recorded fetch failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or connection failure.
    Transport,
    /// Remote answered with a non-success status.
    Status,
    /// Response body could not be decoded.
    Malformed,
    /// The fetcher panicked.
    Panicked,
    /// The fetch could not be dispatched to a worker thread.
    Spawn,
}

/// Normalized failure carried in [`ResourceState::error`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Remote status code, for [`ErrorKind::Status`].
    pub status: Option<u16>,
    pub message: String,
    pub at: Timestamp,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            at: Timestamp::now(),
        }
    }
}

impl From<FetchError> for ErrorInfo {
    fn from(e: FetchError) -> Self {
        let message = e.to_string();
        match e {
            FetchError::Transport(_) => ErrorInfo::new(ErrorKind::Transport, message),
            FetchError::Status { status, .. } => ErrorInfo {
                status: Some(status),
                ..ErrorInfo::new(ErrorKind::Status, message)
            },
            FetchError::Malformed(_) => ErrorInfo::new(ErrorKind::Malformed, message),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Cached state of one resource key, as pushed to listeners.
///
/// `value` keeps the last successfully fetched data while a newer fetch is
/// loading or after it failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceState<T> {
    pub value: T,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

impl<T: Default> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            loading: false,
            error: None,
        }
    }
}

impl<T> ResourceState<T> {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
