//! Standard-stream request types
//!
//! A launch names what should happen to each of the child's three standard
//! streams. The request is an explicit tagged variant rather than a magic
//! handle value, so "send this stream to the null device" can never be
//! confused with a real handle.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw numeric value of an OS handle
///
/// Handle values are what the child sees in its own handle table after
/// inheritance, so they are carried as plain integers and printed in decimal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct HandleValue(pub u64);

impl HandleValue {
    /// The raw integer value
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for HandleValue {
    fn from(raw: u64) -> Self {
        HandleValue(raw)
    }
}

/// One of the three standard streams of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StdStream {
    /// Standard input
    Input,
    /// Standard output
    Output,
    /// Standard error
    Error,
}

impl StdStream {
    /// All three streams in slot order (input, output, error)
    pub const ALL: [StdStream; 3] = [StdStream::Input, StdStream::Output, StdStream::Error];

    /// Slot index in startup information and transfer-protocol order
    pub fn index(self) -> usize {
        match self {
            StdStream::Input => 0,
            StdStream::Output => 1,
            StdStream::Error => 2,
        }
    }

    /// Direction of the child's end of this stream
    pub fn child_access(self) -> Access {
        match self {
            StdStream::Input => Access::Read,
            StdStream::Output | StdStream::Error => Access::Write,
        }
    }

    /// Direction of the parent's end of this stream
    pub fn parent_access(self) -> Access {
        match self.child_access() {
            Access::Read => Access::Write,
            Access::Write => Access::Read,
        }
    }

    /// Short name used in logs and field paths
    pub fn name(self) -> &'static str {
        match self {
            StdStream::Input => "stdin",
            StdStream::Output => "stdout",
            StdStream::Error => "stderr",
        }
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read or write access to a stream end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    /// The holder reads from this end
    Read,
    /// The holder writes to this end
    Write,
}

/// What to do with one standard stream of the child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StreamRequest {
    /// Leave the stream as the parent's
    #[default]
    Inherit,
    /// Create a new OS pipe; the parent keeps the other end
    Pipe,
    /// Redirect to the platform's null device
    Null,
    /// Use an existing handle owned by the caller
    ExplicitHandle(HandleValue),
}

impl StreamRequest {
    /// Whether this request changes the child's stream away from the parent's
    pub fn is_redirected(&self) -> bool {
        !matches!(self, StreamRequest::Inherit)
    }

    /// Whether this request is accepted by the command-line handle transfer
    pub fn is_transferable(&self) -> bool {
        matches!(self, StreamRequest::Pipe | StreamRequest::Null)
    }
}

/// How the parent-facing end of a created pipe should be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StreamMode {
    /// Raw bytes
    #[default]
    Binary,
    /// Text with universal newlines; decoding is left to the consumer
    Text,
}

/// Buffering hint for parent-facing pipe ends
///
/// Kept as a number so a configuration value such as `1.5` survives parsing
/// and can be rejected with a proper validation error instead of being
/// silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BufferHint(pub f64);

impl BufferHint {
    /// No buffering
    pub const UNBUFFERED: BufferHint = BufferHint(0.0);
    /// Line buffering
    pub const LINE: BufferHint = BufferHint(1.0);
    /// Let the platform pick a buffer size
    pub const SYSTEM_DEFAULT: BufferHint = BufferHint(-1.0);

    /// Buffer size used for line buffering and the system default
    pub const DEFAULT_CAPACITY: usize = 8 * 1024;

    /// Largest buffer size a hint may ask for
    pub const MAX_CAPACITY: usize = 64 * 1024 * 1024;

    /// The hint as an integer, if it is a whole number
    pub fn whole(self) -> Option<i64> {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            Some(self.0 as i64)
        } else {
            None
        }
    }

    /// The hint as an integer, if it is a whole number within
    /// [`MAX_CAPACITY`](Self::MAX_CAPACITY)
    pub fn checked(self) -> Option<i64> {
        self.whole()
            .filter(|n| usize::try_from(*n).map_or(true, |n| n <= Self::MAX_CAPACITY))
    }

    /// Buffer capacity in bytes, `None` meaning unbuffered
    ///
    /// Returns `None` as well for hints that are not whole numbers; callers
    /// validate those away before any stream is built. Oversized hints are
    /// clamped to [`MAX_CAPACITY`](Self::MAX_CAPACITY).
    pub fn capacity(self) -> Option<usize> {
        match self.whole()? {
            0 => None,
            1 => Some(Self::DEFAULT_CAPACITY),
            n if n < 0 => Some(Self::DEFAULT_CAPACITY),
            n => Some(
                usize::try_from(n).map_or(Self::MAX_CAPACITY, |n| n.min(Self::MAX_CAPACITY)),
            ),
        }
    }
}

impl Default for BufferHint {
    fn default() -> Self {
        BufferHint::UNBUFFERED
    }
}

impl From<i64> for BufferHint {
    fn from(n: i64) -> Self {
        BufferHint(n as f64)
    }
}
