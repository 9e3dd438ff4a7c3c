//! The operating-system boundary of the launcher
//!
//! Every handle operation and the process-creation primitive itself go through
//! the [`OsApi`] trait. The launch algorithm above it is plain Rust that only
//! moves handle values around, which keeps it testable on any host.
//!
//! ## Implementations
//!
//! - **Windows**: [`windows::WindowsApi`], backed by `windows-sys`
//! - **Recording**: [`recording::RecordingOs`], an in-memory handle table that
//!   records every call, used by the test suites
//!
//! ## Handle ownership
//!
//! Handles returned by `create_pipe`, `open_null_device` and
//! `duplicate_inheritable` are owned by the caller and must be released with
//! `close_handle` or turned into a stream with `into_stream`, which takes
//! ownership.

use schema::{Access, HandleValue, StdStream};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub mod recording;
#[cfg(windows)]
pub mod windows;

pub use recording::{OsCall, RecordingOs};
#[cfg(windows)]
pub use windows::WindowsApi;

/// The child becomes the root of a new process group
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
/// The environment block is UTF-16
pub const CREATE_UNICODE_ENVIRONMENT: u32 = 0x0000_0400;
/// The startup information is a `STARTUPINFOEXW` with an attribute list
pub const EXTENDED_STARTUPINFO_PRESENT: u32 = 0x0008_0000;

/// The two ends of one anonymous pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlePair {
    /// End the reader holds
    pub read: HandleValue,
    /// End the writer holds
    pub write: HandleValue,
}

impl HandlePair {
    /// The end used with the given access
    pub fn end(&self, access: Access) -> HandleValue {
        match access {
            Access::Read => self.read,
            Access::Write => self.write,
        }
    }
}

/// Startup information handed to the process-creation primitive
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartupInfo {
    /// Whether the standard-handle slots are meaningful
    pub use_std_handles: bool,
    /// Standard handle slots in input, output, error order
    pub std_handles: [Option<HandleValue>; 3],
    /// Explicit inheritable-handle list; `Some` selects the extended structure
    pub handle_list: Option<Vec<HandleValue>>,
}

impl StartupInfo {
    /// Whether the extended startup-information structure is required
    pub fn is_extended(&self) -> bool {
        self.handle_list.is_some()
    }
}

/// Every argument of one call to the process-creation primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProcessRequest {
    /// Image to run; `None` lets the platform search using the command line
    pub application: Option<PathBuf>,
    /// Fully rendered command line
    pub command_line: String,
    /// The primitive's inherit-handles flag
    pub inherit_handles: bool,
    /// Creation flags
    pub creation_flags: u32,
    /// Encoded UTF-16 environment block; `None` inherits the parent's
    pub environment: Option<Vec<u16>>,
    /// Working directory; `None` inherits the parent's
    pub current_dir: Option<PathBuf>,
    /// Startup information
    pub startup: StartupInfo,
}

/// Identity of a freshly created process as returned by the primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process handle
    pub process: HandleValue,
    /// Primary thread handle
    pub thread: HandleValue,
    /// Process id
    pub pid: u32,
    /// Primary thread id
    pub tid: u32,
}

/// Operating-system services used by the launcher
///
/// Implementations must be cheap to clone; clones share the same underlying
/// handle table.
pub trait OsApi: Clone {
    /// Parent-side stream object built from a handle
    type Stream: fmt::Debug + Send;

    /// Create an anonymous pipe; neither end is inheritable
    fn create_pipe(&self) -> io::Result<HandlePair>;

    /// Open the null device with the given access; not inheritable
    fn open_null_device(&self, access: Access) -> io::Result<HandleValue>;

    /// The parent's own handle for a standard stream, if it has one
    fn standard_handle(&self, stream: StdStream) -> Option<HandleValue>;

    /// Duplicate a handle into a new, inheritable handle
    fn duplicate_inheritable(&self, handle: HandleValue) -> io::Result<HandleValue>;

    /// Set or clear the inheritable bit of a handle
    fn set_inheritable(&self, handle: HandleValue, inheritable: bool) -> io::Result<()>;

    /// Close a handle owned by this process
    fn close_handle(&self, handle: HandleValue) -> io::Result<()>;

    /// Take ownership of a handle as a stream object
    fn into_stream(&self, handle: HandleValue) -> io::Result<Self::Stream>;

    /// Id of the current process
    fn current_process_id(&self) -> u32;

    /// Whether an explicit inheritable-handle list is available
    fn supports_restricted_inheritance(&self) -> bool;

    /// Invoke the process-creation primitive
    fn create_process(&self, request: &CreateProcessRequest) -> io::Result<ProcessInfo>;

    /// Wait for a process to exit, returning its exit code, or `None` if the
    /// timeout elapsed first. `None` as timeout waits forever.
    fn wait_process(&self, process: HandleValue, timeout: Option<Duration>)
        -> io::Result<Option<u32>>;

    /// Forcefully terminate a process
    fn terminate_process(&self, process: HandleValue, exit_code: u32) -> io::Result<()>;
}
