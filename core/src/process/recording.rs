//! In-memory `OsApi` that records calls
//!
//! `RecordingOs` hands out synthetic handle values, tracks which of them are
//! open and inheritable, and records every call in order. It also models what
//! the platform would copy into a child's handle table, so inheritance rules
//! can be verified without creating real processes.

use super::{CreateProcessRequest, HandlePair, OsApi, ProcessInfo};
use schema::{Access, HandleValue, StdStream};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Native error code for an invalid parameter
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// Native error code for an invalid handle
pub const ERROR_INVALID_HANDLE: u32 = 6;

/// A recorded OS call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsCall {
    /// A pipe was created
    CreatePipe {
        /// Read end
        read: HandleValue,
        /// Write end
        write: HandleValue,
    },
    /// The null device was opened
    OpenNull {
        /// Requested access
        access: Access,
        /// Handle returned
        handle: HandleValue,
    },
    /// A handle was duplicated as inheritable
    DuplicateInheritable {
        /// Source handle
        source: HandleValue,
        /// New handle
        duplicate: HandleValue,
    },
    /// A handle's inheritable bit was changed
    SetInheritable {
        /// Target handle
        handle: HandleValue,
        /// New value of the bit
        inheritable: bool,
    },
    /// A handle was closed
    Close {
        /// Closed handle
        handle: HandleValue,
    },
    /// A handle was turned into a stream
    IntoStream {
        /// Wrapped handle
        handle: HandleValue,
    },
    /// The process-creation primitive was invoked
    CreateProcess(CreateProcessRequest),
    /// A process was waited on
    Wait {
        /// Process handle
        process: HandleValue,
    },
    /// A process was terminated
    Terminate {
        /// Process handle
        process: HandleValue,
        /// Exit code given
        exit_code: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HandleEntry {
    inheritable: bool,
}

#[derive(Debug)]
struct RecordingState {
    next_handle: u64,
    next_pid: u32,
    open: BTreeMap<HandleValue, HandleEntry>,
    calls: Vec<OsCall>,
    std_handles: [Option<HandleValue>; 3],
    restricted_supported: bool,
    fail_next_create: Option<u32>,
    exit_code: u32,
    child_handles: Option<Vec<HandleValue>>,
}

impl RecordingState {
    fn allocate(&mut self, inheritable: bool) -> HandleValue {
        let handle = HandleValue(self.next_handle);
        self.next_handle += 4;
        self.open.insert(handle, HandleEntry { inheritable });
        handle
    }

    fn entry(&self, handle: HandleValue) -> io::Result<HandleEntry> {
        self.open
            .get(&handle)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(ERROR_INVALID_HANDLE as i32))
    }
}

/// Recording, in-memory implementation of [`OsApi`]
///
/// Clones share state, so a test can keep one clone for inspection while the
/// launcher owns another.
#[derive(Debug, Clone)]
pub struct RecordingOs {
    state: Arc<Mutex<RecordingState>>,
}

impl Default for RecordingOs {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingOs {
    /// Create a handle table with three non-inheritable standard handles and
    /// restricted inheritance available
    pub fn new() -> Self {
        let mut state = RecordingState {
            next_handle: 0x40,
            next_pid: 4200,
            open: BTreeMap::new(),
            calls: Vec::new(),
            std_handles: [None; 3],
            restricted_supported: true,
            fail_next_create: None,
            exit_code: 0,
            child_handles: None,
        };
        for slot in 0..3 {
            state.std_handles[slot] = Some(state.allocate(false));
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        // A panicking test thread must not hide the recorded state from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Report restricted inheritance as unavailable
    pub fn without_restricted_inheritance(self) -> Self {
        self.lock().restricted_supported = false;
        self
    }

    /// Give the parent no standard handles at all
    pub fn without_standard_handles(self) -> Self {
        {
            let mut state = self.lock();
            let handles = state.std_handles;
            for handle in handles.into_iter().flatten() {
                state.open.remove(&handle);
            }
            state.std_handles = [None; 3];
        }
        self
    }

    /// Make the next `create_process` call fail with the given native code
    pub fn fail_next_create(&self, code: u32) {
        self.lock().fail_next_create = Some(code);
    }

    /// Exit code reported by `wait_process`
    pub fn set_exit_code(&self, code: u32) {
        self.lock().exit_code = code;
    }

    /// Open an unrelated handle in the parent, as other code in the process
    /// might, and return it
    pub fn open_unrelated_handle(&self, inheritable: bool) -> HandleValue {
        self.lock().allocate(inheritable)
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<OsCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Every recorded process-creation request
    pub fn create_requests(&self) -> Vec<CreateProcessRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                OsCall::CreateProcess(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    /// Handles currently open in the parent
    pub fn open_handles(&self) -> Vec<HandleValue> {
        self.lock().open.keys().copied().collect()
    }

    /// Whether a handle is currently open in the parent
    pub fn is_open(&self, handle: HandleValue) -> bool {
        self.lock().open.contains_key(&handle)
    }

    /// Whether an open handle is inheritable
    pub fn is_inheritable(&self, handle: HandleValue) -> bool {
        self.lock()
            .open
            .get(&handle)
            .map(|e| e.inheritable)
            .unwrap_or(false)
    }

    /// Handles the most recently created child received through inheritance
    pub fn last_child_handles(&self) -> Option<Vec<HandleValue>> {
        self.lock().child_handles.clone()
    }
}

impl OsApi for RecordingOs {
    type Stream = RecordedStream;

    fn create_pipe(&self) -> io::Result<HandlePair> {
        let mut state = self.lock();
        let read = state.allocate(false);
        let write = state.allocate(false);
        state.calls.push(OsCall::CreatePipe { read, write });
        Ok(HandlePair { read, write })
    }

    fn open_null_device(&self, access: Access) -> io::Result<HandleValue> {
        let mut state = self.lock();
        let handle = state.allocate(false);
        state.calls.push(OsCall::OpenNull { access, handle });
        Ok(handle)
    }

    fn standard_handle(&self, stream: StdStream) -> Option<HandleValue> {
        self.lock().std_handles[stream.index()]
    }

    fn duplicate_inheritable(&self, handle: HandleValue) -> io::Result<HandleValue> {
        let mut state = self.lock();
        state.entry(handle)?;
        let duplicate = state.allocate(true);
        state.calls.push(OsCall::DuplicateInheritable {
            source: handle,
            duplicate,
        });
        Ok(duplicate)
    }

    fn set_inheritable(&self, handle: HandleValue, inheritable: bool) -> io::Result<()> {
        let mut state = self.lock();
        state.entry(handle)?;
        state.open.insert(handle, HandleEntry { inheritable });
        state.calls.push(OsCall::SetInheritable {
            handle,
            inheritable,
        });
        Ok(())
    }

    fn close_handle(&self, handle: HandleValue) -> io::Result<()> {
        let mut state = self.lock();
        state.calls.push(OsCall::Close { handle });
        state
            .open
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| io::Error::from_raw_os_error(ERROR_INVALID_HANDLE as i32))
    }

    fn into_stream(&self, handle: HandleValue) -> io::Result<RecordedStream> {
        let mut state = self.lock();
        state.entry(handle)?;
        state.calls.push(OsCall::IntoStream { handle });
        Ok(RecordedStream {
            handle,
            os: self.clone(),
            written: Vec::new(),
        })
    }

    fn current_process_id(&self) -> u32 {
        1000
    }

    fn supports_restricted_inheritance(&self) -> bool {
        self.lock().restricted_supported
    }

    fn create_process(&self, request: &CreateProcessRequest) -> io::Result<ProcessInfo> {
        let mut state = self.lock();
        state.calls.push(OsCall::CreateProcess(request.clone()));

        if let Some(code) = state.fail_next_create.take() {
            debug!("RecordingOs: failing create_process with {}", code);
            return Err(io::Error::from_raw_os_error(code as i32));
        }

        for handle in request.startup.std_handles.iter().flatten() {
            state.entry(*handle)?;
        }

        let inherited = if !request.inherit_handles {
            Vec::new()
        } else if let Some(list) = &request.startup.handle_list {
            if list.is_empty() {
                return Err(io::Error::from_raw_os_error(ERROR_INVALID_PARAMETER as i32));
            }
            for handle in list {
                if !state.entry(*handle)?.inheritable {
                    return Err(io::Error::from_raw_os_error(ERROR_INVALID_PARAMETER as i32));
                }
            }
            list.clone()
        } else {
            state
                .open
                .iter()
                .filter(|(_, e)| e.inheritable)
                .map(|(h, _)| *h)
                .collect()
        };
        state.child_handles = Some(inherited);

        let process = state.allocate(false);
        let thread = state.allocate(false);
        let pid = state.next_pid;
        state.next_pid += 4;
        Ok(ProcessInfo {
            process,
            thread,
            pid,
            tid: pid + 1,
        })
    }

    fn wait_process(
        &self,
        process: HandleValue,
        _timeout: Option<Duration>,
    ) -> io::Result<Option<u32>> {
        let mut state = self.lock();
        state.entry(process)?;
        state.calls.push(OsCall::Wait { process });
        Ok(Some(state.exit_code))
    }

    fn terminate_process(&self, process: HandleValue, exit_code: u32) -> io::Result<()> {
        let mut state = self.lock();
        state.entry(process)?;
        state.calls.push(OsCall::Terminate { process, exit_code });
        state.exit_code = exit_code;
        Ok(())
    }
}

/// Stream handed out by [`RecordingOs`]
///
/// Reads report end-of-stream, writes are kept in memory. Dropping the stream
/// releases its handle, like closing a file would.
#[derive(Debug)]
pub struct RecordedStream {
    handle: HandleValue,
    os: RecordingOs,
    written: Vec<u8>,
}

impl RecordedStream {
    /// Handle backing this stream
    pub fn handle(&self) -> HandleValue {
        self.handle
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for RecordedStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Write for RecordedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RecordedStream {
    fn drop(&mut self) {
        self.os.lock().open.remove(&self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_has_standard_handles() {
        let os = RecordingOs::new();
        let handles: Vec<_> = StdStream::ALL
            .iter()
            .filter_map(|s| os.standard_handle(*s))
            .collect();
        assert_eq!(handles.len(), 3);
        assert_eq!(os.open_handles(), handles);
        assert_eq!(os.call_count(), 0);
    }

    #[test]
    fn test_pipe_ends_are_not_inheritable() {
        let os = RecordingOs::new();
        let pair = os.create_pipe().unwrap();
        assert_ne!(pair.read, pair.write);
        assert!(os.is_open(pair.read));
        assert!(!os.is_inheritable(pair.write));
    }

    #[test]
    fn test_close_unknown_handle_fails() {
        let os = RecordingOs::new();
        let err = os.close_handle(HandleValue(1)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(ERROR_INVALID_HANDLE as i32));
    }

    #[test]
    fn test_inherit_all_copies_every_inheritable_handle() {
        let os = RecordingOs::new();
        let loose = os.open_unrelated_handle(true);
        let private = os.open_unrelated_handle(false);
        let request = CreateProcessRequest {
            application: None,
            command_line: "child".to_string(),
            inherit_handles: true,
            creation_flags: 0,
            environment: None,
            current_dir: None,
            startup: Default::default(),
        };
        os.create_process(&request).unwrap();
        let inherited = os.last_child_handles().unwrap();
        assert!(inherited.contains(&loose));
        assert!(!inherited.contains(&private));
    }

    #[test]
    fn test_stream_drop_releases_handle() {
        let os = RecordingOs::new();
        let pair = os.create_pipe().unwrap();
        let mut stream = os.into_stream(pair.write).unwrap();
        stream.write_all(b"abc").unwrap();
        assert_eq!(stream.written(), b"abc");
        drop(stream);
        assert!(!os.is_open(pair.write));
        assert!(os.is_open(pair.read));
    }
}
