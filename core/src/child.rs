//! Child process wrapper
//!
//! `ChildProcess` is the caller-facing handle to a launched child. It does not
//! know how the child was created: any [`LaunchStrategy`] can produce one, and
//! [`ProcessLauncher`](crate::launcher::ProcessLauncher) is the strategy this
//! crate provides.

use crate::launcher::{ChildIdentity, Launched};
use crate::process::OsApi;
use crate::{CoreError, Result};
use schema::{BufferHint, HandleValue, LaunchSpec, StdStream, StreamMode};
use std::fmt;
use std::io::{self, BufReader, BufWriter, LineWriter, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// A way of turning a [`LaunchSpec`] into a running child
pub trait LaunchStrategy {
    /// OS services the launched child is managed with
    type Os: OsApi;

    /// The OS services used by this strategy
    fn os(&self) -> &Self::Os;

    /// Start a child process
    fn launch(&self, spec: LaunchSpec) -> Result<Launched<<Self::Os as OsApi>::Stream>>;
}

/// Parent-facing end of one of the child's standard streams
#[derive(Debug)]
pub struct ParentStream<S> {
    inner: S,
    stream: StdStream,
    mode: StreamMode,
    buffer: BufferHint,
}

impl<S> ParentStream<S> {
    /// Wrap a platform stream
    pub fn new(inner: S, stream: StdStream, mode: StreamMode, buffer: BufferHint) -> Self {
        Self {
            inner,
            stream,
            mode,
            buffer,
        }
    }

    /// Which of the child's streams this end belongs to
    pub fn stream(&self) -> StdStream {
        self.stream
    }

    /// Requested mode
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Requested buffering
    pub fn buffer(&self) -> BufferHint {
        self.buffer
    }

    /// Borrow the platform stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the platform stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap the platform stream
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read + Send + 'static> ParentStream<S> {
    /// Reader applying the requested buffering
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self.buffer.capacity() {
            None => Box::new(self),
            Some(capacity) => Box::new(BufReader::with_capacity(capacity, self)),
        }
    }
}

impl<S: Write + Send + 'static> ParentStream<S> {
    /// Writer applying the requested buffering
    pub fn into_writer(self) -> Box<dyn Write + Send> {
        match (self.buffer.whole(), self.buffer.capacity()) {
            (Some(1), _) => Box::new(LineWriter::new(self)),
            (_, None) => Box::new(self),
            (_, Some(capacity)) => Box::new(BufWriter::with_capacity(capacity, self)),
        }
    }
}

impl<S: Read> Read for ParentStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Write> Write for ParentStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Exit status of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(u32);

impl ExitStatus {
    /// Wrap a raw exit code
    pub fn from_code(code: u32) -> Self {
        ExitStatus(code)
    }

    /// The raw exit code
    pub fn code(&self) -> u32 {
        self.0
    }

    /// Whether the child exited with code 0
    pub fn success(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code: {}", self.0)
    }
}

/// A launched child process
///
/// Holds the process handle for the life of the wrapper; dropping it closes
/// the handle but does not terminate the child.
#[derive(Debug)]
pub struct ChildProcess<O: OsApi> {
    os: O,
    identity: ChildIdentity,
    status: Option<ExitStatus>,
    restricted_inheritance: bool,
    degraded: bool,
    /// Parent end of the child's standard input, if piped
    pub stdin: Option<ParentStream<O::Stream>>,
    /// Parent end of the child's standard output, if piped
    pub stdout: Option<ParentStream<O::Stream>>,
    /// Parent end of the child's standard error, if piped
    pub stderr: Option<ParentStream<O::Stream>>,
}

impl<O: OsApi> ChildProcess<O> {
    /// Launch a child with the given strategy
    pub fn spawn<L>(strategy: &L, spec: LaunchSpec) -> Result<Self>
    where
        L: LaunchStrategy<Os = O>,
    {
        let launched = strategy.launch(spec)?;
        Ok(Self::from_launched(strategy.os().clone(), launched))
    }

    /// Wrap the result of a launch
    pub fn from_launched(os: O, launched: Launched<O::Stream>) -> Self {
        Self {
            os,
            identity: launched.identity,
            status: None,
            restricted_inheritance: launched.restricted_inheritance,
            degraded: launched.degraded,
            stdin: launched.stdin,
            stdout: launched.stdout,
            stderr: launched.stderr,
        }
    }

    /// Process id
    pub fn id(&self) -> u32 {
        self.identity.pid
    }

    /// Primary thread id
    pub fn thread_id(&self) -> u32 {
        self.identity.tid
    }

    /// Process handle retained for the life of the child
    pub fn process_handle(&self) -> HandleValue {
        self.identity.process
    }

    /// Whether inheritance was limited to the standard-stream handles
    pub fn restricted_inheritance(&self) -> bool {
        self.restricted_inheritance
    }

    /// Whether a requested inheritance restriction could not be honored
    pub fn inheritance_degraded(&self) -> bool {
        self.degraded
    }

    /// Take the parent end of standard input
    pub fn take_stdin(&mut self) -> Option<ParentStream<O::Stream>> {
        self.stdin.take()
    }

    /// Take the parent end of standard output
    pub fn take_stdout(&mut self) -> Option<ParentStream<O::Stream>> {
        self.stdout.take()
    }

    /// Take the parent end of standard error
    pub fn take_stderr(&mut self) -> Option<ParentStream<O::Stream>> {
        self.stderr.take()
    }

    /// Wait for the process to exit and return its exit status
    ///
    /// Standard input is closed first so a child reading it sees end-of-stream.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        drop(self.stdin.take());
        match self.wait_for(None)? {
            Some(status) => Ok(status),
            None => Err(CoreError::ProcessWait(format!(
                "Infinite wait for process {} returned without an exit code",
                self.identity.pid
            ))),
        }
    }

    /// Check whether the process has exited without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        self.wait_for(Some(Duration::ZERO))
    }

    /// Wait up to `timeout` for the process to exit
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        self.wait_for(Some(timeout))
    }

    fn wait_for(&mut self, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
        let code = self
            .os
            .wait_process(self.identity.process, timeout)
            .map_err(|e| {
                CoreError::ProcessWait(format!(
                    "Failed to wait for process {}: {}",
                    self.identity.pid, e
                ))
            })?;
        if let Some(code) = code {
            let status = ExitStatus::from_code(code);
            debug!("Process {} exited with {}", self.identity.pid, status);
            self.status = Some(status);
        }
        Ok(self.status)
    }

    /// Forcefully terminate the process
    ///
    /// Killing a process that has already been reaped is a no-op.
    pub fn kill(&mut self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        debug!("Terminating process {}", self.identity.pid);
        self.os
            .terminate_process(self.identity.process, 1)
            .map_err(|e| {
                CoreError::ProcessTerminate(format!(
                    "Failed to terminate process {}: {}",
                    self.identity.pid, e
                ))
            })
    }
}

impl<O: OsApi> Drop for ChildProcess<O> {
    fn drop(&mut self) {
        if let Err(e) = self.os.close_handle(self.identity.process) {
            warn!(
                "Failed to close handle of process {}: {}",
                self.identity.pid, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::ProcessLauncher;
    use crate::process::{OsCall, RecordingOs};
    use schema::StreamRequest;

    #[test]
    fn test_spawn_and_wait() {
        let os = RecordingOs::new();
        os.set_exit_code(3);
        let launcher = ProcessLauncher::new(os.clone());

        let mut child = ChildProcess::spawn(&launcher, LaunchSpec::new(["tool.exe"])).unwrap();
        assert!(child.id() > 0);
        assert!(child.try_wait().unwrap().is_some());
        let status = child.wait().unwrap();
        assert_eq!(status.code(), 3);
        assert!(!status.success());
    }

    #[test]
    fn test_drop_closes_process_handle() {
        let os = RecordingOs::new();
        let launcher = ProcessLauncher::new(os.clone());
        let child = ChildProcess::spawn(&launcher, LaunchSpec::new(["tool.exe"])).unwrap();
        let process = child.process_handle();
        assert!(os.is_open(process));
        drop(child);
        assert!(!os.is_open(process));
    }

    #[test]
    fn test_wait_closes_stdin_first() {
        let os = RecordingOs::new();
        let launcher = ProcessLauncher::new(os.clone());
        let spec = LaunchSpec::new(["tool.exe"]).stdin(StreamRequest::Pipe);
        let mut child = ChildProcess::spawn(&launcher, spec).unwrap();
        let stdin_handle = child.stdin.as_ref().unwrap().get_ref().handle();
        assert!(os.is_open(stdin_handle));
        child.wait().unwrap();
        assert!(!os.is_open(stdin_handle));
    }

    #[test]
    fn test_kill_after_exit_is_noop() {
        let os = RecordingOs::new();
        let launcher = ProcessLauncher::new(os.clone());
        let mut child = ChildProcess::spawn(&launcher, LaunchSpec::new(["tool.exe"])).unwrap();
        child.wait().unwrap();
        child.kill().unwrap();
        assert!(!os
            .calls()
            .iter()
            .any(|c| matches!(c, OsCall::Terminate { .. })));
    }

    #[test]
    fn test_kill_terminates_running_child() {
        let os = RecordingOs::new();
        let launcher = ProcessLauncher::new(os.clone());
        let mut child = ChildProcess::spawn(&launcher, LaunchSpec::new(["tool.exe"])).unwrap();
        child.kill().unwrap();
        let process = child.process_handle();
        assert!(os.calls().contains(&OsCall::Terminate {
            process,
            exit_code: 1
        }));
    }

    #[test]
    fn test_parent_stream_buffering() {
        let os = RecordingOs::new();
        let pair = os.create_pipe().unwrap();
        let stream = os.into_stream(pair.write).unwrap();
        let mut writer =
            ParentStream::new(stream, StdStream::Input, StreamMode::Binary, BufferHint::LINE)
                .into_writer();
        writer.write_all(b"line\n").unwrap();
        writer.flush().unwrap();

        let stream = os.into_stream(pair.read).unwrap();
        let parent = ParentStream::new(
            stream,
            StdStream::Output,
            StreamMode::Text,
            BufferHint::UNBUFFERED,
        );
        assert_eq!(parent.stream(), StdStream::Output);
        assert_eq!(parent.mode(), StreamMode::Text);
        let mut reader = parent.into_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
