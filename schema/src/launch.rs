//! Launch request description
//!
//! `LaunchSpec` is the single, fully-specified request handed to the launcher.
//! It is owned by the caller until launch begins and is not modified after.

use crate::stream::{BufferHint, StdStream, StreamMode, StreamRequest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete description of one child process launch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchSpec {
    /// Ordered argument list; the first element names the program when
    /// `executable` is unset
    pub args: Vec<String>,

    /// Explicit program path overriding `args[0]` as the image to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Working directory for the child; inherits the parent's when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Complete environment for the child; inherits the parent's when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,

    /// Standard input of the child
    pub stdin: StreamRequest,

    /// Standard output of the child
    pub stdout: StreamRequest,

    /// Standard error of the child
    pub stderr: StreamRequest,

    /// Restrict inheritance to the resolved standard-stream handles
    pub close_other_handles: bool,

    /// Shell-interpreted launch; always rejected
    pub shell: bool,

    /// Additional platform creation flags, OR'd with the new-process-group bit
    pub creation_flags: u32,

    /// Mode for parent-facing pipe ends
    pub stream_mode: StreamMode,

    /// Buffering hint for parent-facing pipe ends
    #[serde(rename = "bufsize")]
    pub buffer: BufferHint,

    /// Pass pipe handle values to the child as trailing arguments
    pub pass_handles_over_command_line: bool,
}

impl LaunchSpec {
    /// Create a spec for the given argument list with every other field at
    /// its default
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the explicit executable path
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Replace the child's environment with the given mapping
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set the standard input request
    pub fn stdin(mut self, request: StreamRequest) -> Self {
        self.stdin = request;
        self
    }

    /// Set the standard output request
    pub fn stdout(mut self, request: StreamRequest) -> Self {
        self.stdout = request;
        self
    }

    /// Set the standard error request
    pub fn stderr(mut self, request: StreamRequest) -> Self {
        self.stderr = request;
        self
    }

    /// Restrict inherited handles to the standard streams
    pub fn close_other_handles(mut self, enabled: bool) -> Self {
        self.close_other_handles = enabled;
        self
    }

    /// Request a shell launch (rejected by the launcher)
    pub fn shell(mut self, enabled: bool) -> Self {
        self.shell = enabled;
        self
    }

    /// Add platform creation flags
    pub fn creation_flags(mut self, flags: u32) -> Self {
        self.creation_flags = flags;
        self
    }

    /// Set the mode of created pipe ends
    pub fn stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    /// Set the buffering hint of created pipe ends
    pub fn buffer(mut self, hint: impl Into<BufferHint>) -> Self {
        self.buffer = hint.into();
        self
    }

    /// Select the command-line handle transfer strategy
    pub fn pass_handles_over_command_line(mut self, enabled: bool) -> Self {
        self.pass_handles_over_command_line = enabled;
        self
    }

    /// The request for one standard stream
    pub fn stream(&self, stream: StdStream) -> StreamRequest {
        match stream {
            StdStream::Input => self.stdin,
            StdStream::Output => self.stdout,
            StdStream::Error => self.stderr,
        }
    }

    /// Replace the request for one standard stream
    pub fn set_stream(&mut self, stream: StdStream, request: StreamRequest) {
        match stream {
            StdStream::Input => self.stdin = request,
            StdStream::Output => self.stdout = request,
            StdStream::Error => self.stderr = request,
        }
    }

    /// Whether any standard stream is redirected away from the parent's
    pub fn redirects_any_stream(&self) -> bool {
        StdStream::ALL.iter().any(|s| self.stream(*s).is_redirected())
    }

    /// Program name used in logs: the executable when set, else `args[0]`
    pub fn program(&self) -> Option<String> {
        self.executable
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| self.args.first().cloned())
    }
}
