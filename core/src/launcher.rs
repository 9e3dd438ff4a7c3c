//! Process launcher with explicit control over inherited handles
//!
//! `ProcessLauncher::launch` turns one [`LaunchSpec`] into exactly one call to
//! the platform's process-creation primitive:
//!
//! 1. Reject shell launches and malformed specs before touching the OS
//! 2. Always add the new-process-group creation flag
//! 3. Resolve stream requests into handles (or negotiate a command-line
//!    handle transfer)
//! 4. Fill the startup information's standard-handle slots
//! 5. Restrict inheritance to those handles when asked to and able to
//! 6. Encode an explicit environment block if one was given
//! 7. Render the command line
//! 8. Create the process
//! 9. Close the parent's copies of everything handed to the child, on every
//!    exit path
//! 10. Close the primary-thread handle and return the child's identity
//!
//! Step 9 is what lets a reader of a child's output pipe see end-of-stream:
//! as long as the parent holds a copy of the write end, the pipe stays open
//! after the child exits.

use crate::child::{LaunchStrategy, ParentStream};
use crate::closer::ParentHandleCloser;
use crate::cmdline::{encode_environment_block, ensure_no_nul, render_command_line};
use crate::inheritance::{
    HandleInheritanceAttributeBuilder, InheritanceDirective, InheritancePlan, InheritancePolicy,
};
use crate::process::{
    CreateProcessRequest, OsApi, StartupInfo, CREATE_NEW_PROCESS_GROUP,
    CREATE_UNICODE_ENVIRONMENT, EXTENDED_STARTUPINFO_PRESENT,
};
use crate::transfer::PipeHandleTransferNegotiator;
use crate::{CoreError, Result};
use schema::{BufferHint, HandleValue, LaunchSpec, StdStream, StreamRequest};
use tracing::{debug, error, info, warn};

/// Identity of a successfully created child
///
/// Exists only if the process-creation primitive succeeded. The primary-thread
/// handle has already been closed; the process handle is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildIdentity {
    /// Process handle, kept open for the life of the child
    pub process: HandleValue,
    /// Process id
    pub pid: u32,
    /// Primary thread id
    pub tid: u32,
}

/// Result of a successful launch
#[derive(Debug)]
pub struct Launched<S> {
    /// The child's identity
    pub identity: ChildIdentity,
    /// Parent end of a piped standard input
    pub stdin: Option<ParentStream<S>>,
    /// Parent end of a piped standard output
    pub stdout: Option<ParentStream<S>>,
    /// Parent end of a piped standard error
    pub stderr: Option<ParentStream<S>>,
    /// Inheritance was limited to the standard-stream handles
    pub restricted_inheritance: bool,
    /// `close_other_handles` was requested but not honored
    pub degraded: bool,
}

/// Launches child processes through an [`OsApi`]
#[derive(Debug, Clone)]
pub struct ProcessLauncher<O: OsApi> {
    os: O,
    policy: InheritancePolicy,
}

#[cfg(windows)]
impl ProcessLauncher<crate::process::WindowsApi> {
    /// Launcher backed by the Windows API
    pub fn native() -> Self {
        Self::new(crate::process::WindowsApi::new())
    }
}

impl<O: OsApi> ProcessLauncher<O> {
    /// Create a launcher with the degrading inheritance policy
    pub fn new(os: O) -> Self {
        Self {
            os,
            policy: InheritancePolicy::Degrade,
        }
    }

    /// Choose what happens when restricted inheritance is unavailable
    pub fn with_policy(mut self, policy: InheritancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The configured inheritance policy
    pub fn policy(&self) -> InheritancePolicy {
        self.policy
    }

    /// The OS services this launcher uses
    pub fn os(&self) -> &O {
        &self.os
    }

    fn inheritance_builder(&self) -> HandleInheritanceAttributeBuilder {
        HandleInheritanceAttributeBuilder::new(self.os.supports_restricted_inheritance(), self.policy)
    }

    /// Reject everything that can be rejected before any handle exists
    fn validate(&self, spec: &LaunchSpec) -> Result<()> {
        if spec.shell {
            return Err(CoreError::ValidationError(
                "shell: shell-interpreted launches are not supported".to_string(),
            ));
        }
        if spec.args.is_empty() && spec.executable.is_none() {
            return Err(CoreError::ValidationError(
                "args: cannot be empty when no executable is set".to_string(),
            ));
        }
        for (i, arg) in spec.args.iter().enumerate() {
            ensure_no_nul(arg, &format!("args[{}]", i))?;
        }
        if spec.pass_handles_over_command_line {
            PipeHandleTransferNegotiator::validate(spec)?;
            if spec.close_other_handles && self.policy == InheritancePolicy::Strict {
                return Err(CoreError::InheritanceUnsupported(
                    "handles passed over the command line require unrestricted inheritance"
                        .to_string(),
                ));
            }
        } else if spec.buffer.checked().is_none() {
            return Err(CoreError::ValidationError(format!(
                "bufsize: must be a whole number no larger than {}, got {}",
                BufferHint::MAX_CAPACITY,
                spec.buffer.0
            )));
        }
        if spec.close_other_handles && self.inheritance_builder().rejects_restriction() {
            return Err(CoreError::InheritanceUnsupported(
                "the platform has no inheritable-handle list".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn each stream request into the handle placed in the child's slot
    ///
    /// Every handle created here is registered with `closer`; parent ends of
    /// new pipes are wrapped into `streams`.
    fn resolve_streams(
        &self,
        spec: &LaunchSpec,
        closer: &mut ParentHandleCloser<'_, O>,
        streams: &mut [Option<ParentStream<O::Stream>>; 3],
    ) -> Result<[Option<HandleValue>; 3]> {
        let os = &self.os;
        let mut handles = [None; 3];

        for stream in StdStream::ALL {
            let handle = match spec.stream(stream) {
                StreamRequest::Inherit => match os.standard_handle(stream) {
                    Some(own) => {
                        let dup = os.duplicate_inheritable(own)?;
                        closer.push(dup);
                        Some(dup)
                    }
                    None => None,
                },
                StreamRequest::Pipe => {
                    let pair = os.create_pipe()?;
                    let child_end = pair.end(stream.child_access());
                    let parent_end = pair.end(stream.parent_access());
                    closer.push(child_end);
                    closer.push(parent_end);
                    let inner = os.into_stream(parent_end)?;
                    closer.release(parent_end);
                    streams[stream.index()] = Some(ParentStream::new(
                        inner,
                        stream,
                        spec.stream_mode,
                        spec.buffer,
                    ));
                    os.set_inheritable(child_end, true)?;
                    Some(child_end)
                }
                StreamRequest::Null => {
                    let null = os.open_null_device(stream.child_access())?;
                    closer.push(null);
                    os.set_inheritable(null, true)?;
                    Some(null)
                }
                StreamRequest::ExplicitHandle(own) => {
                    let dup = os.duplicate_inheritable(own)?;
                    closer.push(dup);
                    Some(dup)
                }
            };
            debug!("Resolved {} to {:?}", stream, handle);
            handles[stream.index()] = handle;
        }
        Ok(handles)
    }

    /// Launch a child process
    pub fn launch(&self, spec: LaunchSpec) -> Result<Launched<O::Stream>> {
        self.validate(&spec)?;
        let program = spec.program().unwrap_or_default();

        let environment = spec
            .env
            .as_ref()
            .map(encode_environment_block)
            .transpose()?;

        let mut creation_flags = spec.creation_flags | CREATE_NEW_PROCESS_GROUP;
        let mut args = spec.args.clone();
        let mut closer = ParentHandleCloser::new(&self.os);
        let mut streams: [Option<ParentStream<O::Stream>>; 3] = [None, None, None];

        let transfer = spec.pass_handles_over_command_line;
        let (std_handles, plan) = if transfer {
            let negotiated = PipeHandleTransferNegotiator.negotiate(&self.os, &spec)?;
            for handle in negotiated.child_handles {
                closer.push(handle);
            }
            args.extend(negotiated.trailing_args);
            streams = negotiated.parent_streams;

            if spec.close_other_handles {
                warn!(
                    "Inheritance restriction ignored for '{}': transferred handles need unrestricted inheritance",
                    program
                );
            }
            let plan = InheritancePlan {
                directive: InheritanceDirective::InheritAll,
                extended: false,
                degraded: spec.close_other_handles,
            };
            ([None; 3], plan)
        } else {
            let std_handles = if spec.redirects_any_stream() {
                self.resolve_streams(&spec, &mut closer, &mut streams)?
            } else {
                [None; 3]
            };
            let plan = self
                .inheritance_builder()
                .build(spec.close_other_handles, &std_handles)?;
            (std_handles, plan)
        };

        let redirected = std_handles.iter().any(Option::is_some);
        let handle_list = plan
            .handle_list()
            .filter(|list| !list.is_empty())
            .map(<[HandleValue]>::to_vec);
        if handle_list.is_some() {
            creation_flags |= EXTENDED_STARTUPINFO_PRESENT;
        }
        let inherit_handles = redirected || transfer || handle_list.is_some();

        if environment.is_some() {
            creation_flags |= CREATE_UNICODE_ENVIRONMENT;
        }

        let request = CreateProcessRequest {
            application: spec.executable.clone(),
            command_line: render_command_line(&args),
            inherit_handles,
            creation_flags,
            environment,
            current_dir: spec.cwd.clone(),
            startup: StartupInfo {
                use_std_handles: redirected,
                std_handles,
                handle_list,
            },
        };
        debug!(
            "Creating process '{}': command line {:?}, inherit {}, flags {:#x}",
            program, request.command_line, request.inherit_handles, request.creation_flags
        );

        let created = self.os.create_process(&request);
        closer.close_all();

        let info = match created {
            Ok(info) => info,
            Err(e) => {
                let code = e.raw_os_error().map(|c| c as u32).unwrap_or_default();
                error!("Failed to create process '{}': {}", program, e);
                return Err(CoreError::ProcessCreation {
                    code,
                    message: format!("'{}': {}", program, e),
                });
            }
        };

        if let Err(e) = self.os.close_handle(info.thread) {
            warn!("Failed to close thread handle of process {}: {}", info.pid, e);
        }

        let restricted_inheritance = !transfer
            && matches!(plan.directive, InheritanceDirective::InheritExactly(_));
        info!(
            "Launched '{}' as process {} (restricted inheritance: {})",
            program, info.pid, restricted_inheritance
        );

        let [stdin, stdout, stderr] = streams;
        Ok(Launched {
            identity: ChildIdentity {
                process: info.process,
                pid: info.pid,
                tid: info.tid,
            },
            stdin,
            stdout,
            stderr,
            restricted_inheritance,
            degraded: plan.degraded,
        })
    }
}

impl<O: OsApi> LaunchStrategy for ProcessLauncher<O> {
    type Os = O;

    fn os(&self) -> &O {
        &self.os
    }

    fn launch(&self, spec: LaunchSpec) -> Result<Launched<O::Stream>> {
        ProcessLauncher::launch(self, spec)
    }
}
