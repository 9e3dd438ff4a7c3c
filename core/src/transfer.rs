//! Passing pipe handles to the child on its command line
//!
//! Instead of placing pipe ends in the child's standard-handle slots, this
//! strategy creates the pipes up front and tells the child where they are by
//! appending four decimal arguments to its command line:
//!
//! ```text
//! <program> <args...> <parent pid> <stdin handle> <stdout handle> <stderr handle>
//! ```
//!
//! A cooperating child pops these four arguments and opens its streams from
//! the numeric handle values. The values are only meaningful in the child if
//! the handles are inherited unrestricted, so launches using this strategy
//! always inherit every inheritable handle.

use crate::child::ParentStream;
use crate::closer::ParentHandleCloser;
use crate::process::OsApi;
use crate::{CoreError, Result};
use schema::{BufferHint, HandleValue, LaunchSpec, StdStream, StreamRequest};
use tracing::debug;

/// Number of trailing arguments the protocol appends
pub const TRAILING_ARGS: usize = 4;

/// Outcome of a successful negotiation
#[derive(Debug)]
pub struct HandleTransfer<S> {
    /// Arguments to append: parent pid, then stdin, stdout and stderr handles
    pub trailing_args: [String; TRAILING_ARGS],
    /// Child-facing handles in input, output, error order
    pub child_handles: [HandleValue; 3],
    /// Parent-facing stream objects; `None` for streams sent to the null device
    pub parent_streams: [Option<ParentStream<S>>; 3],
}

/// Creates the pipes for the command-line handle transfer
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeHandleTransferNegotiator;

impl PipeHandleTransferNegotiator {
    /// Check that a spec can use the transfer strategy
    ///
    /// Touches no OS resource. Every stream must be `Pipe` or `Null` so the
    /// child always finds its handles at the same argument positions.
    pub fn validate(spec: &LaunchSpec) -> Result<()> {
        if spec.buffer.checked().is_none() {
            return Err(CoreError::ValidationError(format!(
                "bufsize: must be a whole number no larger than {} when passing handles over the command line, got {}",
                BufferHint::MAX_CAPACITY,
                spec.buffer.0
            )));
        }
        for stream in StdStream::ALL {
            let request = spec.stream(stream);
            if !request.is_transferable() {
                return Err(CoreError::ValidationError(format!(
                    "{}: only pipe or null is supported when passing handles over the command line, got {:?}",
                    stream, request
                )));
            }
        }
        Ok(())
    }

    /// Create the pipes and null-device handles and encode the trailing
    /// arguments
    ///
    /// On error every handle created so far is closed again. On success the
    /// caller owns `child_handles` and must close them in the parent once the
    /// child has been created.
    pub fn negotiate<O: OsApi>(&self, os: &O, spec: &LaunchSpec) -> Result<HandleTransfer<O::Stream>> {
        Self::validate(spec)?;

        let mut created = ParentHandleCloser::new(os);
        let mut parent_streams: [Option<ParentStream<O::Stream>>; 3] = [None, None, None];
        let mut child_handles = [HandleValue(0); 3];

        for stream in StdStream::ALL {
            let child_end = match spec.stream(stream) {
                StreamRequest::Pipe => {
                    let pair = os.create_pipe()?;
                    let child_end = pair.end(stream.child_access());
                    let parent_end = pair.end(stream.parent_access());
                    created.push(child_end);
                    created.push(parent_end);

                    let inner = os.into_stream(parent_end)?;
                    created.release(parent_end);
                    parent_streams[stream.index()] = Some(ParentStream::new(
                        inner,
                        stream,
                        spec.stream_mode,
                        spec.buffer,
                    ));
                    child_end
                }
                // validate() admits nothing else
                _ => {
                    let handle = os.open_null_device(stream.child_access())?;
                    created.push(handle);
                    handle
                }
            };
            os.set_inheritable(child_end, true)?;
            child_handles[stream.index()] = child_end;
            debug!("Transferring {} as handle {}", stream, child_end);
        }

        let trailing_args = [
            os.current_process_id().to_string(),
            child_handles[0].to_string(),
            child_handles[1].to_string(),
            child_handles[2].to_string(),
        ];
        created.disarm();

        Ok(HandleTransfer {
            trailing_args,
            child_handles,
            parent_streams,
        })
    }
}
