//! Parent-side cleanup of handles handed to a child
//!
//! Once a child has been created (or creation has failed), the parent's copies
//! of the child's stream ends must go. A surviving copy of a pipe's write end
//! keeps the pipe from ever reporting end-of-stream to its reader.

use crate::process::OsApi;
use schema::HandleValue;
use tracing::{debug, warn};

/// Closes a set of handles in the parent on every exit path
///
/// Handles are closed by [`close_all`](Self::close_all) or, if that never
/// runs, when the closer is dropped.
#[derive(Debug)]
pub struct ParentHandleCloser<'a, O: OsApi> {
    os: &'a O,
    handles: Vec<HandleValue>,
}

impl<'a, O: OsApi> ParentHandleCloser<'a, O> {
    /// Create an empty closer
    pub fn new(os: &'a O) -> Self {
        Self {
            os,
            handles: Vec::new(),
        }
    }

    /// Register a handle to be closed
    pub fn push(&mut self, handle: HandleValue) {
        if !self.handles.contains(&handle) {
            self.handles.push(handle);
        }
    }

    /// Handles still pending
    pub fn pending(&self) -> &[HandleValue] {
        &self.handles
    }

    /// Stop tracking a handle whose ownership moved elsewhere
    pub fn release(&mut self, handle: HandleValue) {
        self.handles.retain(|h| *h != handle);
    }

    /// Stop tracking every handle, returning them without closing
    pub fn disarm(&mut self) -> Vec<HandleValue> {
        std::mem::take(&mut self.handles)
    }

    /// Close every registered handle now, returning how many closed cleanly
    ///
    /// A failing close is logged and does not stop the others.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for handle in self.handles.drain(..) {
            match self.os.close_handle(handle) {
                Ok(()) => {
                    debug!("Closed parent copy of handle {}", handle);
                    closed += 1;
                }
                Err(e) => warn!("Failed to close parent copy of handle {}: {}", handle, e),
            }
        }
        closed
    }
}

impl<O: OsApi> Drop for ParentHandleCloser<'_, O> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.close_all();
        }
    }
}
