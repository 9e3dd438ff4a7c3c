//! Windows implementation of the OS seam
//!
//! Thin wrappers over `windows-sys`. Each function converts between
//! [`HandleValue`] and the platform's `HANDLE` and turns a failed call into
//! `io::Error::last_os_error()`, so the native error code survives up to
//! `CoreError::ProcessCreation`.
//!
//! ## Safety
//!
//! - Handle values passed in are owned by the caller for the duration of the
//!   call; nothing here closes a handle it was not asked to close
//! - The inheritable-handle list and its attribute buffer are kept alive in an
//!   [`AttributeList`] until after `CreateProcessW` returns

// Allow unsafe code for this module since every operation is a Win32 call
#![allow(unsafe_code)]

use super::{CreateProcessRequest, HandlePair, OsApi, ProcessInfo};
use schema::{Access, HandleValue, StdStream};
use std::ffi::{c_void, OsStr};
use std::fs::{File, OpenOptions};
use std::io;
use std::mem::{size_of, zeroed};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{FromRawHandle, IntoRawHandle, OwnedHandle};
use std::ptr;
use std::time::Duration;
use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, DuplicateHandle, SetHandleInformation, DUPLICATE_SAME_ACCESS, HANDLE,
    HANDLE_FLAG_INHERIT, INVALID_HANDLE_VALUE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows_sys::Win32::System::Pipes::CreatePipe;
use windows_sys::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, GetCurrentProcess, GetCurrentProcessId,
    GetExitCodeProcess, InitializeProcThreadAttributeList, TerminateProcess,
    UpdateProcThreadAttribute, WaitForSingleObject, INFINITE, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROCESS_INFORMATION, PROC_THREAD_ATTRIBUTE_HANDLE_LIST, STARTF_USESTDHANDLES,
    STARTUPINFOEXW, STARTUPINFOW,
};

fn raw(handle: HandleValue) -> HANDLE {
    handle.as_raw() as usize as HANDLE
}

fn value(handle: HANDLE) -> HandleValue {
    HandleValue(handle as usize as u64)
}

fn raw_or_null(handle: Option<HandleValue>) -> HANDLE {
    handle.map_or(ptr::null_mut(), raw)
}

fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(Some(0)).collect()
}

fn check(ok: i32) -> io::Result<()> {
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A `PROC_THREAD_ATTRIBUTE_LIST` carrying an inheritable-handle list
struct AttributeList {
    // usize elements keep the buffer pointer-aligned
    buffer: Vec<usize>,
    handles: Box<[HANDLE]>,
}

impl AttributeList {
    fn with_handle_list(handles: Vec<HANDLE>) -> io::Result<Self> {
        let mut size = 0usize;
        // Sizing call; fails with ERROR_INSUFFICIENT_BUFFER by contract
        unsafe { InitializeProcThreadAttributeList(ptr::null_mut(), 1, 0, &mut size) };
        if size == 0 {
            return Err(io::Error::last_os_error());
        }

        let mut buffer = vec![0usize; size.div_ceil(size_of::<usize>())];
        check(unsafe {
            InitializeProcThreadAttributeList(
                buffer.as_mut_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST,
                1,
                0,
                &mut size,
            )
        })?;

        let list = Self {
            buffer,
            handles: handles.into_boxed_slice(),
        };
        check(unsafe {
            UpdateProcThreadAttribute(
                list.as_ptr(),
                0,
                PROC_THREAD_ATTRIBUTE_HANDLE_LIST as usize,
                list.handles.as_ptr() as *const c_void,
                list.handles.len() * size_of::<HANDLE>(),
                ptr::null_mut(),
                ptr::null(),
            )
        })?;
        Ok(list)
    }

    fn as_ptr(&self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        self.buffer.as_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST
    }
}

impl Drop for AttributeList {
    fn drop(&mut self) {
        unsafe { DeleteProcThreadAttributeList(self.as_ptr()) };
    }
}

/// [`OsApi`] backed by the Windows API
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsApi;

impl WindowsApi {
    /// Create the Windows backend
    pub fn new() -> Self {
        WindowsApi
    }
}

impl OsApi for WindowsApi {
    type Stream = File;

    fn create_pipe(&self) -> io::Result<HandlePair> {
        let mut read: HANDLE = ptr::null_mut();
        let mut write: HANDLE = ptr::null_mut();
        check(unsafe { CreatePipe(&mut read, &mut write, ptr::null(), 0) })?;
        Ok(HandlePair {
            read: value(read),
            write: value(write),
        })
    }

    fn open_null_device(&self, access: Access) -> io::Result<HandleValue> {
        let file = OpenOptions::new()
            .read(access == Access::Read)
            .write(access == Access::Write)
            .open("NUL")?;
        Ok(value(file.into_raw_handle() as HANDLE))
    }

    fn standard_handle(&self, stream: StdStream) -> Option<HandleValue> {
        let which = match stream {
            StdStream::Input => STD_INPUT_HANDLE,
            StdStream::Output => STD_OUTPUT_HANDLE,
            StdStream::Error => STD_ERROR_HANDLE,
        };
        let handle = unsafe { GetStdHandle(which) };
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            None
        } else {
            Some(value(handle))
        }
    }

    fn duplicate_inheritable(&self, handle: HandleValue) -> io::Result<HandleValue> {
        let mut duplicate: HANDLE = ptr::null_mut();
        check(unsafe {
            let me = GetCurrentProcess();
            DuplicateHandle(
                me,
                raw(handle),
                me,
                &mut duplicate,
                0,
                1,
                DUPLICATE_SAME_ACCESS,
            )
        })?;
        Ok(value(duplicate))
    }

    fn set_inheritable(&self, handle: HandleValue, inheritable: bool) -> io::Result<()> {
        let flags = if inheritable { HANDLE_FLAG_INHERIT } else { 0 };
        check(unsafe { SetHandleInformation(raw(handle), HANDLE_FLAG_INHERIT, flags) })
    }

    fn close_handle(&self, handle: HandleValue) -> io::Result<()> {
        check(unsafe { CloseHandle(raw(handle)) })
    }

    fn into_stream(&self, handle: HandleValue) -> io::Result<File> {
        let owned = unsafe { OwnedHandle::from_raw_handle(raw(handle)) };
        Ok(File::from(owned))
    }

    fn current_process_id(&self) -> u32 {
        unsafe { GetCurrentProcessId() }
    }

    fn supports_restricted_inheritance(&self) -> bool {
        // PROC_THREAD_ATTRIBUTE_HANDLE_LIST exists on every supported release
        true
    }

    fn create_process(&self, request: &CreateProcessRequest) -> io::Result<ProcessInfo> {
        let application = request
            .application
            .as_ref()
            .map(|p| to_wide(p.as_os_str()));
        let mut command_line = to_wide(OsStr::new(&request.command_line));
        let current_dir = request
            .current_dir
            .as_ref()
            .map(|p| to_wide(p.as_os_str()));

        let mut si: STARTUPINFOW = unsafe { zeroed() };
        si.cb = size_of::<STARTUPINFOW>() as u32;
        if request.startup.use_std_handles {
            si.dwFlags |= STARTF_USESTDHANDLES;
            si.hStdInput = raw_or_null(request.startup.std_handles[0]);
            si.hStdOutput = raw_or_null(request.startup.std_handles[1]);
            si.hStdError = raw_or_null(request.startup.std_handles[2]);
        }

        let attributes = match &request.startup.handle_list {
            Some(list) => Some(AttributeList::with_handle_list(
                list.iter().copied().map(raw).collect(),
            )?),
            None => None,
        };

        let si_ex;
        let si_ptr: *const STARTUPINFOW = if let Some(attributes) = &attributes {
            si.cb = size_of::<STARTUPINFOEXW>() as u32;
            si_ex = STARTUPINFOEXW {
                StartupInfo: si,
                lpAttributeList: attributes.as_ptr(),
            };
            (&si_ex as *const STARTUPINFOEXW).cast()
        } else {
            &si
        };

        let mut pi: PROCESS_INFORMATION = unsafe { zeroed() };
        check(unsafe {
            CreateProcessW(
                application.as_ref().map_or(ptr::null(), |a| a.as_ptr()),
                command_line.as_mut_ptr(),
                ptr::null(),
                ptr::null(),
                i32::from(request.inherit_handles),
                request.creation_flags,
                request
                    .environment
                    .as_ref()
                    .map_or(ptr::null(), |e| e.as_ptr() as *const c_void),
                current_dir.as_ref().map_or(ptr::null(), |d| d.as_ptr()),
                si_ptr,
                &mut pi,
            )
        })?;
        debug!("CreateProcessW returned pid {}", pi.dwProcessId);

        Ok(ProcessInfo {
            process: value(pi.hProcess),
            thread: value(pi.hThread),
            pid: pi.dwProcessId,
            tid: pi.dwThreadId,
        })
    }

    fn wait_process(
        &self,
        process: HandleValue,
        timeout: Option<Duration>,
    ) -> io::Result<Option<u32>> {
        let millis = match timeout {
            None => INFINITE,
            Some(d) => d.as_millis().min(u128::from(INFINITE - 1)) as u32,
        };
        match unsafe { WaitForSingleObject(raw(process), millis) } {
            WAIT_OBJECT_0 => {
                let mut code = 0u32;
                check(unsafe { GetExitCodeProcess(raw(process), &mut code) })?;
                Ok(Some(code))
            }
            WAIT_TIMEOUT => Ok(None),
            WAIT_FAILED => Err(io::Error::last_os_error()),
            other => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("unexpected wait result {:#x}", other),
            )),
        }
    }

    fn terminate_process(&self, process: HandleValue, exit_code: u32) -> io::Result<()> {
        check(unsafe { TerminateProcess(raw(process), exit_code) })
    }
}
