//! Cooperating child used by the integration tests
//!
//! Modes:
//!
//! - `args <a> <b> ...` prints its arguments as a JSON array
//! - `env <NAME>` prints one environment variable, or exits 3 if unset
//! - `cat` copies standard input to standard output
//! - `exit <code>` exits with the given code
//! - `sleep <ms>` sleeps, then exits 0
//! - `check-handle <value> <marker>` exits 0 if the handle value names a pipe
//!   whose unread bytes start with `marker` and 2 if not (Windows only)
//! - `echo ... <pid> <in> <out> <err>` pops the four trailing handle-transfer
//!   arguments and copies the transferred input handle to the output handle
//!   (Windows only)

#![allow(unused_crate_dependencies)]
#![cfg_attr(windows, allow(unsafe_code))]

use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Duration;

fn usage() -> ExitCode {
    eprintln!("usage: handle-probe <args|env|cat|exit|sleep|check-handle|echo> ...");
    ExitCode::from(64)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((mode, rest)) = args.split_first() else {
        return usage();
    };

    let result = match mode.as_str() {
        "args" => print_args(rest),
        "env" => return print_env(rest),
        "cat" => copy(&mut io::stdin().lock(), &mut io::stdout().lock()),
        "exit" => {
            return rest
                .first()
                .and_then(|c| c.parse::<u8>().ok())
                .map_or_else(usage, ExitCode::from)
        }
        "sleep" => {
            let ms = rest.first().and_then(|m| m.parse().ok()).unwrap_or(1000);
            std::thread::sleep(Duration::from_millis(ms));
            Ok(())
        }
        "check-handle" => return check_handle(rest),
        "echo" => echo(rest),
        _ => return usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("handle-probe: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_args(rest: &[String]) -> io::Result<()> {
    let json = serde_json::to_string(rest).map_err(io::Error::other)?;
    println!("{}", json);
    Ok(())
}

fn print_env(rest: &[String]) -> ExitCode {
    let Some(name) = rest.first() else {
        return usage();
    };
    match std::env::var(name) {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::from(3),
    }
}

fn copy(input: &mut impl Read, output: &mut impl Write) -> io::Result<()> {
    io::copy(input, output)?;
    output.flush()
}

#[cfg(windows)]
fn parse_handle(value: &str) -> io::Result<u64> {
    value.parse().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid handle value {:?}: {}", value, e),
        )
    })
}

#[cfg(windows)]
mod win {
    use std::fs::File;
    use std::os::windows::io::{FromRawHandle, RawHandle};
    use std::ptr;
    use windows_sys::Win32::System::Pipes::PeekNamedPipe;

    /// Whether `value` is a pipe holding `marker` as its next bytes
    ///
    /// Peeking never blocks and fails on anything that is not a pipe, so a
    /// different object that happens to reuse the value does not match.
    pub fn pipe_holds(value: u64, marker: &[u8]) -> bool {
        let mut buf = vec![0u8; marker.len()];
        let mut read = 0u32;
        let ok = unsafe {
            PeekNamedPipe(
                value as usize as _,
                buf.as_mut_ptr().cast(),
                buf.len() as u32,
                &mut read,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        ok != 0 && buf.get(..read as usize) == Some(marker)
    }

    /// Take ownership of a handle transferred by the parent
    pub fn adopt(value: u64) -> File {
        unsafe { File::from_raw_handle(value as usize as RawHandle) }
    }
}

#[cfg(windows)]
fn check_handle(rest: &[String]) -> ExitCode {
    let (Some(value), Some(marker)) = (rest.first(), rest.get(1)) else {
        return usage();
    };
    match parse_handle(value) {
        Ok(_) if marker.is_empty() => usage(),
        Ok(value) if win::pipe_holds(value, marker.as_bytes()) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(_) => usage(),
    }
}

#[cfg(windows)]
fn echo(rest: &[String]) -> io::Result<()> {
    if rest.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "echo needs <pid> <stdin> <stdout> <stderr> trailing arguments",
        ));
    }
    let trailing = &rest[rest.len() - 4..];
    let _parent_pid: u32 = trailing[0]
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("parent pid: {}", e)))?;
    let mut input = win::adopt(parse_handle(&trailing[1])?);
    let mut output = win::adopt(parse_handle(&trailing[2])?);
    let mut error = win::adopt(parse_handle(&trailing[3])?);

    copy(&mut input, &mut output)?;
    writeln!(error, "echoed")?;
    Ok(())
}

#[cfg(not(windows))]
fn check_handle(_rest: &[String]) -> ExitCode {
    eprintln!("handle-probe: check-handle is only supported on Windows");
    ExitCode::FAILURE
}

#[cfg(not(windows))]
fn echo(_rest: &[String]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "echo is only supported on Windows",
    ))
}
