//! Command-line front end for winlaunch
//!
//! Flags and TOML profiles are turned into a [`LaunchSpec`], the child is
//! launched through any [`LaunchStrategy`], and its piped streams are pumped
//! to and from the caller's own standard streams.

pub mod error;

pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand, ValueEnum};
use schema::{BufferHint, LaunchSpec, StreamMode, StreamRequest};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::thread;
use tracing::{debug, warn};
use winlaunch_core::cmdline::render_command_line;
use winlaunch_core::config::load_profiles_from_toml_path;
use winlaunch_core::{ChildProcess, InheritancePolicy, LaunchStrategy, LauncherSettings, OsApi};

/// Top-level command line
#[derive(Debug, Parser)]
#[command(name = "winlaunch")]
#[command(about = "Launch processes with explicit control over inherited handles")]
#[command(version)]
pub struct Cli {
    /// Tracing filter, overriding the profile file's logLevel
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a program and exit with its exit code
    Run(RunArgs),
    /// Print the command line an argument list renders to
    Quote {
        /// Arguments to render
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// How a standard stream is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamArg {
    /// Use the launcher's own stream
    Inherit,
    /// Connect through a pipe pumped by the launcher
    Pipe,
    /// Connect to the null device
    Null,
}

impl From<StreamArg> for StreamRequest {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Inherit => StreamRequest::Inherit,
            StreamArg::Pipe => StreamRequest::Pipe,
            StreamArg::Null => StreamRequest::Null,
        }
    }
}

/// Options of the `run` subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Profile file to read
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to launch from the profile file
    #[arg(long, requires = "config")]
    pub profile: Option<String>,

    /// Standard input of the child
    #[arg(long, value_enum)]
    pub stdin: Option<StreamArg>,

    /// Standard output of the child
    #[arg(long, value_enum)]
    pub stdout: Option<StreamArg>,

    /// Standard error of the child
    #[arg(long, value_enum)]
    pub stderr: Option<StreamArg>,

    /// Let the child inherit only its standard-stream handles
    #[arg(long)]
    pub close_other_handles: bool,

    /// Pass pipe handles to the child as four trailing arguments
    #[arg(long)]
    pub pass_handles: bool,

    /// Fail instead of degrading when inheritance cannot be restricted
    #[arg(long)]
    pub strict: bool,

    /// Program to run instead of the first argument
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Working directory of the child
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Environment variable for an explicit environment (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Start the explicit environment from this process's environment
    #[arg(long)]
    pub inherit_env: bool,

    /// Extra creation flags, decimal or 0x-prefixed hex
    #[arg(long, value_name = "FLAGS", value_parser = parse_flags)]
    pub creation_flags: Option<u32>,

    /// Buffer size of piped streams (0 unbuffered, 1 line, negative default)
    #[arg(long, allow_negative_numbers = true)]
    pub bufsize: Option<i64>,

    /// Mark piped streams as text
    #[arg(long)]
    pub text: bool,

    /// Print the resolved launch request instead of launching
    #[arg(long)]
    pub dry_run: bool,

    /// Program and arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    // A leading '=' belongs to the key (e.g. "=C:=C:\\")
    let split = s
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '=')
        .map(|(i, _)| i);
    match split {
        Some(i) => Ok((s[..i].to_string(), s[i + 1..].to_string())),
        None => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Parse creation flags written in decimal or `0x` hex
pub fn parse_flags(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid creation flags '{}': {}", s, e))
}

/// Launcher settings and spec resolved from a profile file and flags
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Launcher-wide settings
    pub settings: LauncherSettings,
    /// The request to launch
    pub spec: LaunchSpec,
}

/// Load the selected profile (if any) and apply the flags on top of it
pub fn resolve(opts: &RunArgs) -> Result<Resolved> {
    let (mut settings, base) = match &opts.config {
        Some(path) => {
            let file = load_profiles_from_toml_path(path)
                .map_err(|e| CliError::ConfigError(e.to_string()))?;
            let name = match (&opts.profile, file.profiles.len()) {
                (Some(name), _) => name.clone(),
                (None, 1) => file.profiles.keys().next().cloned().unwrap_or_default(),
                (None, _) if opts.args.is_empty() => {
                    return Err(CliError::ConfigError(format!(
                        "{:?} defines {} profiles; choose one with --profile",
                        path,
                        file.profiles.len()
                    )))
                }
                (None, _) => String::new(),
            };
            let base = if name.is_empty() {
                LaunchSpec::default()
            } else {
                file.profile(&name)
                    .map_err(|e| CliError::ConfigError(e.to_string()))?
                    .clone()
            };
            (file.launcher, base)
        }
        None => (LauncherSettings::default(), LaunchSpec::default()),
    };

    if opts.strict {
        settings.inheritance_policy = InheritancePolicy::Strict;
    }
    let spec = build_spec(base, opts)?;
    Ok(Resolved { settings, spec })
}

/// Apply command-line flags on top of a base spec
pub fn build_spec(base: LaunchSpec, opts: &RunArgs) -> Result<LaunchSpec> {
    let mut spec = base;

    if !opts.args.is_empty() {
        spec.args = opts.args.clone();
    }
    if let Some(path) = &opts.executable {
        spec.executable = Some(path.clone());
    }
    if let Some(dir) = &opts.cwd {
        spec.cwd = Some(dir.clone());
    }
    if let Some(arg) = opts.stdin {
        spec.stdin = arg.into();
    }
    if let Some(arg) = opts.stdout {
        spec.stdout = arg.into();
    }
    if let Some(arg) = opts.stderr {
        spec.stderr = arg.into();
    }
    spec.close_other_handles |= opts.close_other_handles;
    spec.pass_handles_over_command_line |= opts.pass_handles;
    if let Some(flags) = opts.creation_flags {
        spec.creation_flags = flags;
    }
    if let Some(size) = opts.bufsize {
        spec.buffer = BufferHint::from(size);
    }
    if opts.text {
        spec.stream_mode = StreamMode::Text;
    }

    if opts.inherit_env || !opts.env.is_empty() {
        let mut env: BTreeMap<String, String> = if opts.inherit_env {
            std::env::vars().collect()
        } else {
            spec.env.take().unwrap_or_default()
        };
        env.extend(opts.env.iter().cloned());
        spec.env = Some(env);
    }

    if spec.args.is_empty() && spec.executable.is_none() {
        return Err(CliError::InvalidArgument(
            "no program given; pass it after the options or select a profile".to_string(),
        ));
    }
    Ok(spec)
}

/// Describe a resolved spec without launching it
pub fn dry_run_report(spec: &LaunchSpec) -> Result<String> {
    let json = serde_json::to_string_pretty(spec)?;
    let mut report = format!("{}\ncommand line: {}", json, render_command_line(&spec.args));
    if spec.pass_handles_over_command_line {
        report.push_str(" <parent pid> <stdin handle> <stdout handle> <stderr handle>");
    }
    Ok(report)
}

/// Render arguments for the `quote` subcommand
pub fn quote(args: &[String]) -> String {
    render_command_line(args)
}

/// Where the child's piped streams are pumped to and from
#[derive(Debug)]
pub struct Pumps<I, O, E> {
    /// Source for a piped stdin
    pub input: I,
    /// Sink for a piped stdout
    pub output: O,
    /// Sink for a piped stderr
    pub error: E,
}

fn pump<R, W>(name: &'static str, mut from: R, mut to: W) -> thread::JoinHandle<io::Result<u64>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let copied = io::copy(&mut from, &mut to)?;
        to.flush()?;
        debug!("Pumped {} bytes of {}", copied, name);
        Ok(copied)
    })
}

/// Launch a child, pump its piped streams and return its exit code
///
/// The stdin pump is not joined: it ends when `input` is exhausted or the
/// child closes its end.
pub fn run_child<L, I, O, E>(launcher: &L, spec: LaunchSpec, pumps: Pumps<I, O, E>) -> Result<u32>
where
    L: LaunchStrategy,
    <L::Os as OsApi>::Stream: Read + Write + Send + 'static,
    I: Read + Send + 'static,
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    let mut child = ChildProcess::spawn(launcher, spec)?;
    if child.inheritance_degraded() {
        warn!(
            "Process {} inherited every inheritable handle; restriction was not honored",
            child.id()
        );
    }

    if let Some(stdin) = child.take_stdin() {
        let _detached = pump("stdin", pumps.input, stdin.into_writer());
    }
    let mut outputs = Vec::new();
    if let Some(stdout) = child.take_stdout() {
        outputs.push(pump("stdout", stdout.into_reader(), pumps.output));
    }
    if let Some(stderr) = child.take_stderr() {
        outputs.push(pump("stderr", stderr.into_reader(), pumps.error));
    }

    for handle in outputs {
        match handle.join() {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Output pump failed: {}", e),
            Err(_) => {
                return Err(CliError::CommandFailed(
                    "output pump thread panicked".to_string(),
                ))
            }
        }
    }

    let status = child.wait()?;
    debug!("Process {} finished with {}", child.id(), status);
    Ok(status.code())
}
