#![allow(unused_crate_dependencies)]
//! Flag parsing and flag-to-spec translation for the `run` subcommand

use clap::Parser;
use cli::{
    build_spec, dry_run_report, parse_env_pair, parse_flags, quote, resolve, run_child, Cli,
    CliError, Commands, Pumps, RunArgs,
};
use schema::{BufferHint, LaunchSpec, StreamMode, StreamRequest};
use std::io;
use winlaunch_core::{InheritancePolicy, ProcessLauncher, RecordingOs};

fn run_args(argv: &[&str]) -> RunArgs {
    let cli = Cli::try_parse_from(std::iter::once("winlaunch").chain(argv.iter().copied()))
        .expect("arguments should parse");
    match cli.command {
        Commands::Run(opts) => opts,
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn test_flags_translate_to_spec() {
    let opts = run_args(&[
        "run",
        "--stdin",
        "pipe",
        "--stdout",
        "null",
        "--close-other-handles",
        "--creation-flags",
        "0x10",
        "--bufsize",
        "-1",
        "--text",
        "--cwd",
        "C:\\work",
        "--",
        "tool.exe",
        "--verbose",
        "a b",
    ]);
    let spec = build_spec(LaunchSpec::default(), &opts).unwrap();

    assert_eq!(spec.args, ["tool.exe", "--verbose", "a b"]);
    assert_eq!(spec.stdin, StreamRequest::Pipe);
    assert_eq!(spec.stdout, StreamRequest::Null);
    assert_eq!(spec.stderr, StreamRequest::Inherit);
    assert!(spec.close_other_handles);
    assert!(!spec.pass_handles_over_command_line);
    assert_eq!(spec.creation_flags, 0x10);
    assert_eq!(spec.buffer, BufferHint::SYSTEM_DEFAULT);
    assert_eq!(spec.stream_mode, StreamMode::Text);
    assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("C:\\work")));
    assert!(spec.env.is_none());
}

#[test]
fn test_env_flags_build_explicit_environment() {
    let opts = run_args(&[
        "run", "--env", "A=1", "--env", "B=x=y", "--env", "=C:=C:\\", "prog",
    ]);
    let spec = build_spec(LaunchSpec::default(), &opts).unwrap();
    let env = spec.env.unwrap();
    assert_eq!(env.len(), 3);
    assert_eq!(env["A"], "1");
    assert_eq!(env["B"], "x=y");
    assert_eq!(env["=C:"], "C:\\");
}

#[test]
fn test_env_pair_and_flag_parsers_reject_garbage() {
    assert!(parse_env_pair("NOVALUE").is_err());
    assert!(parse_env_pair("=").is_err());
    assert_eq!(parse_flags("16").unwrap(), 16);
    assert_eq!(parse_flags("0X200").unwrap(), 0x200);
    assert!(parse_flags("0xZZ").is_err());
    assert!(Cli::try_parse_from(["winlaunch", "run", "--stdout", "file", "prog"]).is_err());
}

#[test]
fn test_missing_program_is_invalid_argument() {
    let opts = run_args(&["run", "--stdout", "pipe"]);
    match build_spec(LaunchSpec::default(), &opts) {
        Err(e @ CliError::InvalidArgument(_)) => assert_eq!(e.code(), "CLI002"),
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
}

#[test]
fn test_profile_with_flag_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles.toml");
    std::fs::write(
        &path,
        r#"
        [launcher]
        logLevel = "debug"

        [profiles.echo]
        args = ["handle-probe", "echo"]
        stdin = "pipe"
        stdout = "pipe"
        stderr = "null"
        passHandlesOverCommandLine = true

        [profiles.quiet]
        args = ["tool.exe"]
        stdout = "null"
        "#,
    )
    .unwrap();
    let path_arg = path.to_string_lossy().into_owned();

    let opts = run_args(&[
        "run", "--config", &path_arg, "--profile", "echo", "--stderr", "pipe", "--strict",
    ]);
    let resolved = resolve(&opts).unwrap();
    assert_eq!(resolved.settings.log_level, "debug");
    assert_eq!(resolved.settings.inheritance_policy, InheritancePolicy::Strict);
    assert_eq!(resolved.spec.args, ["handle-probe", "echo"]);
    assert_eq!(resolved.spec.stderr, StreamRequest::Pipe);
    assert!(resolved.spec.pass_handles_over_command_line);

    // Two profiles and no program: the choice must be explicit
    let opts = run_args(&["run", "--config", &path_arg]);
    match resolve(&opts) {
        Err(CliError::ConfigError(msg)) => assert!(msg.contains("--profile")),
        other => panic!("expected ConfigError, got {:?}", other),
    }

    let opts = run_args(&["run", "--config", &path_arg, "--profile", "nope"]);
    assert!(matches!(resolve(&opts), Err(CliError::ConfigError(_))));
}

#[test]
fn test_profile_requires_config() {
    assert!(Cli::try_parse_from(["winlaunch", "run", "--profile", "echo"]).is_err());
}

#[test]
fn test_dry_run_report_mentions_trailing_arguments() {
    let spec = LaunchSpec::new(["child.exe", "a b"])
        .stdin(StreamRequest::Pipe)
        .stdout(StreamRequest::Pipe)
        .stderr(StreamRequest::Null)
        .pass_handles_over_command_line(true);
    let report = dry_run_report(&spec).unwrap();
    assert!(report.contains("\"passHandlesOverCommandLine\": true"));
    assert!(report.contains("command line: child.exe \"a b\" <parent pid>"));
}

#[test]
fn test_quote_subcommand() {
    let cli = Cli::try_parse_from(["winlaunch", "quote", "a b", "-x", "c\"d"]).unwrap();
    match cli.command {
        Commands::Quote { args } => assert_eq!(quote(&args), "\"a b\" -x \"c\\\"d\""),
        other => panic!("expected quote, got {:?}", other),
    }
}

#[test]
fn test_run_child_returns_exit_code() {
    let os = RecordingOs::new();
    os.set_exit_code(5);
    let launcher = ProcessLauncher::new(os.clone());
    let spec = LaunchSpec::new(["tool.exe"])
        .stdout(StreamRequest::Pipe)
        .stderr(StreamRequest::Pipe);

    let code = run_child(
        &launcher,
        spec,
        Pumps {
            input: io::empty(),
            output: io::sink(),
            error: io::sink(),
        },
    )
    .unwrap();
    assert_eq!(code, 5);
    assert_eq!(os.create_requests().len(), 1);
}

#[test]
fn test_run_child_surfaces_launch_errors() {
    let os = RecordingOs::new();
    os.fail_next_create(5);
    let launcher = ProcessLauncher::new(os);
    let err = run_child(
        &launcher,
        LaunchSpec::new(["tool.exe"]),
        Pumps {
            input: io::empty(),
            output: io::sink(),
            error: io::sink(),
        },
    )
    .unwrap_err();
    assert_eq!(err.code(), "CLI004");
}
