//! Schema definitions for winlaunch
//!
//! This crate contains the launch request data model shared by the launcher,
//! the CLI and the configuration loader. Everything here is platform-neutral
//! and implements JSON Schema generation for external consumption.

pub mod launch;
pub mod stream;

#[cfg(test)]
mod json_roundtrip_tests;

pub use launch::LaunchSpec;
pub use stream::{Access, BufferHint, HandleValue, StdStream, StreamMode, StreamRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::schema_for;

    #[test]
    fn test_default_spec_inherits_everything() {
        let spec = LaunchSpec::default();
        assert_eq!(spec.stdin, StreamRequest::Inherit);
        assert_eq!(spec.stdout, StreamRequest::Inherit);
        assert_eq!(spec.stderr, StreamRequest::Inherit);
        assert!(!spec.shell);
        assert!(!spec.close_other_handles);
        assert!(!spec.pass_handles_over_command_line);
        assert!(!spec.redirects_any_stream());
        assert_eq!(spec.buffer, BufferHint::UNBUFFERED);
    }

    #[test]
    fn test_builder_sets_streams() {
        let spec = LaunchSpec::new(["prog", "arg"])
            .stdout(StreamRequest::Pipe)
            .stderr(StreamRequest::Null);
        assert_eq!(spec.args, vec!["prog".to_string(), "arg".to_string()]);
        assert_eq!(spec.stream(StdStream::Output), StreamRequest::Pipe);
        assert_eq!(spec.stream(StdStream::Error), StreamRequest::Null);
        assert!(spec.redirects_any_stream());
    }

    #[test]
    fn test_program_prefers_executable() {
        let spec = LaunchSpec::new(["name"]);
        assert_eq!(spec.program().as_deref(), Some("name"));

        let spec = spec.executable("C:\\tools\\real.exe");
        assert_eq!(spec.program().as_deref(), Some("C:\\tools\\real.exe"));

        assert_eq!(LaunchSpec::default().program(), None);
    }

    #[test]
    fn test_stream_directions() {
        assert_eq!(StdStream::Input.child_access(), Access::Read);
        assert_eq!(StdStream::Input.parent_access(), Access::Write);
        assert_eq!(StdStream::Output.child_access(), Access::Write);
        assert_eq!(StdStream::Error.parent_access(), Access::Read);
        let order: Vec<_> = StdStream::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_buffer_hint_whole_numbers() {
        assert_eq!(BufferHint(4096.0).whole(), Some(4096));
        assert_eq!(BufferHint(-1.0).whole(), Some(-1));
        assert_eq!(BufferHint(1.5).whole(), None);
        assert_eq!(BufferHint(f64::NAN).whole(), None);

        assert_eq!(BufferHint::UNBUFFERED.capacity(), None);
        assert_eq!(BufferHint::LINE.capacity(), Some(BufferHint::DEFAULT_CAPACITY));
        assert_eq!(
            BufferHint::SYSTEM_DEFAULT.capacity(),
            Some(BufferHint::DEFAULT_CAPACITY)
        );
        assert_eq!(BufferHint::from(512).capacity(), Some(512));
    }

    #[test]
    fn test_buffer_hint_ceiling() {
        let max = BufferHint::MAX_CAPACITY as f64;
        assert_eq!(BufferHint(max).checked(), Some(max as i64));
        assert_eq!(BufferHint(max + 1.0).checked(), None);
        assert_eq!(BufferHint(1e15).checked(), None);
        assert_eq!(BufferHint(-1e15).checked(), Some(-1e15 as i64));
        assert_eq!(BufferHint(0.5).checked(), None);

        // Unvalidated hints never ask for more than the ceiling
        assert_eq!(BufferHint(1e15).capacity(), Some(BufferHint::MAX_CAPACITY));
    }

    #[test]
    fn test_schema_generation() {
        let schema = schema_for!(LaunchSpec);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("passHandlesOverCommandLine"));
        assert!(json.contains("explicitHandle"));
    }
}
