//! JSON shape tests for schema types
//!
//! These pin the wire names used by configuration files and tooling, and
//! check that a full launch request survives serialization unchanged.

use crate::launch::*;
use crate::stream::*;

/// Helper to test JSON round-trip for any serializable type
fn test_json_roundtrip<T>(original: &T)
where
    T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let json = serde_json::to_string(original).expect("Failed to serialize to JSON");
    let deserialized: T = serde_json::from_str(&json).expect("Failed to deserialize from JSON");
    assert_eq!(*original, deserialized, "Round-trip failed for JSON: {}", json);
}

#[test]
fn test_launch_spec_json_roundtrip() {
    let spec = LaunchSpec::new(["worker.exe", "--serve", "a b"])
        .executable("C:\\bin\\worker.exe")
        .cwd("C:\\work")
        .env([("PATH", "C:\\bin"), ("MODE", "test")])
        .stdin(StreamRequest::Pipe)
        .stdout(StreamRequest::ExplicitHandle(HandleValue(0x1a4)))
        .stderr(StreamRequest::Null)
        .close_other_handles(true)
        .creation_flags(0x0800_0000)
        .stream_mode(StreamMode::Text)
        .buffer(4096);
    test_json_roundtrip(&spec);
}

#[test]
fn test_stream_request_wire_names() {
    assert_eq!(
        serde_json::to_string(&StreamRequest::Inherit).unwrap(),
        "\"inherit\""
    );
    assert_eq!(serde_json::to_string(&StreamRequest::Pipe).unwrap(), "\"pipe\"");
    assert_eq!(serde_json::to_string(&StreamRequest::Null).unwrap(), "\"null\"");
    assert_eq!(
        serde_json::to_string(&StreamRequest::ExplicitHandle(HandleValue(12))).unwrap(),
        "{\"explicitHandle\":12}"
    );
}

#[test]
fn test_launch_spec_camel_case_fields() {
    let json = r#"{
        "args": ["child.exe"],
        "stdin": "pipe",
        "stdout": "pipe",
        "stderr": "null",
        "closeOtherHandles": true,
        "passHandlesOverCommandLine": true,
        "bufsize": 1.5
    }"#;
    let spec: LaunchSpec = serde_json::from_str(json).unwrap();
    assert!(spec.close_other_handles);
    assert!(spec.pass_handles_over_command_line);
    assert_eq!(spec.stderr, StreamRequest::Null);
    assert_eq!(spec.buffer.whole(), None);
    assert_eq!(spec.cwd, None);
}

#[test]
fn test_handle_value_is_plain_integer() {
    let value: HandleValue = serde_json::from_str("300").unwrap();
    assert_eq!(value, HandleValue(300));
    assert_eq!(value.to_string(), "300");
}
