#[cfg(test)]
mod tests {
    use crate::error::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::ValidationError("shell launches are not supported".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: shell launches are not supported"
        );

        let err = CoreError::ConfigurationError("bad profile".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad profile");

        let err = CoreError::InitializationError("init failed".to_string());
        assert_eq!(err.to_string(), "Initialization error: init failed");

        let err = CoreError::InheritanceUnsupported("no handle list".to_string());
        assert_eq!(
            err.to_string(),
            "Restricted handle inheritance unsupported: no handle list"
        );

        let err = CoreError::ProcessWait("handle closed".to_string());
        assert_eq!(err.to_string(), "Process wait error: handle closed");
    }

    #[test]
    fn test_core_error_from_std_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();

        if let CoreError::IoError(_) = core_err {
            // Expected variant
        } else {
            panic!("Expected CoreError::IoError variant");
        }
    }

    #[test]
    fn test_result_type_alias() {
        #[allow(clippy::unnecessary_wraps)]
        fn returns_result() -> Result<String> {
            Ok("success".to_string())
        }

        fn returns_error() -> Result<String> {
            Err(CoreError::ValidationError("test".to_string()))
        }

        assert!(returns_result().is_ok());
        assert!(returns_error().is_err());
    }

    #[test]
    fn test_error_trait_implementation() {
        let err = CoreError::ProcessCreation {
            code: 2,
            message: "missing.exe".to_string(),
        };

        // Test that it implements std::error::Error
        let _: &dyn Error = &err;

        // Test source method (should return None for basic string errors)
        assert!(err.source().is_none());

        let io_backed: CoreError = io::Error::new(io::ErrorKind::Other, "pipe").into();
        assert!(io_backed.source().is_some());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::ConfigurationError("test".to_string()).code(),
            "WL001"
        );
        assert_eq!(
            CoreError::ValidationError("test".to_string()).code(),
            "WL002"
        );
        assert_eq!(
            CoreError::InheritanceUnsupported("test".to_string()).code(),
            "WL005"
        );
        assert_eq!(
            CoreError::IoError(io::Error::new(io::ErrorKind::Other, "x")).code(),
            "WL006"
        );
        assert_eq!(
            CoreError::ProcessTerminate("test".to_string()).code(),
            "WL009"
        );
    }
}
