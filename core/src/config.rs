//! Launch profile loading and validation
//!
//! A profile file is TOML with an optional `[launcher]` table and any number
//! of `[profiles.<name>]` tables, each holding the fields of a
//! `schema::LaunchSpec`. Defaults come from the serde defaults on the schema
//! types; validation reports field paths such as
//! `profiles.echo.args: cannot be empty`.

use crate::inheritance::InheritancePolicy;
use crate::launcher::ProcessLauncher;
use crate::process::OsApi;
use crate::transfer::PipeHandleTransferNegotiator;
use crate::{CoreError, Result};
use schema::{BufferHint, LaunchSpec};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

fn default_log_level() -> String {
    "info".to_string()
}

/// Launcher-wide settings from the `[launcher]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LauncherSettings {
    /// Default tracing filter for the front end
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// What to do when restricted inheritance is unavailable
    #[serde(default)]
    pub inheritance_policy: InheritancePolicy,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            inheritance_policy: InheritancePolicy::default(),
        }
    }
}

impl LauncherSettings {
    /// Build a launcher over `os` with these settings applied
    pub fn launcher<O: OsApi>(&self, os: O) -> ProcessLauncher<O> {
        ProcessLauncher::new(os).with_policy(self.inheritance_policy)
    }
}

/// Top-level TOML structure for launch profiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LaunchProfileFile {
    /// Launcher-wide settings
    #[serde(default)]
    pub launcher: LauncherSettings,
    /// Named launch specs
    #[serde(default)]
    pub profiles: BTreeMap<String, LaunchSpec>,
}

impl LaunchProfileFile {
    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&LaunchSpec> {
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            CoreError::ConfigurationError(format!(
                "profile '{}' not found (available: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ))
        })
    }

    /// Validate every profile and return field-path errors
    pub fn validate(&self) -> Result<()> {
        if self.launcher.log_level.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "launcher.logLevel: cannot be empty".to_string(),
            ));
        }
        for (name, spec) in &self.profiles {
            if name.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "profiles: profile name (table name) cannot be empty".to_string(),
                ));
            }
            validate_profile(name, spec, self.launcher.inheritance_policy)?;
        }
        debug!("Validated {} launch profile(s)", self.profiles.len());
        Ok(())
    }
}

fn validate_profile(name: &str, spec: &LaunchSpec, policy: InheritancePolicy) -> Result<()> {
    let field = |path: &str, msg: &str| {
        CoreError::ValidationError(format!("profiles.{}.{}: {}", name, path, msg))
    };

    if spec.args.is_empty() && spec.executable.is_none() {
        return Err(field("args", "cannot be empty"));
    }
    if let Some(i) = spec.args.iter().position(|a| a.contains('\0')) {
        return Err(field(&format!("args[{}]", i), "cannot contain NUL"));
    }
    if spec.shell {
        return Err(field("shell", "must be false"));
    }
    if let Some(env) = &spec.env {
        for (key, value) in env {
            if key.is_empty() {
                return Err(field("env", "keys cannot be empty"));
            }
            if key.chars().skip(1).any(|c| c == '=') {
                return Err(field(&format!("env.{}", key), "key cannot contain '='"));
            }
            if key.contains('\0') || value.contains('\0') {
                return Err(field(&format!("env.{}", key), "cannot contain NUL"));
            }
        }
    }
    if spec.buffer.checked().is_none() {
        return Err(field(
            "bufsize",
            &format!("must be a whole number no larger than {}", BufferHint::MAX_CAPACITY),
        ));
    }
    if spec.pass_handles_over_command_line {
        PipeHandleTransferNegotiator::validate(spec)
            .map_err(|e| match e {
                CoreError::ValidationError(msg) => {
                    CoreError::ValidationError(format!("profiles.{}.{}", name, msg))
                }
                other => other,
            })?;
        if spec.close_other_handles && policy == InheritancePolicy::Strict {
            return Err(field(
                "closeOtherHandles",
                "cannot be combined with passHandlesOverCommandLine under the strict policy",
            ));
        }
    }
    Ok(())
}

/// Load launch profiles from a TOML file path
pub fn load_profiles_from_toml_path(path: impl AsRef<Path>) -> Result<LaunchProfileFile> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_profiles_from_toml_str(&data)
}

/// Load launch profiles from a TOML string
pub fn load_profiles_from_toml_str(input: &str) -> Result<LaunchProfileFile> {
    let cfg: LaunchProfileFile = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
