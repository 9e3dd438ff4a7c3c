//! JSON Schema generation for the launch data model

use anyhow::{Context, Result};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};

fn default_out_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(|root| root.join("schemas"))
        .unwrap_or_else(|| PathBuf::from("schemas"))
}

/// Write one schema file per top-level type
pub fn run(out_dir: Option<PathBuf>) -> Result<()> {
    let out_dir = out_dir.unwrap_or_else(default_out_dir);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let schemas = [
        ("launch-spec.json", schema_for!(schema::LaunchSpec)),
        ("stream-request.json", schema_for!(schema::StreamRequest)),
        (
            "launch-profiles.json",
            schema_for!(winlaunch_core::LaunchProfileFile),
        ),
    ];

    for (name, schema) in schemas {
        let path = out_dir.join(name);
        let json = serde_json::to_string_pretty(&schema)?;
        fs::write(&path, json + "\n").with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
