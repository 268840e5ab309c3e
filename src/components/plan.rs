//! Publishing launch plans at the framework boundary.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;

const REMOTE_SCHEMES: &[&str] = &["s3://", "gs://", "oci://", "azure://", "hf://", "http://", "https://"];

/// True for object-store and web URIs the launcher does not write to.
pub fn is_remote(folder: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| folder.starts_with(scheme))
}

/// Write `plan` to `<folder>/<file>` when `folder` is local; otherwise only
/// log it. Returns the written path.
pub fn publish(folder: Option<&str>, file: &str, plan: &Value) -> anyhow::Result<Option<PathBuf>> {
    let rendered = serde_json::to_string_pretty(plan).context("failed to render plan")?;

    let Some(folder) = folder.filter(|f| !is_remote(f)) else {
        tracing::info!(plan = %rendered, "launch plan ready");
        return Ok(None);
    };

    let dir = PathBuf::from(folder);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(file);
    fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), "launch plan written");
    Ok(Some(path))
}
