//! One-shot CLI mode: apply a named webhook to a local manifest file.

use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::error;

/// Run the named webhook against a local Kubernetes manifest.
///
/// Prints the patched manifest as YAML, or the raw JSON Patch when
/// `show_patch` is set. Returns whether the object was accepted; an unknown
/// webhook name counts as a rejection.
pub fn run(config: &Path, k8s_manifest: &Path, wh_name: &str, show_patch: bool) -> anyhow::Result<bool> {
    let raw_config = fs::read_to_string(config)
        .with_context(|| format!("failed to read {}", config.display()))?;
    let manifest = gwh_core::config::from_yaml(&raw_config)
        .with_context(|| format!("failed to compile {}", config.display()))?;

    let raw_object = fs::read_to_string(k8s_manifest)
        .with_context(|| format!("failed to read {}", k8s_manifest.display()))?;
    let object: Value =
        serde_yaml::from_str(&raw_object).context("the manifest is not valid YAML")?;

    let Some(webhook) = manifest.webhooks().iter().find(|wh| wh.name() == wh_name) else {
        let valid: Vec<&str> = manifest.webhooks().iter().map(|wh| wh.name()).collect();
        error!("couldn't find a webhook called {wh_name}. Valid webhook names are {valid:?}");
        return Ok(false);
    };

    let (accept, patch) = webhook.process(&object)?;
    if !accept {
        return Ok(false);
    }
    if !patch.0.is_empty() {
        if show_patch {
            println!("{}", serde_json::to_string_pretty(&patch)?);
        } else {
            let mut patched = object;
            json_patch::patch(&mut patched, &patch.0)?;
            print!("{}", serde_yaml::to_string(&patched)?);
        }
    }
    Ok(accept)
}
