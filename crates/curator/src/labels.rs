//! Label edits on one resource or every resource matching a pattern.

use anyhow::{Context, Result};
use curator_controller::registry::list_all;
use curator_controller::RegistryClient;
use curator_protocol::{apply_mutations, Address, LabelMutation, Pattern};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub matched: usize,
    pub changed: usize,
}

/// Apply `mutations` to `target`, an address or a pattern.
pub async fn relabel(
    registry: &dyn RegistryClient,
    target: &str,
    mutations: &[LabelMutation],
    overwrite: bool,
    page_size: usize,
) -> Result<LabelSummary> {
    let resources = match Address::parse(target) {
        Ok(address) => vec![registry
            .get(&address)
            .await
            .with_context(|| format!("Failed to get {}", address))?],
        Err(_) => {
            let pattern = Pattern::parse(target).with_context(|| format!("Invalid target '{}'", target))?;
            list_all(registry, &pattern, "", page_size)
                .await
                .with_context(|| format!("Failed to list {}", pattern))?
        }
    };

    let mut summary = LabelSummary {
        matched: resources.len(),
        changed: 0,
    };
    for resource in resources {
        let mut labels = resource.labels.clone();
        if !apply_mutations(&mut labels, mutations, overwrite) {
            debug!(name = %resource.name, "Labels unchanged");
            continue;
        }
        registry
            .update_labels(&resource.name, labels)
            .await
            .with_context(|| format!("Failed to update labels of {}", resource.name))?;
        summary.changed += 1;
    }

    info!(target = %target, matched = summary.matched, changed = summary.changed, "Labels applied");
    Ok(summary)
}
