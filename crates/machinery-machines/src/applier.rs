//! Chart application seam
//!
//! Rendering and applying charts belongs to the host platform. The
//! reconciler only needs idempotent create-or-update of a release.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use machinery_common::Error;

/// Directory holding the machine charts
pub const CHART_ROOT: &str = "seed-machines/charts";

/// Chart (and release) name for machine deployments
pub const MACHINES_CHART: &str = "machines";

/// Path of a machine chart below [`CHART_ROOT`]
pub fn chart_path(chart_name: &str) -> String {
    format!("{}/{}", CHART_ROOT, chart_name)
}

/// Applies rendered charts to a namespace
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Render `chart` with `values` and create-or-update the resulting
    /// resources as `release` in `namespace`
    async fn apply(
        &self,
        chart: &str,
        release: &str,
        namespace: &str,
        values: serde_json::Value,
    ) -> Result<(), Error>;
}
