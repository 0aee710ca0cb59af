//! Which configuration an upgrade carries forward

use keel_core::{Config, coalesce_values};
use tracing::info;

use crate::actions::UpdateRequest;
use crate::error::{ReleaseError, Result};
use crate::release::Release;

/// Decide the configuration of an upgrade from the request flags and the
/// release being replaced.
///
/// Checked in order:
/// 1. `reset_values`: the request is left untouched.
/// 2. `reuse_values`: the current release's effective values (its chart
///    defaults coalesced under its stored config) replace `req.values`.
/// 3. `req.values` is blank while the current config is not: the current
///    config is copied verbatim.
pub fn reuse_values(req: &mut UpdateRequest, current: &Release) -> Result<()> {
    if req.reset_values {
        info!(release = %req.name, "resetting values to the chart's defaults");
        return Ok(());
    }

    if req.reuse_values {
        info!(release = %req.name, "reusing the existing values");
        let effective = coalesce_values(&current.chart, &current.config)
            .map_err(|e| ReleaseError::Values(e.to_string()))?;
        req.values = Config::from_values(&effective)
            .map_err(|e| ReleaseError::Values(e.to_string()))?;
        return Ok(());
    }

    if req.values.is_blank() && !current.config.is_blank() {
        info!(release = %req.name, "copying values from the current release");
        req.values = current.config.clone();
    }
    Ok(())
}
