use std::sync::Arc;

use shared::domain::{LiftPlan, LiftplanName};
use tracing::{debug, warn};

use crate::{api::LoomApi, error::ControlResult};

/// Name-indexed liftplan collection stored on the loom.
///
/// Calls are single shot. Concurrent saves or deletes of the same name race
/// on the loom and the last one wins.
#[derive(Clone)]
pub struct LiftplanStore {
    api: Arc<dyn LoomApi>,
}

impl LiftplanStore {
    pub fn new(api: Arc<dyn LoomApi>) -> Self {
        Self { api }
    }

    /// Names in the order the loom lists them. An empty list is not an error.
    pub async fn list(&self) -> ControlResult<Vec<LiftplanName>> {
        let raw = self.api.list_liftplans().await.inspect_err(|err| {
            warn!(error = %err, "failed to list liftplans");
        })?;
        let names: Vec<LiftplanName> = raw
            .into_iter()
            .filter_map(|name| match LiftplanName::new(&name) {
                Ok(name) => Some(name),
                Err(_) => {
                    warn!(raw = %name, "skipping unnamed liftplan entry");
                    None
                }
            })
            .collect();
        debug!(count = names.len(), "listed liftplans");
        Ok(names)
    }

    /// Maps a name as a user types it (`twill` or `twill.json`) to the name
    /// the loom lists. Unlisted names fall back to their file name.
    pub async fn resolve(&self, name: &LiftplanName) -> ControlResult<LiftplanName> {
        let listed = self.list().await?;
        if let Some(found) = match_listed(&listed, name) {
            return Ok(found.clone());
        }
        Ok(LiftplanName::new(name.file_name()?)?)
    }

    pub async fn get(&self, name: &LiftplanName) -> ControlResult<LiftPlan> {
        let hexes = self.api.get_liftplan(name).await.inspect_err(|err| {
            warn!(liftplan = %name, error = %err, "failed to fetch liftplan");
        })?;
        let plan = LiftPlan::from_hex(hexes.as_slice()).inspect_err(|err| {
            warn!(liftplan = %name, error = %err, "loom returned an undecodable liftplan");
        })?;
        debug!(liftplan = %name, rows = plan.len(), "fetched liftplan");
        Ok(plan)
    }

    /// Persists `plan` under the file name derived from `name`, which is
    /// returned on success.
    pub async fn save(&self, name: &str, plan: &LiftPlan) -> ControlResult<LiftplanName> {
        let name = LiftplanName::new(name)?;
        let file_name = name.file_name()?;
        let rows = plan.to_hex();
        self.api
            .save_liftplan(&file_name, &rows)
            .await
            .inspect_err(|err| {
                warn!(liftplan = %file_name, error = %err, "failed to save liftplan");
            })?;
        debug!(liftplan = %file_name, rows = rows.len(), "saved liftplan");
        Ok(LiftplanName::new(file_name)?)
    }

    pub async fn delete(&self, name: &LiftplanName) -> ControlResult<()> {
        self.api.delete_liftplan(name).await.inspect_err(|err| {
            warn!(liftplan = %name, error = %err, "failed to delete liftplan");
        })?;
        debug!(liftplan = %name, "deleted liftplan");
        Ok(())
    }
}

/// Exact match first, then the same stored file under another spelling.
pub(crate) fn match_listed<'a>(
    listed: &'a [LiftplanName],
    name: &LiftplanName,
) -> Option<&'a LiftplanName> {
    listed
        .iter()
        .find(|listed| *listed == name)
        .or_else(|| listed.iter().find(|listed| listed.same_file(name)))
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
