//! Applies ChatMix levels to the game and chat sinks.

use std::collections::HashMap;

use novamix_core::{MixLevels, Volume};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::SinkBackend;
use crate::error::{PwError, PwResult};

/// Node names of the two ChatMix sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkPair {
    pub game: String,
    pub chat: String,
}

/// Sets sink volumes by name.
///
/// Keeps a name-to-id cache; an id is evicted and the name re-resolved as
/// soon as the backend reports it gone.
pub struct SinkController<B: SinkBackend> {
    backend: B,
    cache: HashMap<String, u32>,
}

impl<B: SinkBackend> SinkController<B> {
    /// Create a controller on top of a backend.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend, cache: HashMap::new() }
    }

    /// Set the volume of the sink called `name`.
    ///
    /// An absent sink is logged and reported as [`PwError::SinkNotFound`];
    /// the controller stays usable.
    ///
    /// # Errors
    /// Returns [`PwError::SinkNotFound`] if no such sink exists, or the
    /// backend's error if the volume cannot be set.
    pub fn apply(&mut self, name: &str, volume: Volume) -> PwResult<()> {
        let Some(id) = self.lookup(name)? else {
            warn!(sink = %name, "Sink not found, skipping volume change");
            return Err(PwError::SinkNotFound(name.to_string()));
        };

        match self.backend.set_volume(id, volume) {
            Err(PwError::SinkNotFound(_)) => {
                debug!(sink = %name, id, "Cached sink id is stale, re-resolving");
                self.cache.remove(name);
                self.retry(name, id, volume)
            }
            Err(e) => {
                warn!(sink = %name, error = %e, "Failed to set sink volume");
                Err(e)
            }
            Ok(()) => {
                debug!(sink = %name, id, %volume, "Sink volume set");
                Ok(())
            }
        }
    }

    /// Apply both ChatMix levels.
    ///
    /// The chat sink is still attempted when the game sink fails. Returns
    /// every failure; an empty list means both volumes were set.
    pub fn apply_levels(&mut self, sinks: &SinkPair, levels: MixLevels) -> Vec<PwError> {
        [(sinks.game.as_str(), levels.game), (sinks.chat.as_str(), levels.chat)]
            .into_iter()
            .filter_map(|(name, volume)| self.apply(name, volume).err())
            .collect()
    }

    /// Drop every cached id.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// The backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn retry(&mut self, name: &str, stale: u32, volume: Volume) -> PwResult<()> {
        match self.lookup(name)? {
            Some(id) if id != stale => match self.backend.set_volume(id, volume) {
                Err(e) => {
                    self.cache.remove(name);
                    warn!(sink = %name, error = %e, "Failed to set sink volume");
                    Err(e)
                }
                Ok(()) => {
                    debug!(sink = %name, id, %volume, "Sink volume set");
                    Ok(())
                }
            },
            _ => {
                self.cache.remove(name);
                warn!(sink = %name, "Sink not found, skipping volume change");
                Err(PwError::SinkNotFound(name.to_string()))
            }
        }
    }

    fn lookup(&mut self, name: &str) -> PwResult<Option<u32>> {
        if let Some(&id) = self.cache.get(name) {
            return Ok(Some(id));
        }

        let resolved = self.backend.resolve(name)?;
        if let Some(id) = resolved {
            self.cache.insert(name.to_string(), id);
        }
        Ok(resolved)
    }
}
