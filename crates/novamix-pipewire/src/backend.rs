//! Volume backends.

use novamix_core::Volume;

use crate::error::PwResult;

/// Something that can look up sinks by name and set their volume.
#[cfg_attr(test, mockall::automock)]
pub trait SinkBackend {
    /// Resolve a sink node name against the live sink list.
    ///
    /// # Errors
    /// Returns an error if the sink list cannot be read.
    fn resolve(&self, name: &str) -> PwResult<Option<u32>>;

    /// Set a sink's volume.
    ///
    /// # Errors
    /// Returns [`crate::PwError::SinkNotFound`] if `id` no longer exists.
    fn set_volume(&self, id: u32, volume: Volume) -> PwResult<()>;

    /// Short backend name for logs and status output.
    fn name(&self) -> &'static str;
}

impl<B: SinkBackend + ?Sized> SinkBackend for Box<B> {
    fn resolve(&self, name: &str) -> PwResult<Option<u32>> {
        (**self).resolve(name)
    }

    fn set_volume(&self, id: u32, volume: Volume) -> PwResult<()> {
        (**self).set_volume(id, volume)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
