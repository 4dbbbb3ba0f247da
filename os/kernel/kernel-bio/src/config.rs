use kernel_info::param::{NBUCKET, NBUF};

/// Geometry of the buffer cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferCacheConfig {
    /// Number of buffer slots in the pool.
    pub buffers: usize,
    /// Number of hash buckets; should be prime.
    pub buckets: usize,
}

impl Default for BufferCacheConfig {
    fn default() -> Self {
        Self::new(NBUF, NBUCKET)
    }
}

impl BufferCacheConfig {
    #[must_use]
    pub const fn new(buffers: usize, buckets: usize) -> Self {
        Self { buffers, buckets }
    }

    /// Check the geometry before any memory is committed to it.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.buffers == 0 {
            return Err(ConfigError::NoBuffers);
        }
        if self.buckets == 0 {
            return Err(ConfigError::NoBuckets);
        }
        // Slot links are u32 indices with u32::MAX reserved as the list terminator.
        if self.buffers >= u32::MAX as usize {
            return Err(ConfigError::TooManyBuffers(self.buffers));
        }
        Ok(())
    }

    /// Bucket holding `block_no`. The device is deliberately not hashed.
    #[inline]
    #[must_use]
    pub const fn bucket_of(&self, block_no: u32) -> usize {
        block_no as usize % self.buckets
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("buffer cache needs at least one buffer")]
    NoBuffers,
    #[error("buffer cache needs at least one hash bucket")]
    NoBuckets,
    #[error("{0} buffers exceed the buffer index space")]
    TooManyBuffers(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_valid() {
        let c = BufferCacheConfig::default();
        assert_eq!(c.buffers, NBUF);
        assert_eq!(c.buckets, NBUCKET);
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_pools() {
        assert_eq!(
            BufferCacheConfig::new(0, 13).validate(),
            Err(ConfigError::NoBuffers)
        );
        assert_eq!(
            BufferCacheConfig::new(4, 0).validate(),
            Err(ConfigError::NoBuckets)
        );
    }

    #[test]
    fn buckets_by_block_number() {
        let c = BufferCacheConfig::new(30, 13);
        assert_eq!(c.bucket_of(0), 0);
        assert_eq!(c.bucket_of(13), 0);
        assert_eq!(c.bucket_of(27), 1);
    }
}
