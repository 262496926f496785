//! Memoization of complete shadow computations under a quantized key, so
//! that small pans and sun movements reuse an earlier overlay.

use crate::bounded_cache::{BoundedCache, EvictionPolicy};
use crate::geo::GeoBounds;
use crate::quality::QualityTier;
use crate::sun::SunPosition;
use std::sync::Arc;

/// Bounds are rounded to hundredths of a degree.
const BOUNDS_QUANTUM: f64 = 100.0;

/// Sun angles are rounded to the nearest multiple of this many degrees.
const ANGLE_QUANTUM_DEG: f64 = 5.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShadowCacheKey {
    west: i64,
    south: i64,
    east: i64,
    north: i64,
    azimuth: i64,
    altitude: i64,
    quality: QualityTier,
}

impl ShadowCacheKey {
    pub fn new(bounds: &GeoBounds, sun: &SunPosition, quality: QualityTier) -> Self {
        let coordinate = |v: f64| (v * BOUNDS_QUANTUM).round() as i64;
        let angle = |v: f64| ((v / ANGLE_QUANTUM_DEG).round() * ANGLE_QUANTUM_DEG) as i64;

        ShadowCacheKey {
            west: coordinate(bounds.west),
            south: coordinate(bounds.south),
            east: coordinate(bounds.east),
            north: coordinate(bounds.north),
            azimuth: angle(sun.azimuth_degrees).rem_euclid(360),
            altitude: angle(sun.altitude_degrees),
            quality,
        }
    }
}

/// FIFO-bounded store of shared results.
#[derive(Debug)]
pub struct ShadowCache<V> {
    entries: BoundedCache<ShadowCacheKey, Arc<V>>,
}

impl<V> ShadowCache<V> {
    pub fn new(capacity: usize) -> Self {
        ShadowCache {
            entries: BoundedCache::new(capacity, EvictionPolicy::Fifo),
        }
    }

    pub fn get(&mut self, key: &ShadowCacheKey) -> Option<Arc<V>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: ShadowCacheKey, value: Arc<V>) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
