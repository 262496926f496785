//! Terrain tile retrieval with request coalescing and a decoded-tile cache.

use crate::bounded_cache::{BoundedCache, EvictionPolicy};
use crate::consts::{NO_DATA, TILE_SIZE};
use crate::errors::UmbraError;
use crate::terrain_rgb::decode_tile;
use crate::tile_address::TileAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Anything that can hand out encoded terrain-RGB tiles.
pub trait TileSource: Send + Sync + 'static {
    fn fetch(
        &self,
        address: TileAddress,
    ) -> impl Future<Output = Result<Vec<u8>, UmbraError>> + Send;
}

/// Fetches tiles over HTTP(S) from a URL template such as
/// `https://tiles.example.com/{z}/{x}/{y}.png?key={key}`.
#[derive(Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    url_template: String,
    api_key: Option<String>,
}

impl HttpTileSource {
    pub fn new(
        url_template: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, UmbraError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpTileSource {
            client: builder.build()?,
            url_template: url_template.to_string(),
            api_key,
        })
    }

    pub fn tile_url(&self, address: TileAddress) -> String {
        self.url_template
            .replace("{z}", &address.zoom.to_string())
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &address.y.to_string())
            .replace("{key}", self.api_key.as_deref().unwrap_or(""))
    }
}

impl TileSource for HttpTileSource {
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>, UmbraError> {
        let url = self.tile_url(address);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UmbraError::Http(format!(
                "{} answered {}",
                address, status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Decoded elevation samples of one tile.
#[derive(Debug)]
pub struct ElevationTile {
    pub address: TileAddress,
    /// `false` when the tile could not be fetched or decoded; all samples
    /// are then [`NO_DATA`].
    pub available: bool,
    samples: Box<[f32]>,
}

impl ElevationTile {
    pub fn new(address: TileAddress, samples: Box<[f32]>) -> Self {
        ElevationTile {
            address,
            available: true,
            samples,
        }
    }

    pub fn unavailable(address: TileAddress) -> Self {
        ElevationTile {
            address,
            available: false,
            samples: vec![NO_DATA; TILE_SIZE * TILE_SIZE].into_boxed_slice(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// One row of samples, north to south.
    pub fn row(&self, y: usize) -> &[f32] {
        &self.samples[y * TILE_SIZE..(y + 1) * TILE_SIZE]
    }
}

struct TileStore {
    cache: BoundedCache<TileAddress, Arc<ElevationTile>>,
    /// One sender per tile being downloaded; followers subscribe to it.
    in_flight: HashMap<TileAddress, broadcast::Sender<Arc<ElevationTile>>>,
}

enum Registration {
    Cached(Arc<ElevationTile>),
    Leader,
    Follower(broadcast::Receiver<Arc<ElevationTile>>),
}

/// Clears the in-flight entry of a leader that is dropped before finishing,
/// which closes the channel and wakes its followers.
struct InFlightGuard<'a> {
    store: &'a Mutex<TileStore>,
    address: TileAddress,
    finished: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.lock().in_flight.remove(&self.address);
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetcherStats {
    /// Requests actually sent to the tile source.
    pub network_requests: u64,
    /// Lookups answered from the decoded-tile cache.
    pub cache_hits: u64,
    /// Lookups that joined a request already in flight.
    pub coalesced: u64,
}

pub struct TileFetcher<S: TileSource> {
    source: S,
    store: Mutex<TileStore>,
    network_requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
}

impl<S: TileSource> TileFetcher<S> {
    pub fn new(source: S, cache_capacity: usize) -> Self {
        TileFetcher {
            source,
            store: Mutex::new(TileStore {
                cache: BoundedCache::new(cache_capacity, EvictionPolicy::Lru),
                in_flight: HashMap::new(),
            }),
            network_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> FetcherStats {
        FetcherStats {
            network_requests: self.network_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    pub fn cached_tiles(&self) -> usize {
        self.store.lock().cache.len()
    }

    /// Returns the decoded tile. Never fails: a tile that cannot be fetched or
    /// decoded comes back as [`ElevationTile::unavailable`].
    pub async fn tile(&self, address: TileAddress) -> Arc<ElevationTile> {
        loop {
            match self.register(address) {
                Registration::Cached(tile) => return tile,
                Registration::Leader => return self.lead(address).await,
                Registration::Follower(mut receiver) => match receiver.recv().await {
                    Ok(tile) => return tile,
                    Err(_) => debug!(tile = %address, "in-flight tile request abandoned, retrying"),
                },
            }
        }
    }

    /// Cache lookup, in-flight lookup and registration, all under one lock.
    fn register(&self, address: TileAddress) -> Registration {
        let mut store = self.store.lock();
        if let Some(tile) = store.cache.get(&address) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Registration::Cached(tile);
        }

        if let Some(sender) = store.in_flight.get(&address) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(tile = %address, "joining in-flight tile request");
            return Registration::Follower(sender.subscribe());
        }

        let (sender, _) = broadcast::channel(1);
        store.in_flight.insert(address, sender);
        self.network_requests.fetch_add(1, Ordering::Relaxed);
        Registration::Leader
    }

    async fn lead(&self, address: TileAddress) -> Arc<ElevationTile> {
        let mut guard = InFlightGuard {
            store: &self.store,
            address,
            finished: false,
        };

        let tile = Arc::new(self.download(address).await);

        let sender = {
            let mut store = self.store.lock();
            if tile.available {
                store.cache.insert(address, tile.clone());
            }
            store.in_flight.remove(&address)
        };
        guard.finished = true;

        if let Some(sender) = sender {
            // no receivers is fine
            let _ = sender.send(tile.clone());
        }
        tile
    }

    async fn download(&self, address: TileAddress) -> ElevationTile {
        debug!(tile = %address, "fetching terrain tile");
        let decoded = match self.source.fetch(address).await {
            Ok(bytes) => decode_tile(&bytes),
            Err(e) => Err(e),
        };

        match decoded {
            Ok(samples) => ElevationTile::new(address, samples),
            Err(e) => {
                warn!(tile = %address, error = %e, "terrain tile unavailable, using no-data");
                ElevationTile::unavailable(address)
            }
        }
    }
}
