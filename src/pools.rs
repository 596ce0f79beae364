use crate::gateway::{Gateway, PoolReads};
use crate::types::{DexError, PoolInfo, Result};
use crate::utils;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An immutable listing of all discovered pools, valid as of the block and
/// instant it was fetched
#[derive(Debug)]
pub struct PoolSnapshot {
    pub pools: Vec<PoolInfo>,
    pub block_number: u64,
    pub fetched_at: DateTime<Utc>,
    taken: Instant,
}

impl PoolSnapshot {
    pub fn age(&self) -> Duration {
        self.taken.elapsed()
    }

    /// All pools holding an (unordered) token pair
    pub fn pools_for_pair(&self, token_a: &Address, token_b: &Address) -> Vec<&PoolInfo> {
        self.pools
            .iter()
            .filter(|p| p.contains_pair(token_a, token_b))
            .collect()
    }

    pub fn pools_with_token(&self, token: &Address) -> Vec<&PoolInfo> {
        self.pools
            .iter()
            .filter(|p| p.token0 == *token || p.token1 == *token)
            .collect()
    }
}

/// Enumerates deployed AMM pools through the factory and resolves token pairs
/// to pool addresses. Listings are cached for a polling interval; the cached
/// snapshot is swapped out wholesale on refresh, never mutated, so concurrent
/// readers always see a consistent listing.
pub struct PoolDiscovery<R: PoolReads = Gateway> {
    reader: Arc<R>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<PoolSnapshot>>>,
}

impl PoolDiscovery<Gateway> {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let ttl = Duration::from_secs(gateway.config().pool_cache_ttl_secs);
        Self::with_reader(gateway, ttl)
    }
}

impl<R: PoolReads> PoolDiscovery<R> {
    pub fn with_reader(reader: Arc<R>, ttl: Duration) -> Self {
        Self {
            reader,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// Current snapshot, refetched when absent or older than the TTL.
    /// Staleness within the TTL is acceptable for display; anything feeding a
    /// transaction must call `refresh` instead.
    pub async fn list_pools(&self) -> Result<Arc<PoolSnapshot>> {
        if let Some(snapshot) = self.cached() {
            if snapshot.age() < self.ttl {
                debug!(age_ms = snapshot.age().as_millis() as u64, "pool snapshot from cache");
                return Ok(snapshot);
            }
        }
        self.refresh().await
    }

    /// Force a refetch and replace the cached snapshot
    pub async fn refresh(&self) -> Result<Arc<PoolSnapshot>> {
        let snapshot = Arc::new(self.fetch_snapshot().await?);
        *self
            .snapshot
            .write()
            .expect("pool snapshot lock poisoned") = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn cached(&self) -> Option<Arc<PoolSnapshot>> {
        self.snapshot
            .read()
            .expect("pool snapshot lock poisoned")
            .clone()
    }

    async fn fetch_snapshot(&self) -> Result<PoolSnapshot> {
        let count = self.reader.pool_count().await?;
        info!(count, "enumerating pools");

        // index -> address reads, fanned out
        let address_reads = (0..count).map(|i| self.reader.pool_address_at(i));
        let addresses: Vec<Address> = join_all(address_reads)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(i, result)| match result {
                Ok(addr) => Some(addr),
                Err(e) => {
                    // one bad pool must not block discovery of the rest
                    warn!(index = i, "skipping pool address read: {}", e);
                    None
                }
            })
            .collect();

        // per-pool detail reads, fanned out; failures are omitted
        let detail_reads = addresses.iter().map(|addr| self.describe_pool(*addr));
        let pools: Vec<PoolInfo> = join_all(detail_reads)
            .await
            .into_iter()
            .zip(addresses.iter())
            .filter_map(|(result, addr)| match result {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(pool = %format!("{:#x}", addr), "skipping pool: {}", e);
                    None
                }
            })
            .collect();

        // each pool carries the block observed with its own reserves; the
        // snapshot is stamped with the newest of those
        let block_number = match pools.iter().map(|p| p.block_number).max() {
            Some(n) => n,
            None => self.reader.block_number().await?,
        };

        info!(discovered = pools.len(), total = count, block_number, "pool discovery complete");

        Ok(PoolSnapshot {
            pools,
            block_number,
            fetched_at: Utc::now(),
            taken: Instant::now(),
        })
    }

    /// Pool descriptor with the block number read alongside the reserves, so
    /// the stamp reflects the block they were actually served at
    async fn describe_pool(&self, address: Address) -> Result<PoolInfo> {
        let (details, block_number) = futures::try_join!(
            self.reader.pool_details(address),
            self.reader.block_number(),
        )?;
        let (token0, token1, reserve0, reserve1) = details;
        Ok(PoolInfo {
            address,
            token0,
            token1,
            reserve0,
            reserve1,
            fee_bps: 30,
            block_number,
        })
    }

    /// Resolve a token pair to its pool. The pair is sorted into canonical
    /// on-chain order before the factory lookup; a zero-address answer means
    /// no pool exists.
    pub async fn find_pool(&self, token_a: Address, token_b: Address) -> Result<Option<PoolInfo>> {
        if token_a == token_b {
            return Err(DexError::InvalidPath(
                "cannot pair a token with itself".to_string(),
            ));
        }

        let (token0, token1) = utils::sort_tokens(token_a, token_b);
        let pool_address = self.reader.pair_for(token0, token1).await?;

        if pool_address.is_zero() {
            debug!(
                token0 = %format!("{:#x}", token0),
                token1 = %format!("{:#x}", token1),
                "no pool for pair"
            );
            return Ok(None);
        }

        self.describe_pool(pool_address).await.map(Some)
    }

    /// Fresh descriptor for a known pool, for the must-refresh-before-swap rule
    pub async fn refresh_pool(&self, address: Address) -> Result<PoolInfo> {
        self.describe_pool(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockPoolReads;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn snapshot(pools: Vec<PoolInfo>) -> PoolSnapshot {
        PoolSnapshot {
            pools,
            block_number: 10,
            fetched_at: Utc::now(),
            taken: Instant::now(),
        }
    }

    fn pool(addr: u64, t0: u64, t1: u64) -> PoolInfo {
        PoolInfo {
            address: Address::from_low_u64_be(addr),
            token0: Address::from_low_u64_be(t0),
            token1: Address::from_low_u64_be(t1),
            reserve0: U256::from(1000u64),
            reserve1: U256::from(2000u64),
            fee_bps: 30,
            block_number: 10,
        }
    }

    /// Canned factory with two pools behind stable addresses
    fn canned_reader() -> MockPoolReads {
        let mut reader = MockPoolReads::new();
        reader.expect_pool_count().returning(|| Ok(2));
        reader
            .expect_pool_address_at()
            .returning(|i| Ok(Address::from_low_u64_be(100 + i as u64)));
        reader.expect_pool_details().returning(|addr| {
            Ok((
                Address::from_low_u64_be(1),
                Address::from_low_u64_be(2),
                U256::from(1000u64),
                U256::from(2000u64 + addr.to_low_u64_be()),
            ))
        });
        reader.expect_block_number().returning(|| Ok(50));
        reader
    }

    #[test]
    fn test_snapshot_pair_lookup_is_order_insensitive() {
        let snap = snapshot(vec![pool(100, 1, 2), pool(101, 2, 3)]);
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);

        assert_eq!(snap.pools_for_pair(&a, &b).len(), 1);
        assert_eq!(snap.pools_for_pair(&b, &a).len(), 1);
        assert_eq!(snap.pools_with_token(&b).len(), 2);
    }

    #[test]
    fn test_snapshot_age_grows() {
        let snap = snapshot(vec![]);
        assert!(snap.age() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_repeated_enumeration_yields_same_descriptors() {
        // zero TTL forces every listing through a full re-enumeration
        let discovery = PoolDiscovery::with_reader(Arc::new(canned_reader()), Duration::ZERO);

        let first = discovery.list_pools().await.unwrap();
        let second = discovery.list_pools().await.unwrap();

        assert_eq!(first.pools.len(), 2);
        let addresses = |snap: &PoolSnapshot| {
            snap.pools.iter().map(|p| p.address).collect::<Vec<_>>()
        };
        assert_eq!(addresses(&first), addresses(&second));

        let pairs = |snap: &PoolSnapshot| {
            snap.pools
                .iter()
                .map(|p| (p.token0, p.token1))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&first), pairs(&second));
    }

    #[tokio::test]
    async fn test_failed_pool_read_is_omitted_not_fatal() {
        let mut reader = MockPoolReads::new();
        reader.expect_pool_count().returning(|| Ok(2));
        reader
            .expect_pool_address_at()
            .returning(|i| Ok(Address::from_low_u64_be(100 + i as u64)));
        reader.expect_pool_details().returning(|addr| {
            if addr == Address::from_low_u64_be(101) {
                Err(DexError::ContractError("pool read failed".to_string()))
            } else {
                Ok((
                    Address::from_low_u64_be(1),
                    Address::from_low_u64_be(2),
                    U256::from(1000u64),
                    U256::from(2000u64),
                ))
            }
        });
        reader.expect_block_number().returning(|| Ok(50));

        let discovery = PoolDiscovery::with_reader(Arc::new(reader), Duration::ZERO);
        let snap = discovery.list_pools().await.unwrap();

        assert_eq!(snap.pools.len(), 1);
        assert_eq!(snap.pools[0].address, Address::from_low_u64_be(100));
    }

    #[tokio::test]
    async fn test_pool_block_stamp_tracks_its_own_reserve_read() {
        // advancing chain head; each descriptor must carry the block seen at
        // its own read, and the snapshot the newest of them
        let head = AtomicU64::new(70);
        let mut reader = MockPoolReads::new();
        reader.expect_pool_count().returning(|| Ok(2));
        reader
            .expect_pool_address_at()
            .returning(|i| Ok(Address::from_low_u64_be(100 + i as u64)));
        reader.expect_pool_details().returning(|_| {
            Ok((
                Address::from_low_u64_be(1),
                Address::from_low_u64_be(2),
                U256::from(1000u64),
                U256::from(2000u64),
            ))
        });
        reader
            .expect_block_number()
            .returning(move || Ok(head.fetch_add(1, Ordering::SeqCst)));

        let discovery = PoolDiscovery::with_reader(Arc::new(reader), Duration::ZERO);
        let snap = discovery.list_pools().await.unwrap();

        assert_eq!(snap.pools.len(), 2);
        for pool in &snap.pools {
            assert!(pool.block_number >= 70);
        }
        let newest = snap.pools.iter().map(|p| p.block_number).max().unwrap();
        assert_eq!(snap.block_number, newest);
    }
}
