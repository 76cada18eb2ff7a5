//! Sharded in-memory record cache with TTL expiration
//!
//! The cache maps a normalized owner name to per-record-type entries,
//! each carrying an absolute expiry. It is split into a fixed number of
//! independently locked shards so lookups and inserts on unrelated names
//! never serialize against each other. Shard selection mixes a
//! per-process random seed into the hash, so an attacker cannot
//! precompute names that all land in one shard.

use std::collections::HashMap;
use std::hash::Hasher;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use fnv::FnvHasher;
use hickory_proto::rr::rdata::{A, NS};
use hickory_proto::rr::{Name, RData, RecordType};
use parking_lot::RwLock;
use rand::RngCore;

use crate::error::{Error, Result};

/// Bootstrap TTL for the root hints, far beyond any query's lifetime.
const ROOT_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Root nameserver seeded at construction.
const ROOT_NS_NAME: &str = "a.root-servers.net.";
const ROOT_NS_ADDR: Ipv4Addr = Ipv4Addr::new(198, 41, 0, 4);

/// A cached record set: an absolute expiry and the data it covers.
///
/// Entries are replaced whole, never mutated in place, so a reader
/// always observes a consistent `(expires, data)` pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// When this entry stops being served.
    pub expires: Instant,
    /// The record data, opaque to the cache.
    pub data: Vec<RData>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }
}

type EntryMap = HashMap<String, HashMap<RecordType, CacheEntry>>;

struct Shard {
    entries: RwLock<EntryMap>,
}

/// Sharded mapping from (owner name, record type) to [`CacheEntry`].
///
/// Construction draws the process hash seed if nothing has yet and
/// seeds the root hints, so [`best_ns`](RecordCache::best_ns) always
/// has a delegation to fall back to. Expired entries are treated as
/// absent on read and reclaimed only by being overwritten.
pub struct RecordCache {
    shards: Vec<Shard>,
}

impl RecordCache {
    /// Create a cache with `shards` partitions and the root hints seeded.
    pub fn new(shards: usize) -> Result<Self> {
        if shards == 0 {
            return Err(Error::Config("cache shard count must be nonzero".into()));
        }

        // Make sure the seed exists before any hash runs.
        hash_seed();

        let shards = (0..shards)
            .map(|_| Shard {
                entries: RwLock::new(HashMap::new()),
            })
            .collect();

        let cache = Self { shards };
        cache.seed_root()?;
        Ok(cache)
    }

    fn seed_root(&self) -> Result<()> {
        let root_ns = Name::from_ascii(ROOT_NS_NAME)
            .map_err(|e| Error::Config(format!("bad root hint {}: {}", ROOT_NS_NAME, e)))?;
        let expires = Instant::now() + ROOT_TTL;
        self.set(".", RecordType::NS, expires, vec![RData::NS(NS(root_ns))]);
        self.set(
            ROOT_NS_NAME,
            RecordType::A,
            expires,
            vec![RData::A(A(ROOT_NS_ADDR))],
        );
        Ok(())
    }

    /// Look up the entry for `name`/`rtype`.
    ///
    /// Returns `None` for unknown names, unknown types, expired entries,
    /// and entries with no data. The name may be in any case, with or
    /// without a trailing dot.
    pub fn lookup(&self, name: &str, rtype: RecordType) -> Option<CacheEntry> {
        let name = normalize_name(name);
        let shard = self.shard_for(&name);

        let entries = shard.entries.read();
        let entry = entries.get(&name)?.get(&rtype)?;
        if entry.is_expired() || entry.data.is_empty() {
            return None;
        }
        Some(entry.clone())
    }

    /// Replace the entry at `name`/`rtype`.
    ///
    /// Concurrent writers to the same key are permitted; the last one
    /// wins and redundant updates are harmless.
    pub fn set(&self, name: &str, rtype: RecordType, expires: Instant, data: Vec<RData>) {
        let name = normalize_name(name);
        let shard = self.shard_for(&name);

        let mut entries = shard.entries.write();
        entries
            .entry(name)
            .or_default()
            .insert(rtype, CacheEntry { expires, data });
    }

    /// The most specific cached, unexpired NS entry covering `name`,
    /// found by stripping the leftmost label until a hit.
    ///
    /// After construction the root NS is always present, so this only
    /// returns `None` if the root entry itself has been clobbered or
    /// expired.
    pub fn best_ns(&self, name: &str) -> Option<CacheEntry> {
        let mut name = normalize_name(name);
        loop {
            if let Some(entry) = self.lookup(&name, RecordType::NS) {
                return Some(entry);
            }
            if name == "." {
                return None;
            }
            name = match name.split_once('.') {
                Some((_, parent)) if !parent.is_empty() => parent.to_string(),
                _ => ".".to_string(),
            };
        }
    }

    fn shard_for(&self, normalized: &str) -> &Shard {
        &self.shards[seeded_index(normalized.as_bytes(), hash_seed(), self.shards.len())]
    }
}

/// Process-wide hash seed, shared by name and server shard selection.
static HASH_SEED: OnceLock<[u8; 16]> = OnceLock::new();

/// The seed, drawn exactly once per process on first use.
///
/// rand::rng() is a CSPRNG; a predictable seed would let remote names
/// be crafted to pile onto a single shard.
pub(crate) fn hash_seed() -> &'static [u8; 16] {
    HASH_SEED.get_or_init(|| {
        let mut seed = [0u8; 16];
        rand::rng().fill_bytes(&mut seed);
        seed
    })
}

/// Normalize a domain name into its cache-key form: strip one trailing
/// dot, lowercase ASCII, and map the empty string to the root `"."`.
pub fn normalize_name(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return ".".to_string();
    }
    name.to_ascii_lowercase()
}

/// Seeded FNV-1a bucket selection over `key || seed`.
///
/// Deterministic within one process, nondeterministic across restarts.
pub(crate) fn seeded_index(key: &[u8], seed: &[u8], buckets: usize) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.write(seed);
    (hasher.finish() % buckets as u64) as usize
}
