//! Entity resolution
//!
//! Maps natural keys to store ids for parties, politicians and elections.
//! A [`ResolverCache`] is seeded once per run from the store; each worker
//! gets its own [`EntityResolver`] holding a copy of that snapshot plus
//! whatever it resolves itself. Workers never share a cache, so there is no
//! cross-worker locking: two workers racing to create the same politician
//! are settled by the store's UNIQUE constraint, and the loser adopts the
//! winner's id.
//!
//! Resolution statements run in autocommit on the worker's connection,
//! outside any upsert transaction, so a cached id always refers to a row
//! that is durably in the store.

use crate::db::{elections, parties, politicians};
use crate::models::{ElectionKey, PartyNumber, PoliticianKey};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Store unreachable or statement failed
    #[error("Resolution store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Insert lost a race but the winning row could not be read back
    #[error("{kind} {key} lost its insert race but is not readable")]
    Vanished { kind: &'static str, key: String },

    /// Key cannot produce the derived fields its row needs
    #[error("{kind} {key} has no derivable election date")]
    Underivable { kind: &'static str, key: String },
}

/// Snapshot of the dimension tables taken at run start
#[derive(Debug, Clone, Default)]
pub struct ResolverCache {
    parties: HashSet<PartyNumber>,
    politicians: HashMap<PoliticianKey, Uuid>,
    elections: HashMap<ElectionKey, Uuid>,
}

impl ResolverCache {
    /// Bulk-read every stored party, politician and election
    pub async fn seed(pool: &SqlitePool) -> Result<Self, ResolutionError> {
        let parties = parties::load_party_numbers(pool).await?.into_iter().collect();
        let politicians = politicians::load_politician_ids(pool).await?.into_iter().collect();
        let elections = elections::load_election_ids(pool).await?.into_iter().collect();

        let cache = Self {
            parties,
            politicians,
            elections,
        };

        tracing::info!(
            parties = cache.parties.len(),
            politicians = cache.politicians.len(),
            elections = cache.elections.len(),
            "Resolver cache seeded"
        );

        Ok(cache)
    }

    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    pub fn politician_count(&self) -> usize {
        self.politicians.len()
    }

    pub fn election_count(&self) -> usize {
        self.elections.len()
    }
}

/// A resolved surrogate id and whether this call created the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: Uuid,
    pub created: bool,
}

/// Per-worker resolver
#[derive(Debug, Clone)]
pub struct EntityResolver {
    cache: ResolverCache,
    lost_races: usize,
}

impl EntityResolver {
    pub fn new(cache: ResolverCache) -> Self {
        Self {
            cache,
            lost_races: 0,
        }
    }

    /// Number of creates that found the key already taken in the store
    pub fn lost_races(&self) -> usize {
        self.lost_races
    }

    /// Resolve a party number. Parties are never created here; `None` means
    /// no such party is stored.
    pub async fn party(
        &mut self,
        conn: &mut SqliteConnection,
        number: PartyNumber,
    ) -> Result<Option<PartyNumber>, ResolutionError> {
        if self.cache.parties.contains(&number) {
            return Ok(Some(number));
        }

        // Loaded after the snapshot was taken?
        if parties::party_exists(conn, number).await? {
            self.cache.parties.insert(number);
            return Ok(Some(number));
        }

        Ok(None)
    }

    /// Resolve a politician, creating it when absent
    pub async fn politician(
        &mut self,
        conn: &mut SqliteConnection,
        key: &PoliticianKey,
    ) -> Result<Resolved, ResolutionError> {
        if let Some(id) = self.cache.politicians.get(key) {
            return Ok(Resolved {
                id: *id,
                created: false,
            });
        }

        let candidate = Uuid::new_v4();
        let resolved = if politicians::insert_politician_if_absent(conn, key, candidate).await? {
            Resolved {
                id: candidate,
                created: true,
            }
        } else {
            self.lost_races += 1;
            let id = politicians::find_politician_id(conn, key)
                .await?
                .ok_or_else(|| ResolutionError::Vanished {
                    kind: "politician",
                    key: key.to_string(),
                })?;
            Resolved { id, created: false }
        };

        self.cache.politicians.insert(key.clone(), resolved.id);
        Ok(resolved)
    }

    /// Drop a cached politician id (its creating transaction rolled back)
    pub fn forget_politician(&mut self, key: &PoliticianKey) {
        self.cache.politicians.remove(key);
    }

    /// Resolve an election, creating it (with its derived date) when absent
    pub async fn election(
        &mut self,
        conn: &mut SqliteConnection,
        key: &ElectionKey,
    ) -> Result<Resolved, ResolutionError> {
        if let Some(id) = self.cache.elections.get(key) {
            return Ok(Resolved {
                id: *id,
                created: false,
            });
        }

        let election_date = key.election_date().ok_or_else(|| ResolutionError::Underivable {
            kind: "election",
            key: key.to_string(),
        })?;

        let candidate = Uuid::new_v4();
        let resolved =
            if elections::insert_election_if_absent(conn, key, election_date, candidate).await? {
                Resolved {
                    id: candidate,
                    created: true,
                }
            } else {
                self.lost_races += 1;
                let id = elections::find_election_id(conn, key)
                    .await?
                    .ok_or_else(|| ResolutionError::Vanished {
                        kind: "election",
                        key: key.to_string(),
                    })?;
                Resolved { id, created: false }
            };

        self.cache.elections.insert(key.clone(), resolved.id);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartyRow;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = politica_common::db::init_database(&dir.path().join("t.db"), 4)
            .await
            .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_two_snapshots_agree_on_politician_id() {
        let (_dir, pool) = test_pool().await;
        let cache = ResolverCache::seed(&pool).await.unwrap();

        // Both workers start from the same empty snapshot
        let mut first = EntityResolver::new(cache.clone());
        let mut second = EntityResolver::new(cache);
        let mut conn_a = pool.acquire().await.unwrap();
        let mut conn_b = pool.acquire().await.unwrap();

        let key = PoliticianKey::new("JOÃO SANTOS", "JOÃO");
        let a = first.politician(&mut conn_a, &key).await.unwrap();
        let b = second.politician(&mut conn_b, &key).await.unwrap();

        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.id, b.id);
        assert_eq!(second.lost_races(), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM politicians")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_election_creation() {
        let (_dir, pool) = test_pool().await;
        let cache = ResolverCache::seed(&pool).await.unwrap();
        let key = ElectionKey::new(2022, 1, "ELEIÇÃO ORDINÁRIA");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let mut resolver = EntityResolver::new(cache.clone());
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                resolver.election(&mut conn, &key).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let resolved = handle.await.unwrap();
            ids.insert(resolved.id);
            created += usize::from(resolved.created);
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_party_resolution_never_creates() {
        let (_dir, pool) = test_pool().await;
        let mut resolver = EntityResolver::new(ResolverCache::seed(&pool).await.unwrap());
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(resolver.party(&mut conn, 13).await.unwrap(), None);

        // Loaded after the snapshot: found through the store
        parties::insert_party_if_absent(&mut conn, &PartyRow::new(13, "PT", "A"))
            .await
            .unwrap();
        assert_eq!(resolver.party(&mut conn, 13).await.unwrap(), Some(13));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parties")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_seed_reads_existing_rows() {
        let (_dir, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut resolver = EntityResolver::new(ResolverCache::default());
        let key = PoliticianKey::new("ANA", "ANA");
        let created = resolver.politician(&mut conn, &key).await.unwrap();

        let cache = ResolverCache::seed(&pool).await.unwrap();
        assert_eq!(cache.politician_count(), 1);

        let mut fresh = EntityResolver::new(cache);
        let found = fresh.politician(&mut conn, &key).await.unwrap();
        assert_eq!(found.id, created.id);
        assert!(!found.created);
        assert_eq!(fresh.lost_races(), 0);
    }

    #[tokio::test]
    async fn test_underivable_election_is_error() {
        let (_dir, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut resolver = EntityResolver::new(ResolverCache::default());

        let err = resolver
            .election(&mut conn, &ElectionKey::new(2022, 0, "X"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Underivable { .. }));
    }
}
