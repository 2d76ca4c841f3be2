//! Cross-block LRU cache for hot lookups.
//!
//! Deploy records are read for nearly every operation and change rarely, so
//! they are kept across blocks under `"deploy:<TICK>"` keys. The cache is
//! strictly best-effort: a miss falls through to Postgres, and the pipeline
//! drops the whole cache on reorgs.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::core::fold_ticker;
use crate::db::models::DbDeploy;

pub struct HotCache {
    deploys: LruCache<String, DbDeploy>,
}

fn deploy_key(tick: &str) -> String {
    format!("deploy:{}", fold_ticker(tick))
}

impl HotCache {
    pub fn new(size: usize) -> Self {
        HotCache {
            deploys: LruCache::new(NonZeroUsize::new(size.max(1)).unwrap()),
        }
    }

    pub fn get_deploy(&mut self, tick: &str) -> Option<DbDeploy> {
        self.deploys.get(&deploy_key(tick)).cloned()
    }

    pub fn insert_deploy(&mut self, deploy: DbDeploy) {
        self.deploys.put(deploy_key(&deploy.ticker), deploy);
    }

    pub fn clear(&mut self) {
        self.deploys.clear();
    }
}

#[cfg(test)]
mod test {
    use crate::core::test_builders::test_deploy;

    use super::HotCache;

    #[test]
    fn lookups_fold_the_ticker() {
        let mut cache = HotCache::new(10);
        cache.insert_deploy(test_deploy("TEST", "1000"));
        assert!(cache.get_deploy("test").is_some());
        assert!(cache.get_deploy("NOPE").is_none());
        cache.clear();
        assert!(cache.get_deploy("TEST").is_none());
    }

    #[test]
    fn old_entries_are_evicted() {
        let mut cache = HotCache::new(1);
        cache.insert_deploy(test_deploy("AAAA", "1000"));
        cache.insert_deploy(test_deploy("BBBB", "1000"));
        assert!(cache.get_deploy("AAAA").is_none());
        assert!(cache.get_deploy("BBBB").is_some());
    }
}
