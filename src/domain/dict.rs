//! Dictionary Cache
//!
//! A dict is reachable by id and by code, and so is its item list. A
//! change to one dict therefore fans out to four keys:
//! `dict:<id>`, `dict:code:<code>`, `dictItems:<id>`, `dictItems:code:<code>`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{changed_since, ns, Domain};
use crate::cache::{CacheKey, CascadeRules, TwoTierCache};
use crate::error::Result;
use crate::models::{Dict, DictItem};
use crate::source::DictSource;
use crate::tasks::{WarmUpReport, WarmUpScheduler};

// == Cascade ==
/// `dict:<q>` takes `dictItems:<q>` with it, for either qualifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictCascade;

impl CascadeRules for DictCascade {
    fn dependents(&self, key: &CacheKey) -> Vec<CacheKey> {
        if key.namespace() == ns::DICT {
            vec![CacheKey::new(ns::DICT_ITEMS, key.qualifier().clone())]
        } else {
            Vec::new()
        }
    }
}

// == Dict Cache ==
#[derive(Clone)]
pub struct DictCache {
    engine: Arc<TwoTierCache>,
    source: Arc<dyn DictSource>,
}

impl DictCache {
    pub fn new(engine: Arc<TwoTierCache>, source: Arc<dyn DictSource>) -> Self {
        Self { engine, source }
    }

    // == Reads ==
    /// Loads by id; a miss also fills the by-code alias.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Dict>> {
        self.engine
            .get(&CacheKey::id(ns::DICT, id), || self.load_by_id(id))
            .await
    }

    /// Loads by code; a miss also fills the by-id alias.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Dict>> {
        self.engine
            .get(&CacheKey::code(ns::DICT, code), || self.load_by_code(code))
            .await
    }

    pub async fn get_item(&self, item_id: i64) -> Result<Option<DictItem>> {
        self.engine
            .get(&CacheKey::id(ns::DICT_ITEM, item_id), || {
                self.source.item_by_id(item_id)
            })
            .await
    }

    /// Enabled items of the dict with `dict_id`. Empty lists are cached too.
    pub async fn get_items_by_dict_id(&self, dict_id: i64) -> Result<Vec<DictItem>> {
        let items = self
            .engine
            .get(&CacheKey::id(ns::DICT_ITEMS, dict_id), || {
                self.load_items_by_id(dict_id)
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    pub async fn get_items_by_dict_code(&self, code: &str) -> Result<Vec<DictItem>> {
        let items = self
            .engine
            .get(&CacheKey::code(ns::DICT_ITEMS, code), || {
                self.load_items_by_code(code)
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    // == Loaders ==
    async fn load_by_id(&self, id: i64) -> anyhow::Result<Option<Dict>> {
        let dict = self.source.dict_by_id(id).await?;
        if let Some(dict) = &dict {
            self.put_alias(&CacheKey::code(ns::DICT, &dict.dict_code), dict)
                .await;
        }
        Ok(dict)
    }

    async fn load_by_code(&self, code: &str) -> anyhow::Result<Option<Dict>> {
        let dict = self.source.dict_by_code(code).await?;
        if let Some(dict) = &dict {
            self.put_alias(&CacheKey::id(ns::DICT, dict.id), dict).await;
        }
        Ok(dict)
    }

    async fn load_items_by_id(&self, dict_id: i64) -> anyhow::Result<Option<Vec<DictItem>>> {
        Ok(Some(self.source.items_by_dict_id(dict_id).await?))
    }

    async fn load_items_by_code(&self, code: &str) -> anyhow::Result<Option<Vec<DictItem>>> {
        Ok(Some(self.source.items_by_dict_code(code).await?))
    }

    async fn put_alias(&self, key: &CacheKey, dict: &Dict) {
        if let Err(e) = self.engine.put(key, dict).await {
            warn!(key = %key, error = %e, "failed to cache dict alias");
        }
    }

    // == Explicit Population ==
    /// Caches a freshly written dict under both its id and its code.
    pub async fn cache_dict(&self, dict: &Dict) -> Result<()> {
        self.engine.put(&CacheKey::id(ns::DICT, dict.id), dict).await?;
        self.engine
            .put(&CacheKey::code(ns::DICT, &dict.dict_code), dict)
            .await
    }

    pub async fn cache_item(&self, item: &DictItem) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::DICT_ITEM, item.id), item)
            .await
    }

    /// Caches the item list under both the dict id and the dict code.
    pub async fn cache_items(&self, dict: &Dict, items: &[DictItem]) -> Result<()> {
        let items = items.to_vec();
        self.engine
            .put(&CacheKey::id(ns::DICT_ITEMS, dict.id), &items)
            .await?;
        self.engine
            .put(&CacheKey::code(ns::DICT_ITEMS, &dict.dict_code), &items)
            .await
    }

    // == Eviction ==
    /// Evicts the dict and its item lists under both id and code.
    ///
    /// The code is taken from L1 when present, otherwise from the source.
    /// If neither knows it, only the id-keyed entries are evicted.
    pub async fn evict_dict(&self, id: i64) -> Result<()> {
        let id_key = CacheKey::id(ns::DICT, id);
        let code = match self.engine.peek::<Dict>(&id_key).await {
            Some(dict) => Some(dict.dict_code),
            None => match self.source.dict_by_id(id).await {
                Ok(found) => found.map(|d| d.dict_code),
                Err(e) => {
                    warn!(dict_id = id, error = %e, "could not resolve dict code, evicting by id only");
                    None
                }
            },
        };

        self.engine.evict_cascade(&DictCascade, &id_key).await?;
        if let Some(code) = code {
            self.engine
                .evict_cascade(&DictCascade, &CacheKey::code(ns::DICT, code))
                .await?;
        }
        debug!(dict_id = id, "dict evicted");
        Ok(())
    }

    /// Evicts the dict and its item lists under both code and id.
    pub async fn evict_dict_by_code(&self, code: &str) -> Result<()> {
        let code_key = CacheKey::code(ns::DICT, code);
        let id = match self.engine.peek::<Dict>(&code_key).await {
            Some(dict) => Some(dict.id),
            None => match self.source.dict_by_code(code).await {
                Ok(found) => found.map(|d| d.id),
                Err(e) => {
                    warn!(dict_code = code, error = %e, "could not resolve dict id, evicting by code only");
                    None
                }
            },
        };

        self.engine.evict_cascade(&DictCascade, &code_key).await?;
        if let Some(id) = id {
            self.engine
                .evict_cascade(&DictCascade, &CacheKey::id(ns::DICT, id))
                .await?;
        }
        debug!(dict_code = code, "dict evicted");
        Ok(())
    }

    pub async fn evict_item(&self, item_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::DICT_ITEM, item_id))
            .await
    }

    /// Evicts both item lists of a dict, leaving the dict itself cached.
    pub async fn evict_items(&self, dict: &Dict) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::DICT_ITEMS, dict.id))
            .await?;
        self.engine
            .evict(&CacheKey::code(ns::DICT_ITEMS, &dict.dict_code))
            .await
    }

    pub async fn evict_all(&self) -> Result<()> {
        self.engine.evict_all(Domain::Dict.namespaces()).await
    }

    // == Refresh ==
    /// Evicts the dict behind `code` and reloads it with its items.
    pub async fn refresh_by_code(&self, code: &str) -> Result<Option<Dict>> {
        self.evict_dict_by_code(code).await?;
        let dict = self.get_by_code(code).await?;
        if dict.is_some() {
            self.get_items_by_dict_code(code).await?;
        }
        Ok(dict)
    }

    /// Evicts every dict updated at or after `since`; returns how many.
    pub async fn refresh_changed_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let dicts = self.source.list_dicts().await?;
        let mut evicted = 0;
        for dict in dicts.iter().filter(|d| changed_since(d.updated_at, since)) {
            self.evict_dict(dict.id).await?;
            evicted += 1;
        }
        Ok(evicted)
    }

    // == Warm-Up ==
    /// Caches every dict and both of its item lists.
    pub async fn warm_up(&self, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if !Domain::Dict.is_enabled(&self.engine) {
            return Ok(WarmUpReport::skipped(Domain::Dict.as_str()));
        }
        let dicts = self.source.list_dicts().await?;
        let this = self.clone();
        let report = scheduler
            .run(Domain::Dict.as_str(), dicts, move |dict: Dict| {
                let this = this.clone();
                async move {
                    this.cache_dict(&dict).await?;
                    let items = this.source.items_by_dict_id(dict.id).await?;
                    this.cache_items(&dict, &items).await
                }
            })
            .await;
        Ok(report)
    }
}
