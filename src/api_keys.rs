use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::{json, Value};

use crate::api::*;

/// The backend surface of the API key vault: the `get_api_keys*` and
/// `log_api_key_action` procedures plus plain writes on the key table.
#[async_trait]
pub trait KeyStore {
    async fn get_api_keys(&self) -> Result<Vec<ApiKeyRecord>>;
    async fn get_api_keys_by_category(&self, category: KeyCategory) -> Result<Vec<ApiKeyRecord>>;
    async fn get_api_keys_by_provider(&self, provider: &str) -> Result<Vec<ApiKeyRecord>>;
    async fn log_api_key_action(&self, entry: NewAuditEntry) -> Result<()>;
    async fn insert_api_key(&self, key: NewApiKey) -> Result<RowId>;
    async fn update_api_key(&self, id: RowId, update: ApiKeyUpdate) -> Result<()>;
    async fn delete_api_key(&self, id: RowId) -> Result<()>;
}

pub fn filter_keys<'a>(
    keys: &'a [ApiKeyRecord],
    search_term: &str,
    category: Option<KeyCategory>,
) -> Vec<&'a ApiKeyRecord> {
    let term = search_term.trim().to_lowercase();
    keys.iter()
        .filter(|key| term.is_empty() || key_matches(key, &term))
        .filter(|key| category.map_or(true, |category| key.category == category))
        .collect()
}
fn key_matches(key: &ApiKeyRecord, term: &str) -> bool {
    key.name.to_lowercase().contains(term)
        || key
            .description
            .as_ref()
            .map_or(false, |description| description.to_lowercase().contains(term))
        || key.category.as_str().contains(term)
}

/// Categories present in `keys`, sorted by name.
pub fn distinct_categories(keys: &[ApiKeyRecord]) -> Vec<KeyCategory> {
    let mut categories: Vec<_> = keys.iter().map(|key| key.category).collect();
    categories.sort_by_key(|category| category.as_str());
    categories.dedup();
    categories
}

/// Audit payload of an update. A rotated secret is never written to the log.
fn update_changes(update: &ApiKeyUpdate) -> Value {
    let mut changes = serde_json::to_value(update).unwrap_or(Value::Null);
    if let Some(value) = changes.get_mut("key_value") {
        *value = json!(ROTATED);
    }
    changes
}
const ROTATED: &str = "<rotated>";

/// Locally held copy of the key vault with the search and category
/// selection applied on top of it.
///
/// Writes go straight to the store and are not reflected locally until the
/// next [`ApiKeyRegistry::refresh`]. Failed writes are logged and reported
/// as `false`.
pub struct ApiKeyRegistry<S> {
    store: S,
    keys: Vec<ApiKeyRecord>,
    search_term: String,
    selected_category: Option<KeyCategory>,
}
impl<S> ApiKeyRegistry<S>
where
    S: KeyStore + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            keys: vec![],
            search_term: String::new(),
            selected_category: None,
        }
    }
    pub fn keys(&self) -> &[ApiKeyRecord] {
        &self.keys
    }
    pub async fn refresh(&mut self) -> Result<()> {
        self.keys = self.store.get_api_keys().await?;
        debug!("Loaded {} API keys", self.keys.len());
        Ok(())
    }
    pub async fn refresh_by_category(&mut self, category: KeyCategory) -> Result<()> {
        self.keys = self.store.get_api_keys_by_category(category).await?;
        Ok(())
    }
    pub async fn refresh_by_provider(&mut self, provider: &str) -> Result<()> {
        self.keys = self.store.get_api_keys_by_provider(provider).await?;
        Ok(())
    }
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }
    pub fn select_category(&mut self, category: Option<KeyCategory>) {
        self.selected_category = category;
    }
    pub fn filtered_keys(&self) -> Vec<&ApiKeyRecord> {
        filter_keys(&self.keys, &self.search_term, self.selected_category)
    }
    pub fn categories(&self) -> Vec<KeyCategory> {
        distinct_categories(&self.keys)
    }
    pub async fn create(&self, key: NewApiKey) -> bool {
        let name = key.name.clone();
        match self.store.insert_api_key(key).await {
            Ok(id) => {
                debug!("Created API key {} ({})", id, name);
                true
            }
            Err(e) => {
                error!("Error creating API key {}: {:#}", name, e);
                false
            }
        }
    }
    pub async fn update(&self, id: RowId, update: ApiKeyUpdate) -> bool {
        self.audit(id, AuditAction::Update, update_changes(&update))
            .await;
        match self.store.update_api_key(id, update).await {
            Ok(()) => {
                debug!("Updated API key {}", id);
                true
            }
            Err(e) => {
                error!("Error updating API key {}: {:#}", id, e);
                false
            }
        }
    }
    pub async fn delete(&self, id: RowId) -> bool {
        let changes = match self.keys.iter().find(|key| key.id == id) {
            Some(key) => json!({ "name": key.name, "category": key.category }),
            None => Value::Null,
        };
        self.audit(id, AuditAction::Delete, changes).await;
        match self.store.delete_api_key(id).await {
            Ok(()) => {
                debug!("Deleted API key {}", id);
                true
            }
            Err(e) => {
                error!("Error deleting API key {}: {:#}", id, e);
                false
            }
        }
    }
    // A failed audit write does not block the mutation that follows it.
    async fn audit(&self, key_id: RowId, action: AuditAction, changes: Value) {
        let entry = NewAuditEntry {
            key_id,
            action,
            changes,
        };
        if let Err(e) = self.store.log_api_key_action(entry).await {
            warn!("Couldn't log {} for API key {}: {:#}", action, key_id, e);
        }
    }
}
