//! Tiered settings service (§4.3): process defaults, per-user, per-profile,
//! deep-merged on load, persisted atomically as JSON documents on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use revaer_core::SessionContext;
use revaer_events::{Event, EventBus};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{self, Tier};

const RD_PREFIX: &str = "rd_";
const RD_SHARING_KEY: &str = "rd_sharing_mode";
const RD_SHARED: &str = "shared";
const DOWNLOAD_FOLDER_KEY: &str = "download_folder";

/// Deep-merge `loaded` on top of `base`: objects merge key-by-key
/// recursively, everything else (including arrays) is replaced wholesale by
/// `loaded` when present.
fn deep_merge(base: &Value, loaded: &Value) -> Value {
    match (base, loaded) {
        (Value::Object(base_map), Value::Object(loaded_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in loaded_map {
                let next = merged
                    .get(key)
                    .map_or_else(|| value.clone(), |existing| deep_merge(existing, value));
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, loaded_value) => loaded_value.clone(),
    }
}

/// Merge a required baseline string list into whatever the document
/// currently holds for `key`, preserving user customizations and appending
/// any missing required entries (order-preserving, de-duplicated).
fn merge_required_list(doc: &mut Map<String, Value>, key: &str, required: &[&str]) {
    let mut merged: Vec<String> = doc
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    for item in required {
        if !merged.iter().any(|existing| existing == item) {
            merged.push((*item).to_string());
        }
    }
    doc.insert(key.to_string(), Value::Array(merged.into_iter().map(Value::from).collect()));
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return Path::new(&home).join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

fn normalize_download_folder(doc: &mut Map<String, Value>) {
    let current = doc
        .get(DOWNLOAD_FOLDER_KEY)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let trimmed = current.trim();
    let normalized = if trimmed.is_empty() {
        model::default_document()
            .get(DOWNLOAD_FOLDER_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        expand_home(trimmed)
    };
    doc.insert(DOWNLOAD_FOLDER_KEY.to_string(), Value::from(normalized));
}

/// Apply every required-behaviour normalization to a loaded tier document:
/// deep-merge against defaults, required-list augmentation, download-folder
/// expansion.
fn normalize_document(loaded: &Value) -> Value {
    let merged = deep_merge(&model::default_document(), loaded);
    let Value::Object(mut doc) = merged else {
        return merged;
    };
    for (key, required) in model::REQUIRED_URL_LISTS {
        merge_required_list(&mut doc, key, required);
    }
    normalize_download_folder(&mut doc);
    Value::Object(doc)
}

fn tier_path(root: &Path, tier: Tier, scope_id: Option<&str>) -> PathBuf {
    match scope_id {
        Some(id) => root.join(format!("{}.{id}.json", tier.file_stem())),
        None => root.join(format!("{}.json", tier.file_stem())),
    }
}

/// Tiered, scope-aware settings provider. Reads/writes route through the
/// ambient [`SessionContext`] (ambient ``profile_id``/``user_id``) captured
/// at call time; callers running inside `revaer_core::session::scope` get
/// profile/user-scoped documents automatically.
pub struct SettingsService {
    root: PathBuf,
    events: EventBus,
    cache: Mutex<HashMap<PathBuf, Value>>,
}

impl SettingsService {
    /// Construct a service rooted at `root` (created if missing).
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if `root` cannot be created.
    pub fn new(root: impl Into<PathBuf>, events: EventBus) -> ConfigResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| ConfigError::Io {
            operation: "create_settings_root",
            source,
        })?;
        Ok(Self {
            root,
            events,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn load_tier(&self, tier: Tier, scope_id: Option<&str>) -> ConfigResult<Value> {
        let path = tier_path(&self.root, tier, scope_id);
        if let Some(cached) = self.lock_cache().get(&path) {
            return Ok(cached.clone());
        }
        let raw = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| ConfigError::Io {
                operation: "read_tier",
                source,
            })?;
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        let base = if matches!(tier, Tier::Process) {
            model::default_document()
        } else {
            Value::Object(Map::new())
        };
        let normalized = if matches!(tier, Tier::User) {
            // user tier only ever holds sparse rd_* overrides; never
            // required-list-normalized or merged against process defaults.
            deep_merge(&Value::Object(Map::new()), &raw)
        } else {
            normalize_document(&deep_merge(&base, &raw))
        };
        self.lock_cache().insert(path, normalized.clone());
        Ok(normalized)
    }

    fn save_tier(&self, tier: Tier, scope_id: Option<&str>, doc: Value) -> ConfigResult<()> {
        let path = tier_path(&self.root, tier, scope_id);
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|source| ConfigError::Serde { source })?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|source| ConfigError::Io {
            operation: "write_tier_tmp",
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| ConfigError::Io {
            operation: "rename_tier_tmp",
            source,
        })?;
        self.lock_cache().insert(path, doc);
        Ok(())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Value>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("settings cache mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    /// The document governing the current ambient context: per-profile when
    /// a profile is set, otherwise process defaults.
    fn active_document(&self, ctx: &SessionContext) -> ConfigResult<Value> {
        if let Some(profile_id) = &ctx.profile_id {
            self.load_tier(Tier::Profile, Some(profile_id))
        } else {
            self.load_tier(Tier::Process, None)
        }
    }

    fn rd_sharing_active(&self, ctx: &SessionContext, doc: &Value) -> bool {
        ctx.user_id.is_some()
            && doc.get(RD_SHARING_KEY).and_then(Value::as_str) == Some(RD_SHARED)
    }

    /// Read a single key, honouring `rd_` sharing routing and
    /// `download_folder` normalization (§4.3 (b)/(c)).
    ///
    /// # Errors
    /// Returns [`ConfigError`] on IO/serialization failure.
    pub fn get(&self, ctx: &SessionContext, key: &str) -> ConfigResult<Value> {
        let scoped = self.active_document(ctx)?;
        if key.starts_with(RD_PREFIX) && self.rd_sharing_active(ctx, &scoped) {
            if let Some(user_id) = ctx.user_id {
                let user_doc = self.load_tier(Tier::User, Some(&user_id.to_string()))?;
                if let Some(value) = user_doc.get(key) {
                    return Ok(value.clone());
                }
            }
        }
        Ok(scoped.get(key).cloned().unwrap_or(Value::Null))
    }

    /// Write a single key; persists atomically and emits
    /// [`Event::SettingsChanged`].
    ///
    /// # Errors
    /// Returns [`ConfigError`] on IO/serialization failure.
    pub fn set(&self, ctx: &SessionContext, key: &str, value: Value) -> ConfigResult<()> {
        let mut updates = Map::new();
        updates.insert(key.to_string(), value);
        self.update(ctx, updates)
    }

    /// Write multiple keys in one atomic persistence pass; splits `rd_*`
    /// keys into per-user storage when sharing mode is `shared` (§4.3 (b)).
    ///
    /// # Errors
    /// Returns [`ConfigError`] on IO/serialization failure.
    pub fn update(&self, ctx: &SessionContext, updates: Map<String, Value>) -> ConfigResult<()> {
        let mut scoped = self.active_document(ctx)?;
        let Value::Object(ref mut scoped_map) = scoped else {
            return Err(ConfigError::InvalidValue {
                field: "<document>".to_string(),
                reason: "settings document root must be an object",
            });
        };

        let sharing = self.rd_sharing_active(ctx, &Value::Object(scoped_map.clone()));
        let mut user_updates = Map::new();
        for (key, mut value) in updates {
            if key == DOWNLOAD_FOLDER_KEY {
                if let Some(text) = value.as_str() {
                    value = Value::from(expand_home(text));
                }
            }
            if sharing && key.starts_with(RD_PREFIX) {
                user_updates.insert(key, value);
            } else {
                scoped_map.insert(key, value);
            }
        }

        for (key, required) in model::REQUIRED_URL_LISTS {
            merge_required_list(scoped_map, key, required);
        }
        normalize_download_folder(scoped_map);

        if let Some(profile_id) = &ctx.profile_id {
            self.save_tier(Tier::Profile, Some(profile_id), Value::Object(scoped_map.clone()))?;
        } else {
            self.save_tier(Tier::Process, None, Value::Object(scoped_map.clone()))?;
        }

        if !user_updates.is_empty() {
            if let Some(user_id) = ctx.user_id {
                let mut user_doc = self.load_tier(Tier::User, Some(&user_id.to_string()))?;
                let Value::Object(ref mut user_map) = user_doc else {
                    unreachable!("user tier is always an object")
                };
                user_map.extend(user_updates);
                self.save_tier(Tier::User, Some(&user_id.to_string()), user_doc.clone())?;
            }
        }

        self.events.publish(Event::SettingsChanged { key: scope_label(ctx) });
        Ok(())
    }

    /// Return the full effective document for the current scope, merging in
    /// any shared `rd_*` overrides from the user tier.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on IO/serialization failure.
    pub fn get_all(&self, ctx: &SessionContext) -> ConfigResult<Value> {
        let scoped = self.active_document(ctx)?;
        if self.rd_sharing_active(ctx, &scoped) {
            if let Some(user_id) = ctx.user_id {
                let user_doc = self.load_tier(Tier::User, Some(&user_id.to_string()))?;
                return Ok(deep_merge(&scoped, &user_doc));
            }
        }
        Ok(scoped)
    }

    /// Reset the current scope's document back to process defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on IO/serialization failure.
    pub fn reset(&self, ctx: &SessionContext) -> ConfigResult<()> {
        let defaults = normalize_document(&model::default_document());
        if let Some(profile_id) = &ctx.profile_id {
            self.save_tier(Tier::Profile, Some(profile_id), defaults)?;
        } else {
            self.save_tier(Tier::Process, None, defaults)?;
        }
        self.events.publish(Event::SettingsChanged { key: scope_label(ctx) });
        Ok(())
    }

    /// Force-reload every cached tier from disk on the next access,
    /// discarding any in-memory copies. Used after an external process
    /// edits a settings file directly.
    pub fn invalidate_all(&self) {
        self.lock_cache().clear();
    }
}

fn scope_label(ctx: &SessionContext) -> String {
    ctx.profile_id
        .clone()
        .unwrap_or_else(|| "process".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use revaer_core::SessionContext;

    fn service() -> (tempfile::TempDir, SettingsService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = SettingsService::new(dir.path(), EventBus::new()).expect("service");
        (dir, service)
    }

    #[test]
    fn process_tier_defaults_are_available_without_a_profile() {
        let (_dir, service) = service();
        let ctx = SessionContext::default();
        let value = service.get(&ctx, "max_concurrent_downloads").expect("get");
        assert_eq!(value, Value::from(3));
    }

    #[test]
    fn set_persists_and_reads_back() {
        let (_dir, service) = service();
        let ctx = SessionContext::default();
        service.set(&ctx, "min_seeds", Value::from(5)).expect("set");
        assert_eq!(service.get(&ctx, "min_seeds").expect("get"), Value::from(5));
    }

    #[test]
    fn required_url_lists_survive_a_user_customization() {
        let (_dir, service) = service();
        let ctx = SessionContext::default();
        let mut updates = Map::new();
        updates.insert(
            "od_seed_urls".to_string(),
            Value::Array(vec![Value::from("https://custom.example/seed/")]),
        );
        service.update(&ctx, updates).expect("update");
        let value = service.get(&ctx, "od_seed_urls").expect("get");
        let arr = value.as_array().expect("array");
        assert!(arr.iter().any(|v| v.as_str() == Some("https://custom.example/seed/")));
        assert!(arr
            .iter()
            .any(|v| v.as_str() == Some("http://suhr.ir/plugin/")));
    }

    #[test]
    fn download_folder_expands_home_tilde() {
        let (_dir, service) = service();
        std::env::set_var("HOME", "/home/tester");
        let ctx = SessionContext::default();
        service
            .set(&ctx, "download_folder", Value::from("~/Downloads"))
            .expect("set");
        assert_eq!(
            service.get(&ctx, "download_folder").expect("get"),
            Value::from("/home/tester/Downloads")
        );
    }

    #[test]
    fn rd_keys_route_to_user_tier_when_sharing_is_shared() {
        let (_dir, service) = service();
        let profile_ctx = SessionContext {
            profile_id: Some("p1".to_string()),
            user_id: Some(42),
            ..SessionContext::default()
        };
        service
            .set(&profile_ctx, "rd_sharing_mode", Value::from("shared"))
            .expect("set sharing mode");
        service
            .set(&profile_ctx, "rd_access_token", Value::from("tok-1"))
            .expect("set token");
        assert_eq!(
            service.get(&profile_ctx, "rd_access_token").expect("get"),
            Value::from("tok-1")
        );
        let user_doc = service
            .load_tier(Tier::User, Some("42"))
            .expect("load user tier");
        assert_eq!(user_doc.get("rd_access_token"), Some(&Value::from("tok-1")));
    }

    #[test]
    fn reset_restores_defaults() {
        let (_dir, service) = service();
        let ctx = SessionContext::default();
        service.set(&ctx, "min_seeds", Value::from(99)).expect("set");
        service.reset(&ctx).expect("reset");
        assert_eq!(service.get(&ctx, "min_seeds").expect("get"), Value::from(0));
    }
}
