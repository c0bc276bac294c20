//! # Cache Provider
//!
//! Purpose: The facade applications use. Single operations run immediately;
//! batches collect operations through a builder closure and run them as one
//! round trip.
//!
//! ## Design Principles
//! 1. **Store Agnostic**: Works with any `HashStore` (in-memory engine, RESP
//!    client, or a test double).
//! 2. **Synchronous Validation**: Keys, field names and mappings are checked
//!    before the store is called.
//! 3. **Flags Pass Through**: The configured `CommandFlags` reach every store
//!    call unchanged.
//!
//! ## Usage
//!
//! ```ignore
//! let provider = CacheProvider::new(MemoryStore::new());
//! provider.set_model("user:1", &user).await?;
//! let entry = provider.get::<User, _>("user:1", &["name", "age"]).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hmap_common::{CommandFlags, HashStore, MapperResult, SetCondition, WireScalar};

use crate::batch::{self, ReadBatch, WriteBatch};
use crate::codec::FieldValue;
use crate::config::MapperConfig;
use crate::descriptor::{DescriptorCache, HashModel};
use crate::entry::CacheEntry;
use crate::planner::Planner;

pub struct CacheProvider<S: HashStore> {
    store: Arc<S>,
    planner: Planner,
}

impl<S: HashStore> CacheProvider<S> {
    /// Creates a provider with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(Arc::new(store), MapperConfig::default().into_shared())
    }

    pub fn with_config(store: Arc<S>, config: Arc<MapperConfig>) -> Self {
        CacheProvider {
            store,
            planner: Planner::new(config, CommandFlags::default()),
        }
    }

    /// Sets the flags passed to every store call.
    pub fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.planner.set_flags(flags);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &Arc<MapperConfig> {
        self.planner.config()
    }

    pub fn flags(&self) -> CommandFlags {
        self.planner.flags()
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        self.planner.descriptors()
    }

    /// Reads `fields` of `M` from `key` (every field when `fields` is empty).
    ///
    /// A key where none of the fields exist yields the null entry.
    pub async fn get<M, F>(&self, key: impl AsRef<str>, fields: &[F]) -> MapperResult<CacheEntry<M>>
    where
        M: HashModel,
        F: AsRef<str>,
    {
        let op = self.planner.get::<M, F>(key.as_ref(), fields)?;
        op.execute(&*self.store).await
    }

    /// Reads named fields as raw scalars.
    pub async fn get_fields<F: AsRef<str>>(
        &self,
        key: impl AsRef<str>,
        fields: &[F],
    ) -> MapperResult<CacheEntry<HashMap<String, WireScalar>>> {
        let op = self.planner.get_fields(key.as_ref(), fields)?;
        op.execute(&*self.store).await
    }

    /// Writes one field. Values that encode to nothing delete the field.
    pub async fn set<V: FieldValue>(
        &self,
        key: impl AsRef<str>,
        field: &str,
        value: &V,
        condition: SetCondition,
    ) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.set(key.as_ref(), field, value, condition)?;
        op.execute(&*self.store).await
    }

    /// Writes every encodable field of `model`.
    pub async fn set_model<M: HashModel>(
        &self,
        key: impl AsRef<str>,
        model: &M,
    ) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.set_model(key.as_ref(), model)?;
        op.execute(&*self.store).await
    }

    /// Writes field name and value pairs of one type, in iteration order.
    pub async fn set_fields<K, V, I>(
        &self,
        key: impl AsRef<str>,
        values: I,
    ) -> MapperResult<CacheEntry<bool>>
    where
        K: AsRef<str>,
        V: FieldValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let op = self.planner.set_fields(key.as_ref(), values)?;
        op.execute(&*self.store).await
    }

    pub async fn delete(&self, key: impl AsRef<str>) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.delete(key.as_ref())?;
        op.execute(&*self.store).await
    }

    pub async fn delete_field(
        &self,
        key: impl AsRef<str>,
        field: &str,
    ) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.delete_field(key.as_ref(), field)?;
        op.execute(&*self.store).await
    }

    pub async fn increment(&self, key: impl AsRef<str>, by: i64) -> MapperResult<CacheEntry<i64>> {
        let op = self.planner.increment(key.as_ref(), by)?;
        op.execute(&*self.store).await
    }

    pub async fn increment_field(
        &self,
        key: impl AsRef<str>,
        field: &str,
        by: i64,
    ) -> MapperResult<CacheEntry<i64>> {
        let op = self.planner.increment_field(key.as_ref(), field, by)?;
        op.execute(&*self.store).await
    }

    pub async fn decrement(&self, key: impl AsRef<str>, by: i64) -> MapperResult<CacheEntry<i64>> {
        let op = self.planner.decrement(key.as_ref(), by)?;
        op.execute(&*self.store).await
    }

    pub async fn decrement_field(
        &self,
        key: impl AsRef<str>,
        field: &str,
        by: i64,
    ) -> MapperResult<CacheEntry<i64>> {
        let op = self.planner.decrement_field(key.as_ref(), field, by)?;
        op.execute(&*self.store).await
    }

    /// Sets a time-to-live on `key`; the entry is false when the key is missing.
    pub async fn expire(&self, key: impl AsRef<str>, ttl: Duration) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.expire(key.as_ref(), ttl)?;
        op.execute(&*self.store).await
    }

    /// Reports whether `key` holds a value.
    pub async fn exists(&self, key: impl AsRef<str>) -> MapperResult<CacheEntry<bool>> {
        let op = self.planner.exists(key.as_ref())?;
        op.execute(&*self.store).await
    }

    /// Runs the writes appended by `build` as one round trip.
    pub async fn batch_writes<B>(&self, build: B) -> MapperResult<()>
    where
        B: FnOnce(&mut WriteBatch<'_>) -> MapperResult<()>,
    {
        batch::run_writes(&*self.store, &self.planner, build).await
    }

    /// Runs the reads appended by `build` as one round trip.
    ///
    /// Entries are returned in append order; keys where no requested field
    /// exists are left out.
    pub async fn batch_reads<M, B>(&self, build: B) -> MapperResult<Vec<CacheEntry<M>>>
    where
        M: HashModel,
        B: FnOnce(&mut ReadBatch<'_, M>) -> MapperResult<()>,
    {
        batch::run_reads(&*self.store, &self.planner, build).await
    }
}

impl<S: HashStore> Clone for CacheProvider<S> {
    fn clone(&self) -> Self {
        CacheProvider {
            store: Arc::clone(&self.store),
            planner: self.planner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmap_common::MapperError;
    use hmap_engine::MemoryStore;

    #[derive(Debug, Default, PartialEq)]
    struct Profile {
        name: String,
        age: i32,
        bio: Option<String>,
    }

    crate::hash_model!(Profile { name, age, bio });

    fn provider() -> CacheProvider<MemoryStore> {
        CacheProvider::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn missing_fields_are_reported() {
        let provider = provider();
        provider
            .set("user:1", "name", &"Arash".to_string(), SetCondition::Always)
            .await
            .unwrap();

        let entry = provider
            .get::<Profile, _>("user:1", &["name", "age"])
            .await
            .unwrap();
        assert_eq!(
            entry.value,
            Some(Profile { name: "Arash".into(), ..Profile::default() })
        );
        assert_eq!(entry.missed_fields, vec!["age".to_string()]);
    }

    #[tokio::test]
    async fn missing_keys_yield_the_null_entry() {
        let entry = provider()
            .get::<Profile, &str>("user:404", &[])
            .await
            .unwrap();
        assert!(entry.is_null());
    }

    #[tokio::test]
    async fn empty_value_deletes_the_field() {
        let provider = provider();
        provider
            .set("user:1", "bio", &"hello".to_string(), SetCondition::Always)
            .await
            .unwrap();
        provider
            .set("user:1", "age", &30, SetCondition::Always)
            .await
            .unwrap();

        let deleted = provider
            .set("user:1", "bio", &String::new(), SetCondition::Always)
            .await
            .unwrap();
        assert_eq!(deleted.value, Some(true));
        assert_eq!(provider.store().hget("user:1", "bio").unwrap(), None);
    }

    #[tokio::test]
    async fn counters_and_expiry() {
        let provider = provider();
        assert_eq!(provider.increment("hits", 5).await.unwrap().value, Some(5));
        assert_eq!(provider.decrement("hits", 2).await.unwrap().value, Some(3));
        assert_eq!(
            provider.increment_field("user:1", "visits", 2).await.unwrap().value,
            Some(2)
        );
        assert_eq!(
            provider.decrement_field("user:1", "visits", 1).await.unwrap().value,
            Some(1)
        );
        assert_eq!(
            provider.expire("hits", Duration::from_secs(60)).await.unwrap().value,
            Some(true)
        );
        assert_eq!(
            provider.expire("nothing", Duration::from_secs(60)).await.unwrap().value,
            Some(false)
        );
        assert_eq!(provider.delete("hits").await.unwrap().value, Some(true));
    }

    #[tokio::test]
    async fn oversized_ttls_fail_without_panicking() {
        let provider = provider();
        provider.increment("hits", 1).await.unwrap();
        for ttl in [Duration::MAX, Duration::from_secs(u64::MAX)] {
            let result = provider.expire("hits", ttl).await;
            assert!(matches!(result, Err(MapperError::Store(_))));
        }
        assert_eq!(provider.exists("hits").await.unwrap().value, Some(true));
    }

    #[tokio::test]
    async fn exists_tracks_the_key_lifecycle() {
        let provider = provider();
        assert_eq!(provider.exists("user:1").await.unwrap().value, Some(false));
        provider
            .set("user:1", "name", &"Arash".to_string(), SetCondition::Always)
            .await
            .unwrap();
        assert_eq!(provider.exists("user:1").await.unwrap().value, Some(true));
        provider.delete("user:1").await.unwrap();
        assert_eq!(provider.exists("user:1").await.unwrap().value, Some(false));
        assert!(matches!(
            provider.exists("").await,
            Err(MapperError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn models_and_maps_round_trip() {
        let provider = provider();
        let profile = Profile {
            name: "Mina".into(),
            age: 28,
            bio: Some("climber".into()),
        };
        provider.set_model("user:2", &profile).await.unwrap();
        let entry = provider.get::<Profile, &str>("user:2", &[]).await.unwrap();
        assert!(entry.is_complete());
        assert_eq!(entry.value, Some(profile));

        let mut scores = HashMap::new();
        scores.insert("math", 90);
        scores.insert("art", 75);
        provider.set_fields("scores:2", scores).await.unwrap();
        let raw = provider
            .get_fields("scores:2", &["math", "art", "music"])
            .await
            .unwrap();
        assert_eq!(raw.missed_fields, vec!["music".to_string()]);
        assert_eq!(
            raw.value.unwrap().get("math"),
            Some(&WireScalar::String("90".into()))
        );
    }

    #[tokio::test]
    async fn fire_and_forget_returns_defaults() {
        let provider = provider().with_flags(CommandFlags::FireAndForget);
        let entry = provider.increment("hits", 5).await.unwrap();
        assert_eq!(entry.value, Some(0));
        assert_eq!(provider.store().incr_by("hits", 0).unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_fields_fail_before_the_store_is_called() {
        let result = provider().get::<Profile, _>("user:1", &["email"]).await;
        assert!(matches!(result, Err(MapperError::InvalidMapping(_))));
    }
}
