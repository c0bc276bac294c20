//! Builds operation descriptors from typed requests.
//!
//! Validation, field resolution and value encoding all happen here,
//! synchronously and before any store call. The provider executes the
//! resulting operations directly; batch builders queue them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hmap_common::{
    CommandFlags, CommandKind, HashCommands, MapperError, MapperResult, SetCondition, WireScalar,
};

use crate::codec::{self, FieldValue, WriterContext};
use crate::config::MapperConfig;
use crate::descriptor::{DescriptorCache, HashModel};
use crate::operation::{
    flag_decoder, integer_decoder, map_reply, model_decoder, raw_decoder, Operation,
    PendingAction, RawReply,
};

fn require(value: &str, what: &str) -> MapperResult<()> {
    if value.is_empty() {
        return Err(MapperError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Whole seconds of `ttl`, rounded up.
fn ttl_seconds(ttl: Duration) -> i64 {
    let seconds = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub(crate) struct Planner {
    config: Arc<MapperConfig>,
    descriptors: Arc<DescriptorCache>,
    flags: CommandFlags,
}

impl Planner {
    pub(crate) fn new(config: Arc<MapperConfig>, flags: CommandFlags) -> Self {
        let descriptors = Arc::new(DescriptorCache::new(Arc::clone(&config.field_formatter)));
        Planner {
            config,
            descriptors,
            flags,
        }
    }

    pub(crate) fn config(&self) -> &Arc<MapperConfig> {
        &self.config
    }

    pub(crate) fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    pub(crate) fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: CommandFlags) {
        self.flags = flags;
    }

    /// Reads the requested fields of `M` (all fields when `fields` is empty).
    pub(crate) fn get<M: HashModel, F: AsRef<str>>(
        &self,
        key: &str,
        fields: &[F],
    ) -> MapperResult<Operation<M>> {
        require(key, "key")?;
        let resolved = self.descriptors.resolve::<M, F>(fields)?;
        let wire = resolved.wire_names();
        let (kind, action) = self.read_action(key, &wire);
        let decoder = model_decoder(kind, resolved, Arc::clone(&self.config));
        Ok(Operation::new(key.to_string(), kind, wire, Vec::new(), action, decoder))
    }

    /// Reads named fields without a model.
    pub(crate) fn get_fields<F: AsRef<str>>(
        &self,
        key: &str,
        fields: &[F],
    ) -> MapperResult<Operation<HashMap<String, WireScalar>>> {
        require(key, "key")?;
        if fields.is_empty() {
            return Err(MapperError::invalid_argument("field list must not be empty"));
        }
        let mut wire = Vec::with_capacity(fields.len());
        for field in fields {
            require(field.as_ref(), "field name")?;
            wire.push(self.config.wire_name(field.as_ref()));
        }
        let (kind, action) = self.read_action(key, &wire);
        let decoder = raw_decoder(kind, wire.clone());
        Ok(Operation::new(key.to_string(), kind, wire, Vec::new(), action, decoder))
    }

    fn read_action(&self, key: &str, wire: &[String]) -> (CommandKind, PendingAction) {
        let key = key.to_string();
        let flags = self.flags;
        match wire {
            [field] => {
                let field = field.clone();
                let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
                    map_reply(store.hash_get(&key, &field, flags), RawReply::Scalar)
                });
                (CommandKind::Get, action)
            }
            _ => {
                let fields = wire.to_vec();
                let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
                    map_reply(store.hash_get_many(&key, &fields, flags), RawReply::Scalars)
                });
                (CommandKind::MGet, action)
            }
        }
    }

    /// Writes one field; a value encoding to nothing deletes the field.
    pub(crate) fn set<V: FieldValue>(
        &self,
        key: &str,
        field: &str,
        value: &V,
        condition: SetCondition,
    ) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        require(field, "field name")?;
        let scalar = codec::encode(value, &WriterContext::new(&self.config))?;
        if scalar.is_absent_or_empty() {
            return self.delete_field(key, field);
        }
        Ok(self.set_one(key, self.config.wire_name(field), scalar, condition))
    }

    fn set_one(
        &self,
        key: &str,
        field: String,
        value: WireScalar,
        condition: SetCondition,
    ) -> Operation<bool> {
        let action_key = key.to_string();
        let action_field = field.clone();
        let action_value = value.clone();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(
                store.hash_set(
                    &action_key,
                    &action_field,
                    action_value.clone(),
                    condition,
                    flags,
                ),
                RawReply::Flag,
            )
        });
        Operation::new(
            key.to_string(),
            CommandKind::Set,
            vec![field],
            vec![value],
            action,
            flag_decoder(CommandKind::Set),
        )
    }

    /// Writes every encodable field of `model`.
    pub(crate) fn set_model<M: HashModel>(
        &self,
        key: &str,
        model: &M,
    ) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        let descriptor = self.descriptors.descriptor::<M>()?;
        let ctx = WriterContext::new(&self.config);
        let mut entries = Vec::with_capacity(descriptor.fields().len());
        for field in descriptor.fields() {
            let scalar = field.encode(model, &ctx)?;
            if !scalar.is_absent() {
                entries.push((field.wire_name().to_string(), scalar));
            }
        }
        self.set_entries(key, entries)
    }

    /// Writes a map of logical field names to values.
    pub(crate) fn set_fields<K, V, I>(&self, key: &str, values: I) -> MapperResult<Operation<bool>>
    where
        K: AsRef<str>,
        V: FieldValue,
        I: IntoIterator<Item = (K, V)>,
    {
        require(key, "key")?;
        let ctx = WriterContext::new(&self.config);
        let mut entries = Vec::new();
        for (field, value) in values {
            require(field.as_ref(), "field name")?;
            let scalar = codec::encode(&value, &ctx)?;
            if !scalar.is_absent() {
                entries.push((self.config.wire_name(field.as_ref()), scalar));
            }
        }
        self.set_entries(key, entries)
    }

    fn set_entries(
        &self,
        key: &str,
        mut entries: Vec<(String, WireScalar)>,
    ) -> MapperResult<Operation<bool>> {
        if entries.len() == 1 {
            if let Some((field, value)) = entries.pop() {
                return Ok(self.set_one(key, field, value, SetCondition::Always));
            }
        }
        if entries.is_empty() {
            return Err(MapperError::EmptyMapping {
                key: key.to_string(),
            });
        }

        let (fields, values): (Vec<_>, Vec<_>) = entries.iter().cloned().unzip();
        let action_key = key.to_string();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(store.hash_set_many(&action_key, &entries, flags), |()| {
                RawReply::Unit
            })
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::MSet,
            fields,
            values,
            action,
            flag_decoder(CommandKind::MSet),
        ))
    }

    pub(crate) fn delete(&self, key: &str) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        let action_key = key.to_string();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(store.key_delete(&action_key, flags), RawReply::Flag)
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::DelKey,
            Vec::new(),
            Vec::new(),
            action,
            flag_decoder(CommandKind::DelKey),
        ))
    }

    pub(crate) fn delete_field(&self, key: &str, field: &str) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        require(field, "field name")?;
        let wire = self.config.wire_name(field);
        let action_key = key.to_string();
        let action_field = wire.clone();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(
                store.hash_delete(&action_key, &action_field, flags),
                RawReply::Flag,
            )
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::DelField,
            vec![wire],
            Vec::new(),
            action,
            flag_decoder(CommandKind::DelField),
        ))
    }

    pub(crate) fn increment(&self, key: &str, by: i64) -> MapperResult<Operation<i64>> {
        require(key, "key")?;
        let action_key = key.to_string();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(
                store.string_increment(&action_key, by, flags),
                RawReply::Integer,
            )
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::Incr,
            Vec::new(),
            vec![WireScalar::Integer(by)],
            action,
            integer_decoder(CommandKind::Incr),
        ))
    }

    pub(crate) fn increment_field(
        &self,
        key: &str,
        field: &str,
        by: i64,
    ) -> MapperResult<Operation<i64>> {
        require(key, "key")?;
        require(field, "field name")?;
        let wire = self.config.wire_name(field);
        let action_key = key.to_string();
        let action_field = wire.clone();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(
                store.hash_increment(&action_key, &action_field, by, flags),
                RawReply::Integer,
            )
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::HIncr,
            vec![wire],
            vec![WireScalar::Integer(by)],
            action,
            integer_decoder(CommandKind::HIncr),
        ))
    }

    pub(crate) fn decrement(&self, key: &str, by: i64) -> MapperResult<Operation<i64>> {
        self.increment(key, negate(by)?)
    }

    pub(crate) fn decrement_field(
        &self,
        key: &str,
        field: &str,
        by: i64,
    ) -> MapperResult<Operation<i64>> {
        self.increment_field(key, field, negate(by)?)
    }

    pub(crate) fn expire(&self, key: &str, ttl: Duration) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        let action_key = key.to_string();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(store.key_expire(&action_key, ttl, flags), RawReply::Flag)
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::Expire,
            Vec::new(),
            vec![WireScalar::Integer(ttl_seconds(ttl))],
            action,
            flag_decoder(CommandKind::Expire),
        ))
    }

    pub(crate) fn exists(&self, key: &str) -> MapperResult<Operation<bool>> {
        require(key, "key")?;
        let action_key = key.to_string();
        let flags = self.flags;
        let action: PendingAction = Box::new(move |store: &dyn HashCommands| {
            map_reply(store.key_exists(&action_key, flags), RawReply::Flag)
        });
        Ok(Operation::new(
            key.to_string(),
            CommandKind::Exists,
            Vec::new(),
            Vec::new(),
            action,
            flag_decoder(CommandKind::Exists),
        ))
    }
}

fn negate(by: i64) -> MapperResult<i64> {
    by.checked_neg()
        .ok_or_else(|| MapperError::invalid_argument(format!("cannot negate delta {by}")))
}
