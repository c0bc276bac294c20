//! # Console Sample
//!
//! Purpose: Walk through the mapper end to end against the in-memory engine:
//! single writes and reads, a write batch, and a read batch.
//!
//! ## Usage
//!
//! ```text
//! RUST_LOG=debug cargo run -p hmap-mapper --bin console_sample [user_count]
//! ```
//!
//! `RUST_LOG=debug` prints every executed command.

use std::env;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hmap_engine::MemoryStore;
use hmap_mapper::{hash_model, impl_wire_enum, CacheKey, CacheProvider, Json, SetCondition};

const DEFAULT_USER_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Plan {
    #[default]
    Free,
    Pro,
}

impl_wire_enum!(Plan { Free = 0, Pro = 1 });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Address {
    city: String,
    postal_code: Option<String>,
}

#[derive(Debug, Default)]
struct User {
    name: String,
    age: i32,
    plan: Plan,
    joined_at: Option<DateTime<Utc>>,
    tags: Vec<String>,
    address: Json<Address>,
}

hash_model!(User {
    name,
    age,
    plan,
    joined_at,
    tags,
    address
});

fn parse_count(value: Option<String>) -> u32 {
    value
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_USER_COUNT)
        .max(1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let user_count = parse_count(env::args().nth(1));
    let provider = CacheProvider::new(MemoryStore::new());

    let first = CacheKey::with_prefix("user", 1)?;
    let user = User {
        name: "Arash".into(),
        age: 31,
        plan: Plan::Pro,
        joined_at: Some(Utc::now()),
        tags: vec!["admin".into()],
        address: Json(Address {
            city: "Tehran".into(),
            postal_code: None,
        }),
    };
    provider
        .set_model(&first, &user)
        .await
        .context("writing the first user")?;
    provider
        .set(&first, "bio", &"Rustacean".to_string(), SetCondition::IfMissing)
        .await?;
    provider.expire(&first, Duration::from_secs(300)).await?;

    let entry = provider.get::<User, _>(&first, &["name", "plan", "address"]).await?;
    info!(key = %entry.key, user = ?entry.value, missed = ?entry.missed_fields, "single read");

    let keys = (2..=user_count + 1)
        .map(|id| CacheKey::with_prefix("user", id))
        .collect::<Result<Vec<_>, _>>()?;

    provider
        .batch_writes(|batch| {
            for (idx, key) in keys.iter().enumerate() {
                batch.set(key.as_str(), "name", &format!("user-{idx}"), SetCondition::Always)?;
                batch.increment_field(key.as_str(), "age", 20 + idx as i64)?;
            }
            batch.increment("users:count", keys.len() as i64)
        })
        .await
        .context("batch write")?;

    let entries = provider
        .batch_reads::<User, _>(|batch| {
            batch.get(first.as_str(), &["name", "age"])?;
            for key in &keys {
                batch.get(key.as_str(), &["name", "age", "plan"])?;
            }
            batch.get("user:missing", &["name"])
        })
        .await
        .context("batch read")?;

    for entry in &entries {
        let id = CacheKey::from(entry.key.as_str());
        info!(
            id = id.part("user").unwrap_or("?"),
            user = ?entry.value,
            missed = ?entry.missed_fields,
            "batch read"
        );
    }
    info!(read = entries.len(), requested = keys.len() + 2, "done");
    Ok(())
}
