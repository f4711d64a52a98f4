//! Shared test utilities for service and store integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use levelup::metrics::{MetricsEvent, UserMetrics};
use levelup::service::GamificationService;
use levelup::store::{MemoryStore, SqliteStore};

/// 2024-06-`day` at `hour`:00 UTC
pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub fn memory_service() -> GamificationService {
    GamificationService::with_builtin_catalog(Arc::new(MemoryStore::new()))
}

/// Service over a database file inside `dir`
pub fn sqlite_service(dir: &Path) -> GamificationService {
    let store = SqliteStore::open(&dir.join("levelup.db")).expect("Failed to open sqlite store");
    GamificationService::with_builtin_catalog(Arc::new(store))
}

pub fn event(kind: &str, data: Value) -> MetricsEvent {
    MetricsEvent::new(kind, data)
}

/// Fresh metrics with a few counters set
pub fn metrics(messages: u64, agents: &[&str]) -> UserMetrics {
    let mut m = UserMetrics::new("u1", ts(1, 12));
    m.total_messages = messages;
    for agent in agents {
        m.agents_used.insert(agent.to_string());
    }
    m
}
