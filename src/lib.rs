//! levelup - Gamification & Progression Engine
//!
//! levelup turns a stream of user activity events into progression state:
//! achievements unlocked from a declarative catalog, per-tool mastery levels,
//! an append-only points ledger and ranked leaderboards with tiers.
//!
//! ## Layers
//!
//! 1. **Engines** (`metrics`, `achievements`, `mastery`, `ledger`,
//!    `leaderboard`, `profile`): pure functions over explicit inputs.
//!
//! 2. **Service** (`service`): folds events through the engines against a
//!    `store::GamificationStore`, one writer per user.
//!
//! 3. **HTTP API** (`server`): JSON routes over the service.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use levelup::metrics::day_bucket;
//!
//! let ts = Utc.with_ymd_and_hms(2024, 6, 3, 23, 59, 0).unwrap();
//! assert_eq!(day_bucket(ts), "2024-06-03");
//! ```

pub mod achievements;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod ledger;
pub mod mastery;
pub mod metrics;
pub mod profile;
pub mod server;
pub mod service;
pub mod store;

pub use error::{GamificationError, Result};
