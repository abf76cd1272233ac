// elfwatch/src/lib.rs
//
// Workshop risk dashboard: loads elf behavior, communication and schedule
// tables, scores each elf, rolls the scores up into a workshop status, and
// serves the results over a small HTTP API.

pub mod config;
pub mod engine;
pub mod http_api;
pub mod insight;
pub mod loader;
pub mod metrics;
pub mod records;
pub mod summary;

pub use config::{ReloadPolicy, Settings};
pub use http_api::{AppState, DashboardServer};
pub use insight::{InsightError, InsightProvider, OpenAiInsight};
pub use loader::{LoadError, TableSource, Tables};
