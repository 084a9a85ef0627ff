//! Pagecast - scheduled multi-platform publishing
//!
//! This library provides the core of Pagecast: encrypted account tokens,
//! platform adapters, immediate and scheduled publishing with exactly-once
//! promotion, per-account retry and analytics collection.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod rate_limiter;
pub mod scheduling;
pub mod service;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{PagecastError, PlatformError, Result};
pub use service::PagecastService;
pub use types::{
    AnalyticsSnapshot, ContentStatus, GeneratedContent, Platform, PostAnalytics, PublishOutcome,
    PublishResult, PublishSummary, ScheduleState, ScheduledPost, SocialAccount,
};
