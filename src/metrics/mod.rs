//! Training telemetry loggers.

pub mod logger;
