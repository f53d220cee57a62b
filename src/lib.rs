pub mod config;
pub mod guardrail;
pub mod http;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod request_log;
pub mod service;
