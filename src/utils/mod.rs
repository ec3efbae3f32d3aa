pub mod config;
pub mod rate_limiter;
pub mod state;
