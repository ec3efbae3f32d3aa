pub mod cache_store;
pub mod discovery;
pub mod llm;
pub mod location_resolver;
pub mod query_normalizer;
pub mod social_fetcher;
pub mod stream_relay;
