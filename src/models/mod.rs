pub mod cache;
pub mod error;
pub mod geocode;
pub mod news;
pub mod social;
pub mod stream;
