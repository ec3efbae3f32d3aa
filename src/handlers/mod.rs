pub mod geocode;
pub mod middleware;
pub mod news;
pub mod social;
