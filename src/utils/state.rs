use std::sync::Arc;

use crate::services::cache_store::NewsStore;
use crate::services::discovery::DiscoveryEngine;
use crate::services::llm::LanguageModel;
use crate::services::location_resolver::Geocode;
use crate::services::social_fetcher::{PostSearch, SocialEvidenceFetcher};
use crate::utils::rate_limiter::RateLimiter;

pub struct AppState {
    /// Absent when no LLM key is configured.
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub store: Arc<dyn NewsStore>,
    pub geocoder: Arc<dyn Geocode>,
    pub social: Arc<dyn PostSearch>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn discovery_engine(&self) -> Option<DiscoveryEngine> {
        let llm = self.llm.clone()?;
        Some(DiscoveryEngine::new(
            llm,
            self.store.clone(),
            self.geocoder.clone(),
            Arc::new(SocialEvidenceFetcher::new(self.social.clone())),
        ))
    }
}
