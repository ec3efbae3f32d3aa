#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub twitter_bearer_token: Option<String>,
    pub database_url: Option<String>,
    pub nominatim_url: String,
    pub photon_url: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn init() -> Self {
        Config {
            openai_api_key: optional("OPENAI_API_KEY"),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: optional("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            twitter_bearer_token: optional("TWITTER_BEARER_TOKEN"),
            database_url: optional("DATABASE_URL"),
            nominatim_url: optional("NOMINATIM_URL")
                .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string()),
            photon_url: optional("PHOTON_URL")
                .unwrap_or_else(|| "https://photon.komoot.io".to_string()),
            host: optional("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: optional("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

// Unset and blank variables are treated the same.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
