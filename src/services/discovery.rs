use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache_store::{event_max_age, NewsStore};
use super::llm::{LanguageModel, ToolCall, ToolRequest, ToolSpec};
use super::location_resolver::Geocode;
use super::query_normalizer::{effective_query, normalize, NormalizedQuery};
use super::social_fetcher::EvidenceSource;
use super::stream_relay::StreamRelay;
use crate::models::news::{Candidate, NewsEvent};

pub const TOOL_NAME: &str = "report_news_event";

#[derive(Debug, Clone)]
pub struct DiscoveryLimits {
    pub max_attempts: u32,
    pub time_budget: Duration,
    pub min_batch: usize,
    pub max_batch: usize,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            time_budget: Duration::from_secs(90),
            min_batch: 5,
            max_batch: 20,
        }
    }
}

impl DiscoveryLimits {
    /// Events to ask for per round: the target less what the cache already
    /// had, kept within `min_batch..=max_batch`.
    pub fn batch_size(&self, target: usize, cached: usize) -> usize {
        target
            .saturating_sub(cached)
            .clamp(self.min_batch, self.max_batch)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    pub cached: usize,
    pub fetched: usize,
    pub attempts: u32,
}

/// Headlines already reported in this run, in discovery order.
#[derive(Default)]
struct KnownHeadlines {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl KnownHeadlines {
    fn contains(&self, headline: &str) -> bool {
        self.seen.contains(headline)
    }

    fn add(&mut self, headline: &str) {
        if self.seen.insert(headline.to_string()) {
            self.ordered.push(headline.to_string());
        }
    }
}

pub struct DiscoveryEngine {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn NewsStore>,
    geocoder: Arc<dyn Geocode>,
    evidence: Arc<dyn EvidenceSource>,
    limits: DiscoveryLimits,
}

impl DiscoveryEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn NewsStore>,
        geocoder: Arc<dyn Geocode>,
        evidence: Arc<dyn EvidenceSource>,
    ) -> Self {
        Self {
            llm,
            store,
            geocoder,
            evidence,
            limits: DiscoveryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DiscoveryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Runs discovery for one client and always finishes with `complete`.
    pub async fn stream(&self, raw_query: &str, mut relay: StreamRelay) -> DiscoveryReport {
        let report = self.run(raw_query, &mut relay).await;
        info!(
            cached = report.cached,
            fetched = report.fetched,
            attempts = report.attempts,
            emitted = relay.sent_news(),
            "Discovery finished"
        );
        relay.complete().await;
        report
    }

    pub async fn run(&self, raw_query: &str, relay: &mut StreamRelay) -> DiscoveryReport {
        let started = Instant::now();
        let query = effective_query(raw_query);
        relay.status(format!("Analyzing \"{query}\"")).await;

        let normalized = normalize(self.llm.as_ref(), raw_query).await;
        let target = normalized.scope.target_count();
        relay
            .status(format!(
                "Looking for {target} {:?} events for \"{}\"",
                normalized.scope, normalized.key
            ))
            .await;

        let mut report = DiscoveryReport::default();
        let mut known = KnownHeadlines::default();
        let mut query_id = None;

        match self.store.lookup(&normalized.key).await {
            Ok(Some(record)) => {
                query_id = Some(record.id);
                report.cached = record.events.len();
                let age = (Utc::now() - record.last_refresh).num_minutes().max(0);
                debug!(
                    key = %record.normalized_key,
                    first_asked_as = %record.original_query,
                    "Reusing cached search"
                );
                relay
                    .status(format!(
                        "Found {} cached events (refreshed {age} min ago)",
                        report.cached
                    ))
                    .await;
                for event in record.events {
                    known.add(&event.headline);
                    relay.news(event).await;
                }
            }
            Ok(None) => relay.status("No recent cached results").await,
            Err(e) => warn!(key = %normalized.key, error = %e, "Cache lookup failed"),
        }

        while report.fetched < target
            && report.attempts < self.limits.max_attempts
            && started.elapsed() < self.limits.time_budget
        {
            if relay.is_closed() {
                debug!("Client gone, stopping discovery");
                break;
            }

            let count = self
                .limits
                .batch_size(target, report.cached);
            let temperature = 0.2 + 0.1 * report.attempts as f32;
            report.attempts += 1;
            relay
                .status(format!(
                    "Searching for {count} more events (round {})",
                    report.attempts
                ))
                .await;

            let request = extraction_request(&query, &normalized, count, &known.ordered, temperature);
            let calls = match self.llm.stream_tool_calls(&request).await {
                Ok(calls) => calls,
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Event extraction unavailable, giving up");
                    relay.error(format!("News search unavailable: {e}")).await;
                    break;
                }
                Err(e) => {
                    warn!(attempt = report.attempts, error = %e, "Event extraction failed");
                    relay.status("News search failed, retrying").await;
                    continue;
                }
            };

            let candidates = parse_candidates(&calls);
            debug!(attempt = report.attempts, count = candidates.len(), "Received candidates");

            let mut new_ids = Vec::new();
            for candidate in candidates {
                if relay.is_closed() {
                    break;
                }
                let Some(event) = self.process_candidate(candidate, &known, relay).await else {
                    continue;
                };
                known.add(&event.headline);
                report.fetched += 1;
                new_ids.push(event.id);
                relay.news(event).await;
            }

            if !new_ids.is_empty() {
                let linked = match query_id {
                    Some(id) => self.store.link_events(id, &new_ids).await.map(|_| id),
                    None => {
                        self.store
                            .upsert_query_for_key(&normalized.key, &query, &new_ids)
                            .await
                    }
                };
                match linked {
                    Ok(id) => query_id = Some(id),
                    Err(e) => warn!(key = %normalized.key, error = %e, "Failed to link events to cache record"),
                }
            }
        }

        relay
            .status(format!(
                "Found {} new events in {} rounds",
                report.fetched, report.attempts
            ))
            .await;
        report
    }

    async fn process_candidate(
        &self,
        candidate: Candidate,
        known: &KnownHeadlines,
        relay: &StreamRelay,
    ) -> Option<NewsEvent> {
        let headline = non_empty(candidate.headline)?;
        let location = non_empty(candidate.location)?;

        if known.contains(&headline) {
            debug!(%headline, "Skipping known headline");
            return None;
        }

        let now = Utc::now();
        let timestamp = match candidate.timestamp.as_deref().and_then(parse_event_time) {
            Some(ts) if ts < now - event_max_age() => {
                debug!(%headline, %ts, "Skipping stale event");
                return None;
            }
            Some(ts) => ts,
            None => now,
        };

        relay.status(format!("Found: {headline}")).await;

        let coordinates = match self.geocoder.resolve(&location).await {
            Ok(Some(resolved)) => resolved.hit.coordinates,
            Ok(None) => {
                debug!(%location, "No coordinates, dropping event");
                return None;
            }
            Err(e) => {
                warn!(%location, error = %e, "Geocoding failed, dropping event");
                return None;
            }
        };

        let top_tweets = match non_empty(candidate.search_query) {
            Some(keywords) => self.evidence.fetch(&keywords, &headline).await,
            None => Vec::new(),
        };

        let event = NewsEvent {
            id: Uuid::new_v4(),
            headline,
            location,
            summary: candidate.summary.unwrap_or_default(),
            category: non_empty(candidate.category).unwrap_or_else(|| "General".to_string()),
            coordinates,
            timestamp,
            top_tweets,
        };

        match self.store.create_event(&event).await {
            Ok(persisted) => Some(persisted.into_event()),
            Err(e) => {
                warn!(headline = %event.headline, error = %e, "Failed to persist event");
                None
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts RFC 3339, naive date-times and bare dates (taken as UTC).
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

pub fn parse_candidates(calls: &[ToolCall]) -> Vec<Candidate> {
    calls
        .iter()
        .filter(|call| call.name.is_empty() || call.name == TOOL_NAME)
        .filter_map(|call| match serde_json::from_str::<Candidate>(&call.arguments) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(error = %e, "Discarding malformed tool arguments");
                None
            }
        })
        .collect()
}

fn report_tool() -> ToolSpec {
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: "Report exactly one real news event. Call once per event.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "headline": { "type": "string", "description": "Concise factual headline" },
                "location": { "type": "string", "description": "Most specific place name, e.g. 'Kharkiv, Ukraine'" },
                "summary": { "type": "string", "description": "Two or three sentence summary" },
                "category": { "type": "string", "description": "Category such as Politics, Conflict, Disaster, Economy" },
                "timestamp": { "type": "string", "description": "When the event happened, ISO-8601" },
                "search_query": { "type": "string", "description": "3-6 keywords to find social posts about the event" }
            },
            "required": ["headline", "location", "summary", "category", "timestamp", "search_query"]
        }),
    }
}

pub fn extraction_request(
    query: &str,
    normalized: &NormalizedQuery,
    count: usize,
    known_headlines: &[String],
    temperature: f32,
) -> ToolRequest {
    let today = Utc::now().format("%Y-%m-%d");
    let mut system = format!(
        "You are a breaking news researcher. Today is {today}. \
         Report real news events from the last 7 days only. \
         Call the {TOOL_NAME} function exactly {count} separate times, one call per distinct event. \
         Never put more than one event in a single call. Each event needs a concrete, geocodable location."
    );
    if !known_headlines.is_empty() {
        system.push_str("\n\nThese events are already known. Do not report them or rephrasings of them:\n");
        for headline in known_headlines {
            system.push_str("- ");
            system.push_str(headline);
            system.push('\n');
        }
    }

    ToolRequest {
        system,
        user: format!(
            "Find {count} recent news events for: {query} (normalized: {}, scope: {:?})",
            normalized.key, normalized.scope
        ),
        tool: report_tool(),
        temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geocode::{GeoHit, Resolved};
    use crate::models::news::{Scope, SocialPost};
    use crate::models::stream::StreamEvent;
    use crate::services::cache_store::MemoryNewsStore;
    use crate::services::llm::LlmError;
    use crate::services::location_resolver::GeocodeError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Normalizer always fails (so scope is global); each extraction round
    /// replays the next scripted batch, then returns nothing.
    struct FakeLlm {
        rounds: Mutex<Vec<Result<Vec<Value>, u16>>>,
        requests: Mutex<Vec<ToolRequest>>,
    }

    impl FakeLlm {
        fn new(rounds: Vec<Result<Vec<Value>, u16>>) -> Arc<Self> {
            Arc::new(Self {
                rounds: Mutex::new(rounds),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for FakeLlm {
        async fn complete_json(&self, _: &str, _: &str) -> Result<Value, LlmError> {
            Err(LlmError::Network("offline".into()))
        }

        async fn stream_tool_calls(&self, request: &ToolRequest) -> Result<Vec<ToolCall>, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut rounds = self.rounds.lock().unwrap();
            let round = if rounds.is_empty() {
                Ok(vec![])
            } else {
                rounds.remove(0)
            };
            round
                .map(|items| {
                    items
                        .into_iter()
                        .map(|args| ToolCall {
                            name: TOOL_NAME.to_string(),
                            arguments: args.to_string(),
                        })
                        .collect()
                })
                .map_err(|status| LlmError::Api {
                    status,
                    message: "boom".into(),
                })
        }
    }

    /// Knows every place except "Nowhere".
    struct FakeGeocoder;

    #[async_trait]
    impl Geocode for FakeGeocoder {
        async fn resolve(&self, place: &str) -> Result<Option<Resolved>, GeocodeError> {
            if place == "Nowhere" {
                return Ok(None);
            }
            Ok(Some(Resolved {
                hit: GeoHit {
                    coordinates: [10.0, 20.0],
                    display_name: place.to_string(),
                },
                cached: false,
            }))
        }
    }

    struct FakeEvidence {
        keywords: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EvidenceSource for FakeEvidence {
        async fn fetch(&self, keywords: &str, _headline: &str) -> Vec<SocialPost> {
            self.keywords.lock().unwrap().push(keywords.to_string());
            Vec::new()
        }
    }

    fn candidate(headline: &str, location: &str) -> Value {
        json!({
            "headline": headline,
            "location": location,
            "summary": "Summary",
            "category": "Politics",
            "timestamp": Utc::now().to_rfc3339(),
            "search_query": format!("{headline} keywords"),
        })
    }

    fn engine(llm: Arc<FakeLlm>, store: Arc<MemoryNewsStore>, max_attempts: u32) -> DiscoveryEngine {
        DiscoveryEngine::new(
            llm,
            store,
            Arc::new(FakeGeocoder),
            Arc::new(FakeEvidence {
                keywords: Mutex::new(Vec::new()),
            }),
        )
        .with_limits(DiscoveryLimits {
            max_attempts,
            ..DiscoveryLimits::default()
        })
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    fn news_headlines(frames: &[StreamEvent]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                StreamEvent::News { event, .. } => Some(event.headline.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn batch_size_is_clamped() {
        let limits = DiscoveryLimits::default();
        assert_eq!(limits.batch_size(40, 0), 20);
        assert_eq!(limits.batch_size(20, 8), 12);
        assert_eq!(limits.batch_size(5, 5), 5);
        assert_eq!(limits.batch_size(5, 30), 5);
    }

    #[test]
    fn parses_event_times() {
        assert!(parse_event_time("2026-10-18T12:00:00Z").is_some());
        assert!(parse_event_time("2026-10-18T12:00:00+02:00").is_some());
        assert!(parse_event_time("2026-10-18 12:00:00").is_some());
        assert_eq!(
            parse_event_time("2026-10-18").unwrap().to_rfc3339(),
            "2026-10-18T00:00:00+00:00"
        );
        assert!(parse_event_time("last tuesday").is_none());
    }

    #[test]
    fn malformed_tool_arguments_are_dropped() {
        let calls = vec![
            ToolCall {
                name: TOOL_NAME.into(),
                arguments: r#"{"headline":"A","location":"B"}"#.into(),
            },
            ToolCall {
                name: TOOL_NAME.into(),
                arguments: r#"{"headline":"#.into(),
            },
            ToolCall {
                name: "other_tool".into(),
                arguments: "{}".into(),
            },
        ];
        let parsed = parse_candidates(&calls);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].headline.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn empty_query_round_with_one_geocode_miss() {
        let llm = FakeLlm::new(vec![Ok(vec![
            candidate("One", "Paris"),
            candidate("Two", "Nowhere"),
            candidate("Three", "Berlin"),
            candidate("Four", "Madrid"),
            candidate("Five", "Rome"),
        ])]);
        let store = Arc::new(MemoryNewsStore::new());
        let engine = engine(llm.clone(), store.clone(), 2);

        let (relay, rx) = StreamRelay::open();
        let report = engine.stream("", relay).await;
        let frames = drain(rx).await;

        assert_eq!(report.fetched, 4);
        assert_eq!(report.attempts, 2);
        assert_eq!(news_headlines(&frames), vec!["One", "Three", "Four", "Five"]);
        assert!(matches!(frames.first(), Some(StreamEvent::Connected)));
        assert!(matches!(frames.last(), Some(StreamEvent::Complete { total: 4 })));

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].user.contains("Find 20 recent news events"));
        assert!(requests[0].user.contains(&format!("{:?}", Scope::Global)));
        assert!((requests[0].temperature - 0.2).abs() < 1e-6);
        assert!((requests[1].temperature - 0.3).abs() < 1e-6);
        // second round excludes everything found in the first
        for headline in ["One", "Three", "Four", "Five"] {
            assert!(requests[1].system.contains(&format!("- {headline}\n")));
        }
        assert!(!requests[0].system.contains("already known"));

        let cached = store.lookup(GLOBAL_KEY).await.unwrap().unwrap();
        assert_eq!(cached.events.len(), 4);
    }

    const GLOBAL_KEY: &str = crate::services::query_normalizer::GLOBAL_SENTINEL;

    #[tokio::test]
    async fn headlines_are_unique_within_a_run() {
        let llm = FakeLlm::new(vec![
            Ok(vec![candidate("Same", "Paris"), candidate("Same", "Lyon")]),
            Ok(vec![candidate("Same", "Nice"), candidate("Other", "Nice")]),
        ]);
        let store = Arc::new(MemoryNewsStore::new());
        let (relay, rx) = StreamRelay::open();
        engine(llm, store, 3).stream("france", relay).await;

        assert_eq!(news_headlines(&drain(rx).await), vec!["Same", "Other"]);
    }

    #[tokio::test]
    async fn rerun_resurfaces_cache_and_does_not_duplicate() {
        let store = Arc::new(MemoryNewsStore::new());

        let llm = FakeLlm::new(vec![Ok(vec![candidate("Flood", "Dhaka")])]);
        let (relay, rx) = StreamRelay::open();
        engine(llm, store.clone(), 1).stream("bangladesh", relay).await;
        assert_eq!(news_headlines(&drain(rx).await), vec!["Flood"]);

        // the model proposes the same event again; it is already known from the cache
        let llm = FakeLlm::new(vec![Ok(vec![candidate("Flood", "Dhaka"), candidate("Storm", "Chittagong")])]);
        let (relay, rx) = StreamRelay::open();
        let report = engine(llm.clone(), store.clone(), 1).stream("bangladesh", relay).await;
        let frames = drain(rx).await;

        assert_eq!(report.cached, 1);
        assert_eq!(news_headlines(&frames), vec!["Flood", "Storm"]);
        assert_eq!(store.event_count().await, 2);
        assert!(llm.requests.lock().unwrap()[0].system.contains("- Flood\n"));
    }

    #[tokio::test]
    async fn persistence_conflict_reuses_stored_event() {
        let store = Arc::new(MemoryNewsStore::new());
        let stored = NewsEvent {
            id: Uuid::new_v4(),
            headline: "Quake".into(),
            location: "Izmir".into(),
            summary: String::new(),
            category: "Disaster".into(),
            coordinates: [27.1, 38.4],
            timestamp: Utc::now(),
            top_tweets: vec![],
        };
        store.create_event(&stored).await.unwrap();

        let llm = FakeLlm::new(vec![Ok(vec![candidate("Quake", "Izmir")])]);
        let (mut relay, rx) = StreamRelay::open();
        let report = engine(llm, store.clone(), 1).run("turkey", &mut relay).await;
        drop(relay);
        let frames = drain(rx).await;

        assert_eq!(report.fetched, 1);
        let ids: Vec<Uuid> = frames
            .iter()
            .filter_map(|f| match f {
                StreamEvent::News { event, .. } => Some(event.id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![stored.id]);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn skips_incomplete_and_stale_candidates_and_missing_hints() {
        let stale = json!({
            "headline": "Old news",
            "location": "Paris",
            "timestamp": (Utc::now() - chrono::Duration::days(9)).to_rfc3339(),
            "search_query": "old",
        });
        let no_hint = json!({"headline": "No hint", "location": "Paris"});
        let llm = FakeLlm::new(vec![Ok(vec![
            json!({"headline": "No location"}),
            json!({"location": "Paris"}),
            stale,
            no_hint,
        ])]);
        let evidence = Arc::new(FakeEvidence {
            keywords: Mutex::new(Vec::new()),
        });
        let engine = DiscoveryEngine::new(
            llm,
            Arc::new(MemoryNewsStore::new()),
            Arc::new(FakeGeocoder),
            evidence.clone(),
        )
        .with_limits(DiscoveryLimits {
            max_attempts: 1,
            ..DiscoveryLimits::default()
        });

        let (relay, rx) = StreamRelay::open();
        engine.stream("paris", relay).await;
        let frames = drain(rx).await;

        assert_eq!(news_headlines(&frames), vec!["No hint"]);
        match frames.iter().find(|f| matches!(f, StreamEvent::News { .. })) {
            Some(StreamEvent::News { event, .. }) => {
                assert!(event.top_tweets.is_empty());
                assert_eq!(event.category, "General");
            }
            _ => unreachable!(),
        }
        assert!(evidence.keywords.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_moves_to_next_round() {
        let llm = FakeLlm::new(vec![Err(500), Ok(vec![candidate("Recovered", "Oslo")])]);
        let (relay, rx) = StreamRelay::open();
        let report = engine(llm, Arc::new(MemoryNewsStore::new()), 2)
            .stream("norway", relay)
            .await;

        assert_eq!(report.attempts, 2);
        assert_eq!(news_headlines(&drain(rx).await), vec!["Recovered"]);
    }

    #[tokio::test]
    async fn auth_failure_emits_error_then_complete() {
        let llm = FakeLlm::new(vec![Err(401), Ok(vec![candidate("Never", "Oslo")])]);
        let (relay, rx) = StreamRelay::open();
        let report = engine(llm, Arc::new(MemoryNewsStore::new()), 5)
            .stream("norway", relay)
            .await;
        let frames = drain(rx).await;

        assert_eq!(report.attempts, 1);
        assert!(news_headlines(&frames).is_empty());
        let n = frames.len();
        assert!(matches!(frames[n - 1], StreamEvent::Complete { total: 0 }));
        assert!(frames.iter().any(|f| matches!(f, StreamEvent::Error { .. })));
    }

    #[tokio::test]
    async fn stops_when_client_disconnects() {
        let llm = FakeLlm::new(vec![]);
        let (relay, rx) = StreamRelay::open();
        drop(rx);
        let report = engine(llm.clone(), Arc::new(MemoryNewsStore::new()), 10)
            .stream("anything", relay)
            .await;

        assert_eq!(report.attempts, 0);
        assert!(llm.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn time_budget_ends_the_loop() {
        let llm = FakeLlm::new(vec![]);
        let engine = DiscoveryEngine::new(
            llm.clone(),
            Arc::new(MemoryNewsStore::new()),
            Arc::new(FakeGeocoder),
            Arc::new(FakeEvidence {
                keywords: Mutex::new(Vec::new()),
            }),
        )
        .with_limits(DiscoveryLimits {
            time_budget: Duration::ZERO,
            ..DiscoveryLimits::default()
        });

        let (relay, _rx) = StreamRelay::open();
        let report = engine.stream("anything", relay).await;
        assert_eq!(report.attempts, 0);
    }
}
