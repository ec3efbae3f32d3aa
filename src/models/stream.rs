use serde::Serialize;

use super::news::{category_group, NewsEvent};

/// Frames sent to the client over the discovery event stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Connected,
    Status {
        message: String,
    },
    News {
        #[serde(flatten)]
        event: NewsEvent,
        category_group: &'static str,
    },
    Error {
        message: String,
    },
    Complete {
        total: usize,
    },
}

impl StreamEvent {
    pub fn news(event: NewsEvent) -> Self {
        let category_group = category_group(&event.category);
        StreamEvent::News {
            event,
            category_group,
        }
    }
}

/// Frames sent over the batch geocoding stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeoStreamEvent {
    Location {
        location: String,
        coordinates: [f64; 2],
        display_name: String,
        cached: bool,
    },
    LocationError {
        location: String,
        error: String,
    },
    Complete {
        total: usize,
    },
}
