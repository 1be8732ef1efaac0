// Feed client: one fetch-and-decode cycle against the vehicle position feed
//
// Feed Sources:
// - JSON proxy (default): https://hrmbusapi.onrender.com/ serves the decoded
//   GTFS-realtime FeedMessage as JSON
// - GTFS-RT protobuf: https://gtfs.halifax.ca/realtime/Vehicle/VehiclePositions.pb
//
// Both formats are turned into the same JSON shape (camelCase fields, a
// top-level `entity` array) so the normalizer never sees the wire format.

use crate::hbt_models::{FetchFailure, HBTError, Result};
use prost::Message;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://hrmbusapi.onrender.com/";
pub const HALIFAX_PROTOBUF_URL: &str =
    "https://gtfs.halifax.ca/realtime/Vehicle/VehiclePositions.pb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FeedFormat {
    /// Decoded FeedMessage served as JSON.
    Json,
    /// Raw GTFS-realtime protobuf.
    Protobuf,
}

impl std::fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedFormat::Json => write!(f, "json"),
            FeedFormat::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// Source of raw snapshots.
pub trait FeedClient: Send + Sync {
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = std::result::Result<Value, FetchFailure>> + Send;
}

// ============================================================================
// HTTP Client
// ============================================================================

pub struct HttpFeedClient {
    http: reqwest::Client,
    url: String,
    format: FeedFormat,
}

impl HttpFeedClient {
    pub fn new(url: &str, format: FeedFormat, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HBTError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(url, format, http))
    }

    pub fn with_client(url: &str, format: FeedFormat, http: reqwest::Client) -> Self {
        HttpFeedClient {
            http,
            url: url.to_string(),
            format,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> std::result::Result<Value, FetchFailure> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchFailure::Network(format!("Failed to fetch {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(FetchFailure::UpstreamHttp {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Network(format!("Failed to read feed response: {}", e)))?;

        match self.format {
            FeedFormat::Json => serde_json::from_slice(&body)
                .map_err(|e| FetchFailure::Decode(format!("Invalid JSON feed: {}", e))),
            FeedFormat::Protobuf => decode_protobuf(&body),
        }
    }
}

impl FeedClient for HttpFeedClient {
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = std::result::Result<Value, FetchFailure>> + Send {
        self.fetch()
    }
}

// ============================================================================
// Protobuf Decoding
// ============================================================================

pub fn decode_protobuf(bytes: &[u8]) -> std::result::Result<Value, FetchFailure> {
    let feed = gtfs_rt::FeedMessage::decode(bytes)
        .map_err(|e| FetchFailure::Decode(format!("Failed to decode vehicles feed: {}", e)))?;
    Ok(feed_to_json(&feed))
}

/// Render a FeedMessage the way the JSON proxy does. int64 timestamps become
/// strings.
pub fn feed_to_json(feed: &gtfs_rt::FeedMessage) -> Value {
    let entities: Vec<Value> = feed
        .entity
        .iter()
        .map(|entity| {
            let vehicle = entity.vehicle.as_ref().map(|vehicle| {
                json!({
                    "trip": vehicle.trip.as_ref().map(|trip| json!({
                        "tripId": trip.trip_id,
                        "routeId": trip.route_id,
                        "directionId": trip.direction_id,
                    })),
                    "vehicle": vehicle.vehicle.as_ref().map(|descriptor| json!({
                        "id": descriptor.id,
                        "label": descriptor.label,
                    })),
                    "position": vehicle.position.as_ref().map(|position| json!({
                        "latitude": position.latitude as f64,
                        "longitude": position.longitude as f64,
                        "bearing": position.bearing.map(|b| b as f64),
                        "speed": position.speed.map(|s| s as f64),
                    })),
                    "timestamp": vehicle.timestamp.map(|t| t.to_string()),
                })
            });

            json!({
                "id": entity.id,
                "vehicle": vehicle,
            })
        })
        .collect();

    json!({
        "header": {
            "gtfsRealtimeVersion": feed.header.gtfs_realtime_version,
            "timestamp": feed.header.timestamp.map(|t| t.to_string()),
        },
        "entity": entities,
    })
}
