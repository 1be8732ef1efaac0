// Data model and error types for the HRM Bus Tracker
//
// A feed snapshot is normalized into `VehicleRecord`s every cycle. The
// reconciliation engine turns the filtered records into `TrackedEntity`s
// that live across cycles, each paired with the `EntityHandle` the display
// sink handed back when the entity was first created.

use serde::{Deserialize, Serialize};

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Position { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One vehicle as reported by a single snapshot. Never kept across cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: String,
    pub route_id: String,
    pub direction_id: u32,
    pub position: Position,
    pub bearing: Option<f64>,
    pub label: String,
}

/// Opaque identifier of the visual object a display sink created for a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub id: String,
    pub handle: EntityHandle,
    pub route_id: String,
    pub last_position: Position,
    pub last_bearing: Option<f64>,
    pub label: String,
}

impl TrackedEntity {
    pub fn from_record(record: &VehicleRecord, handle: EntityHandle) -> Self {
        TrackedEntity {
            id: record.id.clone(),
            handle,
            route_id: record.route_id.clone(),
            last_position: record.position,
            last_bearing: record.bearing,
            label: record.label.clone(),
        }
    }

    /// Mutate in place; `id` and `handle` never change.
    pub fn apply(&mut self, record: &VehicleRecord) {
        self.route_id = record.route_id.clone();
        self.last_position = record.position;
        self.last_bearing = record.bearing;
        self.label = record.label.clone();
    }
}

/// Outcome of one diff against the tracked set. Ids are listed in the order
/// the instructions were sent to the display sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

/// Why a reconciliation cycle ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Tick,
    FilterChange,
    Manual,
}

impl std::fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleTrigger::Tick => write!(f, "tick"),
            CycleTrigger::FilterChange => write!(f, "filter change"),
            CycleTrigger::Manual => write!(f, "refresh"),
        }
    }
}

/// Summary of one applied reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub trigger: CycleTrigger,
    pub changes: Reconciliation,
    /// Records that survived normalization.
    pub vehicles_in_feed: usize,
    /// Entries dropped by the normalizer.
    pub dropped_records: usize,
    pub tracked: usize,
    /// A single-route filter matched nothing. Not an error.
    pub no_match: bool,
    pub feed_timestamp: Option<i64>,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FetchFailure {
    Network(String),
    UpstreamHttp { status: u16, url: String },
    Decode(String),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Network(e) => write!(f, "network error: {}", e),
            FetchFailure::UpstreamHttp { status, url } => {
                write!(f, "upstream returned HTTP {} for {}", status, url)
            }
            FetchFailure::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HBTError {
    MalformedFeed(String),
    Fetch(FetchFailure),
    UnknownRoute(String),
    Config(String),
    Lifecycle(String),
}

impl std::fmt::Display for HBTError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HBTError::MalformedFeed(e) => write!(f, "Malformed feed: {}", e),
            HBTError::Fetch(e) => write!(f, "Fetch failure: {}", e),
            HBTError::UnknownRoute(r) => write!(f, "No such bus route: {}", r),
            HBTError::Config(e) => write!(f, "Configuration error: {}", e),
            HBTError::Lifecycle(e) => write!(f, "Scheduler error: {}", e),
        }
    }
}

impl std::error::Error for HBTError {}

impl From<FetchFailure> for HBTError {
    fn from(e: FetchFailure) -> Self {
        HBTError::Fetch(e)
    }
}

pub type Result<T> = std::result::Result<T, HBTError>;
