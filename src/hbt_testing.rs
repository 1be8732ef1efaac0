// Test doubles shared by the engine, scheduler and controller tests
use crate::hbt_engine::DisplaySink;
use crate::hbt_feed::FeedClient;
use crate::hbt_models::{EntityHandle, FetchFailure, Position};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Recording Sink
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Create {
        id: String,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: String,
    },
    Update {
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: String,
    },
    Remove(EntityHandle),
}

impl SinkCall {
    pub fn handle(&self) -> Option<EntityHandle> {
        match self {
            SinkCall::Create { handle, .. } | SinkCall::Update { handle, .. } => Some(*handle),
            SinkCall::Remove(handle) => Some(*handle),
        }
    }
}

/// Records every instruction it receives. Used to verify identity stability.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
    pub cycles: usize,
    next_handle: u64,
}

impl RecordingSink {
    pub fn creates_for(&self, id: &str) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Create { id: created, .. } if created == id))
            .count()
    }

    pub fn updates_for(&self, handle: EntityHandle) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Update { handle: h, .. } if *h == handle))
            .count()
    }

    pub fn removes_for(&self, handle: EntityHandle) -> usize {
        self.calls
            .iter()
            .filter(|call| **call == SinkCall::Remove(handle))
            .count()
    }

    /// Handles created and not yet removed.
    pub fn live_count(&self) -> usize {
        let created = self
            .calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Create { .. }))
            .count();
        let removed = self
            .calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Remove(_)))
            .count();
        created - removed
    }
}

impl DisplaySink for RecordingSink {
    fn create_entity(
        &mut self,
        id: &str,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) -> EntityHandle {
        self.next_handle += 1;
        let handle = EntityHandle(self.next_handle);
        self.calls.push(SinkCall::Create {
            id: id.to_string(),
            handle,
            position,
            bearing,
            label: label.to_string(),
        });
        handle
    }

    fn update_entity(
        &mut self,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) {
        self.calls.push(SinkCall::Update {
            handle,
            position,
            bearing,
            label: label.to_string(),
        });
    }

    fn remove_entity(&mut self, handle: EntityHandle) {
        self.calls.push(SinkCall::Remove(handle));
    }

    fn end_cycle(&mut self) {
        self.cycles += 1;
    }
}

// ============================================================================
// Scripted Feed
// ============================================================================

/// Replays scripted responses; the last one repeats forever.
pub struct ScriptedFeed {
    responses: Mutex<VecDeque<std::result::Result<Value, FetchFailure>>>,
    delay: Duration,
    pub fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(responses: Vec<std::result::Result<Value, FetchFailure>>) -> Self {
        Self::with_delay(responses, Duration::ZERO)
    }

    pub fn with_delay(
        responses: Vec<std::result::Result<Value, FetchFailure>>,
        delay: Duration,
    ) -> Self {
        ScriptedFeed {
            responses: Mutex::new(responses.into()),
            delay,
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn next_response(&self) -> std::result::Result<Value, FetchFailure> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap()
        }
    }
}

impl FeedClient for ScriptedFeed {
    fn fetch_snapshot(
        &self,
    ) -> impl Future<Output = std::result::Result<Value, FetchFailure>> + Send {
        async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.next_response()
        }
    }
}

pub fn vehicle(id: &str, route: &str, lat: f64, lon: f64) -> Value {
    json!({
        "id": id,
        "vehicle": {
            "trip": { "routeId": route },
            "position": { "latitude": lat, "longitude": lon }
        }
    })
}

pub fn snapshot(vehicles: Vec<Value>) -> std::result::Result<Value, FetchFailure> {
    Ok(json!({ "entity": vehicles }))
}
