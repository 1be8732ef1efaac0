// Reconciliation engine: diffs filtered snapshots against the tracked set
//
// The engine is the only owner of the tracked set. Every change is mirrored
// to the display sink as an explicit instruction, and a vehicle's handle is
// created once and reused for every later update until the vehicle leaves
// the filtered snapshot.

use crate::hbt_models::{EntityHandle, Position, Reconciliation, TrackedEntity, VehicleRecord};
use std::collections::HashMap;

// ============================================================================
// Display Sink
// ============================================================================

/// Receiver of rendering instructions. Owns the visual objects, never the
/// tracked set.
pub trait DisplaySink: Send {
    fn create_entity(
        &mut self,
        id: &str,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) -> EntityHandle;

    fn update_entity(
        &mut self,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    );

    fn remove_entity(&mut self, handle: EntityHandle);

    /// Called once after all instructions of a cycle were delivered.
    fn end_cycle(&mut self) {}
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn create_entity(
        &mut self,
        id: &str,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) -> EntityHandle {
        (**self).create_entity(id, position, bearing, label)
    }

    fn update_entity(
        &mut self,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) {
        (**self).update_entity(handle, position, bearing, label)
    }

    fn remove_entity(&mut self, handle: EntityHandle) {
        (**self).remove_entity(handle)
    }

    fn end_cycle(&mut self) {
        (**self).end_cycle()
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct ReconciliationEngine<S: DisplaySink> {
    tracked: HashMap<String, TrackedEntity>,
    sink: S,
}

impl<S: DisplaySink> ReconciliationEngine<S> {
    pub fn new(sink: S) -> Self {
        ReconciliationEngine {
            tracked: HashMap::new(),
            sink,
        }
    }

    /// Apply one filtered snapshot: removals first, then creations and
    /// in-place updates in snapshot order.
    pub fn reconcile(&mut self, filtered: &[VehicleRecord]) -> Reconciliation {
        // Index of the last occurrence of each id.
        let latest: HashMap<&str, usize> = filtered
            .iter()
            .enumerate()
            .map(|(i, record)| (record.id.as_str(), i))
            .collect();

        let mut changes = Reconciliation::default();

        let mut gone: Vec<String> = self
            .tracked
            .keys()
            .filter(|id| !latest.contains_key(id.as_str()))
            .cloned()
            .collect();
        gone.sort();

        for id in gone {
            if let Some(entity) = self.tracked.remove(&id) {
                self.sink.remove_entity(entity.handle);
                changes.removed.push(id);
            }
        }

        for (i, record) in filtered.iter().enumerate() {
            if latest.get(record.id.as_str()) != Some(&i) {
                continue;
            }

            match self.tracked.get_mut(&record.id) {
                Some(entity) => {
                    entity.apply(record);
                    self.sink.update_entity(
                        entity.handle,
                        record.position,
                        record.bearing,
                        &record.label,
                    );
                    changes.updated.push(record.id.clone());
                }
                None => {
                    let handle = self.sink.create_entity(
                        &record.id,
                        record.position,
                        record.bearing,
                        &record.label,
                    );
                    self.tracked
                        .insert(record.id.clone(), TrackedEntity::from_record(record, handle));
                    changes.created.push(record.id.clone());
                }
            }
        }

        self.sink.end_cycle();

        log::debug!(
            "Reconciled: {} created, {} updated, {} removed, {} tracked",
            changes.created.len(),
            changes.updated.len(),
            changes.removed.len(),
            self.tracked.len()
        );

        changes
    }

    /// Remove every tracked entity from the sink.
    pub fn clear(&mut self) -> Reconciliation {
        self.reconcile(&[])
    }

    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.tracked.get(id)
    }

    /// Tracked entities sorted by id.
    pub fn tracked(&self) -> Vec<&TrackedEntity> {
        let mut entities: Vec<&TrackedEntity> = self.tracked.values().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbt_filter::{FilterState, select};
    use crate::hbt_testing::{RecordingSink, SinkCall};

    fn record(id: &str, route: &str, lat: f64, lon: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            route_id: route.to_string(),
            direction_id: 0,
            position: Position::new(lat, lon),
            bearing: None,
            label: format!("Bus {}", route),
        }
    }

    fn ids(list: &[String]) -> Vec<&str> {
        list.iter().map(String::as_str).collect()
    }

    #[test]
    fn create_then_update_and_create() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());

        let a = vec![record("v1", "3", 44.65, -63.59)];
        let changes = engine.reconcile(&a);
        assert_eq!(ids(&changes.created), vec!["v1"]);
        assert!(changes.updated.is_empty() && changes.removed.is_empty());

        let b = vec![record("v1", "3", 44.66, -63.60), record("v2", "3", 44.64, -63.58)];
        let changes = engine.reconcile(&b);
        assert_eq!(ids(&changes.updated), vec!["v1"]);
        assert_eq!(ids(&changes.created), vec!["v2"]);
        assert!(changes.removed.is_empty());

        assert_eq!(
            engine.get("v1").map(|e| e.last_position),
            Some(Position::new(44.66, -63.60))
        );
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());
        let snapshot = vec![record("v1", "1", 44.6, -63.5), record("v2", "2", 44.7, -63.6)];

        engine.reconcile(&snapshot);
        let before: Vec<TrackedEntity> = engine.tracked().into_iter().cloned().collect();

        let changes = engine.reconcile(&snapshot);
        assert!(changes.created.is_empty());
        assert!(changes.removed.is_empty());
        assert_eq!(changes.updated.len(), 2);

        let after: Vec<TrackedEntity> = engine.tracked().into_iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(engine.sink().creates_for("v1"), 1);
    }

    #[test]
    fn identity_is_stable_across_snapshots() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());

        for step in 0..5 {
            let lat = 44.60 + step as f64 * 0.01;
            engine.reconcile(&[record("v1", "1", lat, -63.5)]);
        }

        let sink = engine.sink();
        let handle = engine.get("v1").map(|e| e.handle).unwrap();
        assert_eq!(sink.creates_for("v1"), 1);
        assert_eq!(sink.updates_for(handle), 4);
        assert_eq!(sink.removes_for(handle), 0);
        assert_eq!(sink.live_count(), 1);
    }

    #[test]
    fn removal_happens_once() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());
        engine.reconcile(&[record("v1", "1", 44.6, -63.5), record("v2", "1", 44.7, -63.5)]);
        let handle = engine.get("v1").map(|e| e.handle).unwrap();

        let changes = engine.reconcile(&[record("v2", "1", 44.7, -63.5)]);
        assert_eq!(ids(&changes.removed), vec!["v1"]);

        engine.reconcile(&[record("v2", "1", 44.8, -63.5)]);
        engine.reconcile(&[]);

        let sink = engine.sink();
        assert_eq!(sink.removes_for(handle), 1);
        let calls_after_removal = sink
            .calls
            .iter()
            .skip_while(|call| **call != SinkCall::Remove(handle))
            .skip(1)
            .filter(|call| call.handle() == Some(handle))
            .count();
        assert_eq!(calls_after_removal, 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn filter_switch_replaces_set_in_one_cycle() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());
        let feed = vec![
            record("a", "1", 44.6, -63.5),
            record("b", "9", 44.6, -63.5),
            record("c", "12", 44.6, -63.5),
            record("d", "12", 44.6, -63.5),
        ];

        engine.reconcile(&select(&feed, &FilterState::DefaultRoutes { threshold: 11 }));
        assert_eq!(engine.len(), 2);

        let changes = engine.reconcile(&select(&feed, &FilterState::SingleRoute("12".to_string())));
        assert_eq!(ids(&changes.removed), vec!["a", "b"]);
        assert_eq!(ids(&changes.created), vec!["c", "d"]);
        assert!(engine.tracked().iter().all(|e| e.route_id == "12"));
        assert_eq!(engine.sink().live_count(), 2);
    }

    #[test]
    fn duplicate_ids_in_input_resolve_to_last() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());
        let changes = engine.reconcile(&[
            record("v1", "1", 1.0, 1.0),
            record("v1", "1", 2.0, 2.0),
        ]);

        assert_eq!(ids(&changes.created), vec!["v1"]);
        assert_eq!(engine.sink().creates_for("v1"), 1);
        assert_eq!(engine.get("v1").map(|e| e.last_position), Some(Position::new(2.0, 2.0)));
    }

    #[test]
    fn clear_removes_everything() {
        let mut engine = ReconciliationEngine::new(RecordingSink::default());
        engine.reconcile(&[record("v1", "1", 1.0, 1.0), record("v2", "2", 2.0, 2.0)]);

        let changes = engine.clear();
        assert_eq!(ids(&changes.removed), vec!["v1", "v2"]);
        assert_eq!(engine.sink().live_count(), 0);
    }
}
