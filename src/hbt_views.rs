// Views for the HRM Bus Tracker: display sinks and terminal output
use crate::hbt_engine::DisplaySink;
use crate::hbt_filter::FilterState;
use crate::hbt_models::{CycleReport, EntityHandle, Position, TrackedEntity};
use chrono::{TimeZone, Utc};
use chrono_tz::America::Halifax;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::PathBuf;

// ============================================================================
// Console Sink
// ============================================================================

/// Mirrors the tracked set as log lines.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    next_handle: u64,
    visible: HashMap<EntityHandle, String>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }
}

impl DisplaySink for ConsoleSink {
    fn create_entity(
        &mut self,
        id: &str,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) -> EntityHandle {
        self.next_handle += 1;
        let handle = EntityHandle(self.next_handle);
        self.visible.insert(handle, id.to_string());
        log::info!(
            "+ {} {} at ({:.5}, {:.5}){} [{}]",
            id,
            handle,
            position.lat,
            position.lon,
            format_bearing(bearing),
            label
        );
        handle
    }

    fn update_entity(
        &mut self,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) {
        let id = self.visible.get(&handle).map(String::as_str).unwrap_or("?");
        log::debug!(
            "~ {} {} to ({:.5}, {:.5}){} [{}]",
            id,
            handle,
            position.lat,
            position.lon,
            format_bearing(bearing),
            label
        );
    }

    fn remove_entity(&mut self, handle: EntityHandle) {
        if let Some(id) = self.visible.remove(&handle) {
            log::info!("- {} {}", id, handle);
        }
    }
}

fn format_bearing(bearing: Option<f64>) -> String {
    bearing
        .map(|b| format!(" heading {:.0}°", b))
        .unwrap_or_default()
}

// ============================================================================
// GeoJSON Sink
// ============================================================================

/// Keeps a GeoJSON `FeatureCollection` mirror of the displayed vehicles, one
/// `Point` feature per handle. When an output path is set the collection is
/// rewritten after every cycle.
#[derive(Debug, Default)]
pub struct GeoJsonSink {
    next_handle: u64,
    features: BTreeMap<EntityHandle, Feature>,
    output: Option<PathBuf>,
}

impl GeoJsonSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(path: PathBuf) -> Self {
        GeoJsonSink {
            output: Some(path),
            ..Self::default()
        }
    }

    pub fn feature(&self, handle: EntityHandle) -> Option<&Feature> {
        self.features.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.values().cloned().collect(),
            foreign_members: None,
        }
    }

    pub fn to_geojson_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.feature_collection())
    }

    fn write_output(&self) -> io::Result<()> {
        let Some(path) = &self.output else {
            return Ok(());
        };

        let body = self.to_geojson_string().map_err(io::Error::other)?;
        let tmp = path.with_extension("geojson.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)
    }

    fn set_point(feature: &mut Feature, position: Position, bearing: Option<f64>, label: &str) {
        feature.geometry = Some(Geometry::new(geojson::Value::Point(vec![
            position.lon,
            position.lat,
        ])));

        let properties = feature.properties.get_or_insert_with(JsonObject::new);
        properties.insert("bearing".to_string(), json!(bearing));
        properties.insert("label".to_string(), json!(label));
    }
}

impl DisplaySink for GeoJsonSink {
    fn create_entity(
        &mut self,
        id: &str,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) -> EntityHandle {
        self.next_handle += 1;
        let handle = EntityHandle(self.next_handle);

        let mut properties = JsonObject::new();
        properties.insert("id".to_string(), json!(id));

        let mut feature = Feature {
            bbox: None,
            geometry: None,
            id: Some(geojson::feature::Id::String(uuid::Uuid::new_v4().to_string())),
            properties: Some(properties),
            foreign_members: None,
        };
        Self::set_point(&mut feature, position, bearing, label);

        self.features.insert(handle, feature);
        handle
    }

    fn update_entity(
        &mut self,
        handle: EntityHandle,
        position: Position,
        bearing: Option<f64>,
        label: &str,
    ) {
        match self.features.get_mut(&handle) {
            Some(feature) => Self::set_point(feature, position, bearing, label),
            None => log::warn!("GeoJSON sink asked to update unknown handle {}", handle),
        }
    }

    fn remove_entity(&mut self, handle: EntityHandle) {
        self.features.remove(&handle);
    }

    fn end_cycle(&mut self) {
        if let Err(e) = self.write_output() {
            log::warn!("Failed to write GeoJSON mirror: {}", e);
        }
    }
}

// ============================================================================
// Terminal Output
// ============================================================================

pub struct HBTViews;

impl HBTViews {
    pub fn show_welcome(interval_secs: u64, filter: &FilterState) {
        println!("\n{}", "═".repeat(60));
        println!("     🚌 HRM BUS TRACKER - HALIFAX TRANSIT");
        println!("{}", "═".repeat(60));
        println!("  📡 Polling the live feed every {}s", interval_secs);
        println!("  🔎 Tracking {}", filter);
        Self::show_help();
    }

    pub fn show_help() {
        println!("\n📋 COMMANDS");
        println!("  route <id>   Track a single route (e.g. 'route 6A')");
        println!("  default      Back to the default routes");
        println!("  status       List tracked vehicles");
        println!("  refresh      Poll the feed now");
        println!("  routes       List known routes");
        println!("  quit         Exit");
        println!("{}", "─".repeat(60));
    }

    pub fn prompt() {
        print!("➜ ");
        let _ = io::stdout().flush();
    }

    pub fn show_filter_applied(filter: &FilterState, report: Option<&CycleReport>) {
        println!("\n✓ Now tracking {}", filter);
        if let Some(report) = report {
            println!(
                "  {} vehicles shown ({} added, {} removed)",
                report.tracked,
                report.changes.created.len(),
                report.changes.removed.len()
            );
        }
    }

    pub fn route_not_operating(route: &str) {
        println!("\n⚠️  Route {} is not operating at this time.", route);
    }

    pub fn unknown_route(route: &str, suggestions: &[String]) {
        println!("\n✗ No such bus route: '{}'", route);
        if !suggestions.is_empty() {
            println!("  Did you mean: {}", suggestions.join(", "));
        }
    }

    pub fn show_routes(routes: &[String]) {
        println!("\n🚌 Known routes ({}):", routes.len());
        for chunk in routes.chunks(12) {
            println!("   {}", chunk.join(" "));
        }
    }

    pub fn show_status(filter: &FilterState, entities: &[TrackedEntity]) {
        println!("\n{}", "─".repeat(60));
        println!("🔎 Filter: {}", filter);
        println!("📊 {} vehicles tracked", entities.len());
        for entity in entities {
            println!(
                "   {:<8} {:<5} ({:.5}, {:.5}){}  {}",
                entity.id,
                entity.route_id,
                entity.last_position.lat,
                entity.last_position.lon,
                format_bearing(entity.last_bearing),
                entity.label
            );
        }
        println!("{}", "─".repeat(60));
    }

    pub fn invalid_command(input: &str) {
        println!("\n✗ Unknown command '{}'. Type 'help' for commands.", input);
    }

    pub fn command_failed(message: &str) {
        println!("\n✗ {}", message);
    }

    pub fn goodbye_message() {
        println!("\n👋 Stopping tracker. Goodbye!");
    }

    pub fn format_timestamp(timestamp: i64) -> String {
        match Utc.timestamp_opt(timestamp, 0).single() {
            Some(dt) => dt.with_timezone(&Halifax).format("%H:%M:%S").to_string(),
            None => "??:??:??".to_string(),
        }
    }

    /// One line per applied cycle, used by the poll loop log.
    pub fn cycle_summary(report: &CycleReport) -> String {
        let feed_time = report
            .feed_timestamp
            .map(Self::format_timestamp)
            .unwrap_or_else(|| "--:--:--".to_string());

        format!(
            "[{}] {}: {} in feed, {} dropped, {} tracked (+{} ~{} -{})",
            feed_time,
            report.trigger,
            report.vehicles_in_feed,
            report.dropped_records,
            report.tracked,
            report.changes.created.len(),
            report.changes.updated.len(),
            report.changes.removed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbt_models::{CycleTrigger, Reconciliation};

    #[test]
    fn geojson_sink_moves_features_in_place() {
        let mut sink = GeoJsonSink::new();
        let handle = sink.create_entity("v1", Position::new(44.65, -63.59), Some(90.0), "Bus 1");
        let feature_id = sink.feature(handle).and_then(|f| f.id.clone());

        sink.update_entity(handle, Position::new(44.66, -63.60), None, "1 SPRING GARDEN");

        let feature = sink.feature(handle).unwrap();
        assert_eq!(feature.id, feature_id);
        assert_eq!(
            feature.geometry.as_ref().map(|g| g.value.clone()),
            Some(geojson::Value::Point(vec![-63.60, 44.66]))
        );
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["id"], json!("v1"));
        assert_eq!(properties["bearing"], serde_json::Value::Null);
        assert_eq!(properties["label"], json!("1 SPRING GARDEN"));

        sink.remove_entity(handle);
        assert!(sink.is_empty());
    }

    #[test]
    fn geojson_sink_writes_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buses.geojson");
        let mut sink = GeoJsonSink::with_output(path.clone());

        sink.create_entity("v1", Position::new(44.65, -63.59), None, "Bus 1");
        sink.create_entity("v2", Position::new(44.64, -63.58), Some(10.0), "Bus 2");
        sink.end_cycle();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["type"], json!("FeatureCollection"));
        assert_eq!(written["features"].as_array().map(Vec::len), Some(2));
        assert_eq!(written["features"][0]["geometry"]["coordinates"], json!([-63.59, 44.65]));
    }

    #[test]
    fn console_sink_tracks_visible_handles() {
        let mut sink = ConsoleSink::new();
        let a = sink.create_entity("v1", Position::new(1.0, 2.0), None, "Bus 1");
        let b = sink.create_entity("v2", Position::new(1.0, 2.0), None, "Bus 1");
        assert_ne!(a, b);

        sink.remove_entity(a);
        sink.remove_entity(a);
        assert_eq!(sink.visible_count(), 1);
    }

    #[test]
    fn cycle_summary_line() {
        let report = CycleReport {
            trigger: CycleTrigger::Tick,
            changes: Reconciliation {
                created: vec!["v2".to_string()],
                updated: vec!["v1".to_string()],
                removed: vec![],
            },
            vehicles_in_feed: 40,
            dropped_records: 1,
            tracked: 2,
            no_match: false,
            feed_timestamp: None,
        };

        assert_eq!(
            HBTViews::cycle_summary(&report),
            "[--:--:--] tick: 40 in feed, 1 dropped, 2 tracked (+1 ~1 -0)"
        );
    }

    #[test]
    fn timestamps_render_in_halifax_time() {
        // 2023-07-01 12:00:00 UTC is 09:00 ADT.
        assert_eq!(HBTViews::format_timestamp(1_688_212_800), "09:00:00");
    }
}
