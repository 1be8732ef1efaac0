// Route filter policy
use crate::hbt_models::VehicleRecord;

/// Default threshold: routes 1 through 10 are tracked when nothing is searched.
pub const DEFAULT_ROUTE_THRESHOLD: u32 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterState {
    /// Routes whose id parses as an integer below the threshold.
    DefaultRoutes { threshold: u32 },
    /// Exact route id match.
    SingleRoute(String),
}

impl Default for FilterState {
    fn default() -> Self {
        FilterState::DefaultRoutes {
            threshold: DEFAULT_ROUTE_THRESHOLD,
        }
    }
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterState::DefaultRoutes { threshold } => {
                write!(f, "default routes (below {})", threshold)
            }
            FilterState::SingleRoute(route) => write!(f, "route {}", route),
        }
    }
}

impl FilterState {
    pub fn matches(&self, record: &VehicleRecord) -> bool {
        match self {
            FilterState::DefaultRoutes { threshold } => record
                .route_id
                .parse::<u32>()
                .map(|route| route < *threshold)
                .unwrap_or(false),
            FilterState::SingleRoute(route) => record.route_id == *route,
        }
    }

    pub fn is_single_route(&self) -> bool {
        matches!(self, FilterState::SingleRoute(_))
    }
}

/// Keep the records relevant to `filter`, preserving order. An empty result
/// is legitimate.
pub fn select(records: &[VehicleRecord], filter: &FilterState) -> Vec<VehicleRecord> {
    records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbt_models::Position;

    fn record(id: &str, route: &str) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            route_id: route.to_string(),
            direction_id: 0,
            position: Position::new(44.65, -63.59),
            bearing: None,
            label: format!("Bus {}", route),
        }
    }

    #[test]
    fn default_routes_threshold() {
        let records = vec![
            record("a", "9"),
            record("b", "21"),
            record("c", "6A"),
            record("d", "10"),
            record("e", "11"),
            record("f", ""),
            record("g", "-1"),
        ];

        let kept = select(&records, &FilterState::DefaultRoutes { threshold: 11 });
        let ids: Vec<_> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn single_route_exact_match() {
        let records = vec![record("a", "12"), record("b", "120"), record("c", "12 "), record("d", "12")];

        let kept = select(&records, &FilterState::SingleRoute("12".to_string()));
        let ids: Vec<_> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn single_route_tolerates_no_match() {
        let records = vec![record("a", "1")];
        assert!(select(&records, &FilterState::SingleRoute("433".to_string())).is_empty());
    }

    #[test]
    fn default_filter_uses_default_threshold() {
        assert_eq!(
            FilterState::default(),
            FilterState::DefaultRoutes { threshold: DEFAULT_ROUTE_THRESHOLD }
        );
        assert_eq!(FilterState::SingleRoute("6A".to_string()).to_string(), "route 6A");
    }
}
