// Static route/destination lookup for Halifax Transit
//
// The label shown for a vehicle is looked up by (route id, direction id).
// The built-in table mirrors the destinations published for the HRM network;
// a CSV file with `route_id,direction_id,destination` columns can replace it.

use crate::hbt_models::{HBTError, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

// ============================================================================
// Built-in Data
// ============================================================================

const BUILTIN_ROUTES: &[&str] = &[
    "1", "2", "3", "4", "5", "6A", "6B", "6C", "7A", "7B", "8", "9A", "9B", "10", "21", "22",
    "24", "25", "26", "28", "29", "30A", "30B", "39", "41", "51", "53", "54", "55", "56", "57",
    "58", "59", "61", "62", "63", "64", "65", "67", "68", "72", "82", "83", "84", "85", "86",
    "87", "88", "90", "91", "93", "123", "127", "135", "136", "137", "138", "158", "159", "161",
    "165", "168A", "168B", "178", "179", "182", "183", "185", "186", "194", "196", "320", "330",
    "370", "401", "415", "433",
];

const BUILTIN_DESTINATIONS: &[(&str, u32, &str)] = &[
    ("1", 0, "1 SPRING GARDEN TO MUMFORD TERM"),
    ("1", 1, "1 SPRING GARDEN TO BRIDGE TERM"),
    ("2", 0, "2 WATER ST TERMINAL VIA NORTH"),
    ("2", 1, "2 LACEWOOD TERMINAL VIA MAIN AVE"),
    ("3", 0, "3 BURNSIDE VIA BRIDGE TERMINAL"),
    ("3", 1, "3 LACEWOOD TERMINAL VIA MUMFORD TERMINAL"),
    ("4", 0, "4 ST. MARYS AND DALHOUSIE VIA ROBIE"),
    ("4", 1, "4 LACEWOOD TERMINAL VIA ROBIE"),
    ("5", 0, "5 SCOTIA SQUARE VIA PORTLAND"),
    ("5", 1, "5 PORTLAND HILLS TERM VIA PORTLAND ST"),
    ("8", 0, "8 DOWNTOWN HALIFAX VIA SPRING GARDEN"),
    ("8", 1, "8 SACKVILLE TERMINAL"),
    ("10", 0, "10 DALHOUSIE VIA SPRING GARDEN"),
    ("10", 1, "10 WESTPHAL VIA MICMAC"),
    ("21", 0, "21 LACEWOOD TERMINAL VIA BAYERS LAKE"),
    ("21", 1, "21 TIMBERLEA VIA BAYERS LAKE"),
    ("22", 0, "22 ARMDALE TO MUMFORD TERMINAL"),
    ("22", 1, "22 ARMDALE TO RAGGED LAKE"),
    ("24", 0, "24 SAINT MARYS VIA OXFORD"),
    ("24", 1, "24 LEIBLIN PARK VIA MUMFORD TERMINAL"),
    ("25", 0, "25 MUMFORD TERMINAL"),
    ("25", 1, "25 GOVERNORS BROOK"),
    ("26", 0, "26 MUMFORD TERMINAL"),
    ("26", 1, "26 SPRINGVALE"),
    ("28", 0, "28 MUMFORD TERMINAL VIA WASHMILL LAKE"),
    ("28", 1, "28 LACEWOOD TERMINAL VIA WASHMILL LAKE"),
    ("29", 0, "29 POINT PLEASANT VIA HOLLIS"),
    ("29", 1, "29 BAYERS ROAD CENTRE VIA MUMFORD"),
    ("39", 0, "39 BRIDGE TERMINAL VIA MACKAY BRIDGE"),
    ("39", 1, "39 LACEWOOD TERMINAL VIA MACKAY BRIDGE"),
    ("41", 0, "41 DALHOUSIE"),
    ("41", 1, "41 BRIDGE TERMINAL"),
    ("51", 0, "51 WINDMILL TO BRIDGE TERMINAL"),
    ("51", 1, "51 WINDMILL TO OCEAN BREEZE"),
    ("53", 0, "53 ALDERNEY VIA BRIDGE TERMINAL"),
    ("53", 1, "53 HIGHFIELD TERMINAL VIA ALBRO LAKE"),
    ("54", 0, "54 BRIDGE TERMINAL VIA ALDERNEY"),
    ("54", 1, "54 MONTEBELLO VIA MICMAC TERMINAL"),
    ("55", 0, "55 BRIDGE TERMINAL VIA ALDERNEY"),
    ("55", 1, "55 PORT WALLACE VIA MICMAC TERMINAL"),
    ("56", 0, "56 BRIDGE TERMINAL VIA MICMAC"),
    ("56", 1, "56 DARTMOUTH CROSSING VIA MICMAC"),
    ("57", 0, "57 PENHORN TERMINAL VIA PORTLAND ESTATES"),
    ("57", 1, "57 PORTLAND HILLS TERMINAL"),
    ("58", 0, "58 PENHORN TERMINAL VIA WOODLAWN"),
    ("58", 1, "58 PORTLAND HILLS TERMINAL VIA WOODLAW"),
    ("59", 0, "59 PORTLAND HILLS TERMINAL"),
    ("59", 1, "59 COLBY VILLAGE"),
    ("61", 0, "61 PORTLAND HILLS VIA FOREST HILLS"),
    ("61", 1, "61 NORTH PRESTON VIA FOREST HILLS"),
    ("62", 0, "62 BRIDGE TERM VIA MANOR PARK"),
    ("62", 1, "62 GASTON VIA MANOR PARK"),
    ("63", 0, "63 PENHORN TERMINAL VIA MT EDWARD"),
    ("63", 1, "63 PORTLAND HILLS VIA MT EDWARD"),
    ("64", 0, "64 HIGHFIELD TERMINAL VIA BURNSIDE"),
    ("64", 1, "64 WRIGHTS COVE VIA BURNSIDE"),
    ("65", 0, "65 PORTLAND HILLS TERMINAL"),
    ("65", 1, "65 ASTRAL DRIVE VIA CALDWELL"),
    ("67", 0, "67 MICMAC VIA TACOMA"),
    ("67", 1, "67 WOODSIDE VIA BAKER"),
    ("68", 0, "68 PORTLAND HILLS TERM VIA AUBURN D"),
    ("68", 1, "68 CHERRY BROOK VIA AUBURN DR"),
    ("72", 0, "72 DARTMOUTH CROSSING VIA WRIGHT"),
    ("72", 1, "72 PORTLAND HILLS VIA WOODLAWN"),
    ("82", 0, "82 COBEQUID TERMINAL VIA FIRST LAKE"),
    ("82", 1, "82 SACKVILLE TERMINAL VIA FIRST LAKE"),
    ("83", 0, "83 SACKVILLE TERMINAL"),
    ("83", 1, "83 SPRINGFIELD"),
    ("84", 0, "84 DOWNTOWN TO SCOTIA SQUARE"),
    ("84", 1, "84 SACKVILLE TERMINAL VIA GLENDALE"),
    ("85", 0, "85 SACKVILLE TERMINAL"),
    ("85", 1, "85 MILLWOOD"),
    ("86", 0, "86 SACKVILLE TERMINAL"),
    ("86", 1, "86 BEAVER BANK"),
    ("87", 0, "87 BRIDGE TERMINAL"),
    ("87", 1, "87 SACKVILLE TERMINAL"),
    ("88", 0, "88 SACKVILLE TERMINAL"),
    ("88", 1, "88 BEDFORD COMMONS"),
    ("90", 0, "90 WATER ST TERMINAL VIA UNIVERSITY"),
    ("90", 1, "90 WEST BEDFORD VIA LARRY UTECK"),
    ("91", 0, "91 MUMFORD TERMINAL"),
    ("91", 1, "91 WEST BEDFORD VIA STARBOARD"),
    ("93", 0, "93 DOWNTOWN HALIFAX VIA LADY HAMMOND"),
    ("93", 1, "93 COBEQUID TERMINAL VIA LADY HAMMOND"),
    ("123", 0, "123 TIMBERLEA EXPRESS TO SCOTIA SQUARE"),
    ("123", 1, "123 TIMBERLEA EXPRESS"),
    ("127", 0, "127 EXPRESS TO SCOTIA SQUARE"),
    ("127", 1, "127 COWIE HILL EXPRESS"),
    ("135", 0, "135 FLAMINGO EXPRESS TO UNIVERSITY AVE"),
    ("135", 1, "135 FLAMINGO EXPRESS VIA LACEWOOD TERM"),
    ("136", 0, "136 FARNHAM GATE EXP TO UNIVERSITY AVE"),
    ("136", 1, "136 FARNHAM GATE EXP VIA LACEWOOD TERM"),
    ("137", 0, "137 CLAYTON PARK EXP TO UNIVERSITY AVE"),
    ("137", 1, "137 CLAYTON PARK EXP VIA LACEWOOD TERM"),
    ("138", 0, "138 PARKLAND EXPRESS TO UNIVERSITY AVE"),
    ("138", 1, "138 PARKLAND EXPRESS VIA LACEWOOD TERM"),
    ("158", 0, "158 EXPRESS TO UNIVERSITY AVE"),
    ("158", 1, "158 WOODLAWN EXPRESS VIA MOUNT EDWARD"),
    ("159", 0, "159 EXPRESS TO UNIVERSITY AVE"),
    ("159", 1, "159 COLBY EXPRESS VIA PORTLAND"),
    ("161", 0, "161 EXPRESS TO UNIVERSITY AVE"),
    ("161", 1, "161 NORTH PRESTON EXPRESS VIA PORTLAND"),
    ("165", 0, "165 EXPRESS TO UNIVERSITY AVE"),
    ("165", 1, "165 CALDWELL EXPRESS VIA PORTLAND"),
    ("178", 0, "178 WOODSIDE FERRY EXPRESS"),
    ("178", 1, "178 MOUNT EDWARD EXPRESS"),
    ("179", 0, "179 WOODSIDE FERRY EXPRESS"),
    ("179", 1, "179 COLE HARBOUR EXPRESS"),
    ("182", 0, "182 FIRST LAKE EXPRESS TO SUMMER STREET"),
    ("182", 1, "182 FIRST LAKE EXPRESS VIA COBEQUID TERM"),
    ("183", 0, "183 DOWNTOWN EXPRESS TO SUMMER STREET"),
    ("183", 1, "183 SPRINGFIELD EXPRESS VIA SACKVILLE"),
    ("185", 0, "185 DOWNTOWN EXPRESS TO SUMMER STREET"),
    ("185", 1, "185 MILLWOOD EXPRESS VIA SACKVILLE TERM"),
    ("186", 0, "186 DOWNTOWN EXPRESS TO SUMMER STREET"),
    ("186", 1, "186 BEAVER BANK EXPRESS VIA SACKVILLE"),
    ("194", 0, "194 DOWNTOWN EXPRESS TO SUMMER STREET"),
    ("194", 1, "194 WEST BEDFORD EXPRESS"),
    ("196", 0, "196 DOWNTOWN EXPRESS TO SUMMER STREET"),
    ("196", 1, "196 BASINVIEW ROCKMANOR EXPRESS"),
    ("320", 0, "320 DOWNTOWN HFX VIA BRIDGE TERM"),
    ("320", 1, "320 AIRPORT VIA FALL RIVER"),
    ("330", 0, "330 DOWNTOWN HFX TO ALBEMARLE ST"),
    ("330", 1, "330 TANTALLON ONLY"),
    ("370", 0, "370 DOWNTOWN HFX VIA BRIDGE TERM"),
    ("370", 1, "370 PORTERS LAKE"),
    ("401", 0, "401 PORTLAND HILLS TERMINAL"),
    ("401", 1, "401 PORTERS LAKE VIA EAST PRESTON"),
    ("415", 0, "415 MUMFORD TERMINAL"),
    ("415", 1, "415 PURCELLS COVE"),
    ("433", 0, "433 LACEWOOD TERMINAL"),
    ("433", 1, "433 TANTALLON VIA HAMMONDS PLAINS"),
    ("168A", 0, "168A EXPRESS TO UNIVERSITY AVE"),
    ("168A", 1, "168A AUBURN EXPRESS VIA PORTLAND"),
    ("168B", 0, "168B EXPRESS TO UNIVERSITY AVE"),
    ("168B", 1, "168B CHERRY BROOK EXPRESS VIA PORTLAND"),
    ("30A", 0, "30A LACEWOOD TERMINAL"),
    ("30A", 1, "30A PARKLAND"),
    ("30B", 0, "30B LACEWOOD TERMINAL"),
    ("30B", 1, "30B DUNBRACK"),
    ("6A", 0, "6A BRIDGE TERMINAL VIA PLEASANT"),
    ("6A", 1, "6A WOODSIDE VIA PLEASANT"),
    ("6B", 0, "6B BRIDGE TERMINAL VIA WOODSIDE"),
    ("6B", 1, "6B EASTERN PASSAGE VIA WOODSIDE"),
    ("6C", 0, "6C BRIDGE TERMINAL VIA WOODSIDE"),
    ("6C", 1, "6C HERITAGE HILLS VIA WOODSIDE"),
    ("7A", 0, "7A SCOTIA SQUARE VIA GOTTINGEN"),
    ("7A", 1, "7A ROBIE"),
    ("7B", 0, "7B SCOTIA SQUARE VIA ROBIE"),
    ("7B", 1, "7B NOVALEA VIA GOTTINGEN"),
    ("9A", 0, "9A DOWNTOWN VIA SPRING GARDEN"),
    ("9A", 1, "9A GREYSTONE FOTHERBY VIA MUMFORD"),
    ("9B", 0, "9B DOWNTOWN VIA SPRING GARDEN"),
    ("9B", 1, "9B HERRING COVE VIA MUMFORD TERMINAL"),
];

lazy_static! {
    static ref BUILTIN_TABLE: DestinationTable = DestinationTable::from_entries(
        BUILTIN_DESTINATIONS
            .iter()
            .map(|(route, direction, destination)| (route.to_string(), *direction, destination.to_string())),
        BUILTIN_ROUTES.iter().map(|r| r.to_string()),
    );
}

// ============================================================================
// Destination Table
// ============================================================================

#[derive(Debug, Deserialize)]
struct DestinationRow {
    route_id: String,
    direction_id: u32,
    destination: String,
}

#[derive(Debug, Clone, Default)]
pub struct DestinationTable {
    destinations: HashMap<(String, u32), String>,
    routes: Vec<String>,
}

impl DestinationTable {
    /// The Halifax Transit table shipped with the tracker.
    pub fn builtin() -> Self {
        BUILTIN_TABLE.clone()
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, u32, String)>,
        routes: impl IntoIterator<Item = String>,
    ) -> Self {
        let destinations = entries
            .into_iter()
            .map(|(route, direction, destination)| ((route, direction), destination))
            .collect();

        DestinationTable {
            destinations,
            routes: routes.into_iter().collect(),
        }
    }

    /// Read a `route_id,direction_id,destination` CSV. The known route list is
    /// every distinct route id, in first-seen order.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut destinations = HashMap::new();
        let mut routes: Vec<String> = Vec::new();

        for (line, row) in rdr.deserialize::<DestinationRow>().enumerate() {
            let row = row.map_err(|e| {
                HBTError::Config(format!("Invalid destination row {}: {}", line + 1, e))
            })?;

            let route_id = row.route_id.trim().to_string();
            if route_id.is_empty() {
                return Err(HBTError::Config(format!(
                    "Destination row {} has an empty route_id",
                    line + 1
                )));
            }
            if !routes.contains(&route_id) {
                routes.push(route_id.clone());
            }
            destinations.insert((route_id, row.direction_id), row.destination);
        }

        if destinations.is_empty() {
            return Err(HBTError::Config("Destination table is empty".to_string()));
        }

        Ok(DestinationTable { destinations, routes })
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            HBTError::Config(format!("Failed to open destination table {:?}: {}", path, e))
        })?;
        let table = Self::from_csv_reader(file)?;
        log::info!(
            "Loaded {} destinations for {} routes from {:?}",
            table.destinations.len(),
            table.routes.len(),
            path
        );
        Ok(table)
    }

    /// Never fails: unknown pairs fall back to `Bus <routeId>`.
    pub fn label(&self, route_id: &str, direction_id: u32) -> String {
        self.destinations
            .get(&(route_id.to_string(), direction_id))
            .cloned()
            .unwrap_or_else(|| format!("Bus {}", route_id))
    }

    pub fn is_known_route(&self, route_id: &str) -> bool {
        self.routes.iter().any(|r| r == route_id)
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let table = DestinationTable::builtin();
        assert_eq!(table.label("3", 1), "3 LACEWOOD TERMINAL VIA MUMFORD TERMINAL");
        assert_eq!(table.label("6A", 0), "6A BRIDGE TERMINAL VIA PLEASANT");
        assert!(table.is_known_route("168B"));
        assert!(!table.is_known_route("6"));
    }

    #[test]
    fn missing_destination_falls_back() {
        let table = DestinationTable::builtin();
        // Route 7 only exists as 7A and 7B.
        assert_eq!(table.label("7", 0), "Bus 7");
        assert_eq!(table.label("1", 5), "Bus 1");
    }

    #[test]
    fn csv_table_replaces_builtin() {
        let csv = "route_id,direction_id,destination\n\
                   12,0,12 DOWNTOWN\n\
                   12,1,12 UPTOWN\n\
                   X9,0,X9 EXPRESS\n";
        let table = DestinationTable::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.routes(), &["12".to_string(), "X9".to_string()]);
        assert_eq!(table.label("12", 1), "12 UPTOWN");
        assert_eq!(table.label("3", 0), "Bus 3");
    }

    #[test]
    fn csv_rejects_bad_rows() {
        let csv = "route_id,direction_id,destination\n12,north,12 DOWNTOWN\n";
        let err = DestinationTable::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, HBTError::Config(_)));

        let empty = "route_id,direction_id,destination\n";
        assert!(DestinationTable::from_csv_reader(empty.as_bytes()).is_err());
    }

    #[test]
    fn csv_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("destinations.csv");
        std::fs::write(&path, "route_id,direction_id,destination\n5,0,5 SCOTIA SQUARE\n").unwrap();

        let table = DestinationTable::load_csv(&path).unwrap();
        assert_eq!(table.label("5", 0), "5 SCOTIA SQUARE");
        assert!(DestinationTable::load_csv(&dir.path().join("missing.csv")).is_err());
    }
}
