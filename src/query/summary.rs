// src/query/summary.rs
use serde::Serialize;

use crate::{
    config::Columns,
    rank::{top_coordinate_pairs, top_n, CoordinatePair, FrequencyEntry},
    store::Record,
};

const DEMOGRAPHIC_TOP_N: usize = 3;

/// A mapped incident, tagged with its crime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: String,
    pub longitude: String,
    pub crime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    pub accused_age: Vec<FrequencyEntry>,
    pub accused_caste: Vec<FrequencyEntry>,
    pub accused_profession: Vec<FrequencyEntry>,
}

/// Everything the prediction/deployment views need for one filter selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailSummary {
    pub all_lat_long: Vec<GeoPoint>,
    pub top_crime_groups: Vec<FrequencyEntry>,
    pub top_crimes: Vec<FrequencyEntry>,
    pub top_months: Vec<FrequencyEntry>,
    pub demographics: Demographics,
    pub top_locations: Vec<CoordinatePair>,
}

pub fn detail_summary(rows: &[Record], columns: &Columns, n: usize) -> DetailSummary {
    let all_lat_long = rows
        .iter()
        .filter(|r| !r.value(&columns.latitude).is_empty() && !r.value(&columns.longitude).is_empty())
        .map(|r| GeoPoint {
            latitude: r.value(&columns.latitude).to_string(),
            longitude: r.value(&columns.longitude).to_string(),
            crime_type: r.value(&columns.crime_type).to_string(),
        })
        .collect();

    DetailSummary {
        all_lat_long,
        top_crime_groups: top_n(rows, &columns.crime_group, n, true),
        top_crimes: top_n(rows, &columns.crime_type, n, true),
        top_months: top_n(rows, &columns.month, n, true),
        demographics: Demographics {
            accused_age: top_n(rows, &columns.accused_age, DEMOGRAPHIC_TOP_N, true),
            accused_caste: top_n(rows, &columns.accused_caste, DEMOGRAPHIC_TOP_N, true),
            accused_profession: top_n(rows, &columns.accused_profession, DEMOGRAPHIC_TOP_N, true),
        },
        top_locations: top_coordinate_pairs(rows, &columns.latitude, &columns.longitude, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;

    fn table() -> Table {
        Table::from_rows(
            &[
                "Crime_Type",
                "crime_group_name",
                "month",
                "latitude",
                "longitude",
                "accused_age",
                "accused_caste",
                "accused_profession",
            ],
            vec![
                vec!["Theft", "Property", "3", "12.9", "77.5", "25", "-", "Driver"],
                vec!["Theft", "Property", "3", "12.9", "77.6", "25", "X", "Driver"],
                vec!["Assault", "Body", "4", "", "77.5", "31", "X", "-"],
                vec!["Robbery", "Property", "4", "13.1", "77.7", "40", "Y", "Farmer"],
                vec!["Fraud", "Money", "5", "13.1", "77.7", "19", "Z", "Clerk"],
            ],
        )
    }

    #[test]
    fn test_summary_breakdowns() {
        let t = table();
        let s = detail_summary(t.records(), &Columns::default(), 10);

        assert_eq!(s.all_lat_long.len(), 4);
        assert_eq!(
            s.all_lat_long[0],
            GeoPoint {
                latitude: "12.9".into(),
                longitude: "77.5".into(),
                crime_type: "Theft".into(),
            }
        );
        assert_eq!(s.top_crimes[0].value, "Theft");
        assert_eq!(s.top_crime_groups[0].freq, 3);
        assert_eq!(s.top_months.len(), 3);
        assert_eq!(s.demographics.accused_age.len(), 3);
        assert_eq!(s.demographics.accused_caste[0].value, "X");
        assert_eq!(s.demographics.accused_profession[0].value, "Driver");
        assert_eq!(s.top_locations[0].latitude, "12.9");
        assert_eq!(s.top_locations[0].longitude.as_deref(), Some("77.5"));
    }

    #[test]
    fn test_summary_top_n_is_respected() {
        let t = table();
        let s = detail_summary(t.records(), &Columns::default(), 1);
        assert_eq!(s.top_crimes.len(), 1);
        assert_eq!(s.top_locations.len(), 1);
        assert_eq!(s.demographics.accused_age.len(), 3);
    }

    #[test]
    fn test_summary_json_keys() {
        let s = detail_summary(&[], &Columns::default(), 10);
        let json = serde_json::to_value(&s).unwrap();
        for key in [
            "allLatLong",
            "topCrimeGroups",
            "topCrimes",
            "topMonths",
            "demographics",
            "topLocations",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["demographics"].get("accusedProfession").is_some());
    }
}
