// src/report.rs
use std::fmt::Write;

use crate::{config::Columns, query::FrequencyTable};

const TOP_VALUES: usize = 3;

/// `accused_present_address` -> `Accused Present Address`.
pub fn title_case(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One numbered line per descriptive column naming its three most common
/// values and their share of all rows in that column.
pub fn narrative(
    table: &FrequencyTable,
    columns: &Columns,
    district: &str,
    unit: Option<&str>,
) -> String {
    let skip = [
        "crime_no",
        columns.district.as_str(),
        columns.unit.as_str(),
        columns.latitude.as_str(),
        columns.longitude.as_str(),
    ];
    let unit = unit.filter(|u| !u.is_empty()).unwrap_or("entire district");

    let mut out = String::new();
    let mut index = 0;
    for (field, entries) in &table.columns {
        if skip.contains(&field.as_str()) {
            continue;
        }
        index += 1;

        let total: u64 = entries.iter().map(|e| e.freq).sum();
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| b.freq.cmp(&a.freq));
        let top = sorted
            .iter()
            .take(TOP_VALUES)
            .enumerate()
            .map(|(i, e)| {
                let pct = if total == 0 { 0 } else { e.freq * 100 / total };
                format!("{}. {}: {} ({}% of total)", i + 1, e.value, e.freq, pct)
            })
            .collect::<Vec<_>>()
            .join("; ");

        let _ = writeln!(
            out,
            "{}) Most of the {} in this {} district and {} unit belongs to {}.",
            index,
            title_case(field),
            district,
            unit,
            top
        );
    }
    out
}
