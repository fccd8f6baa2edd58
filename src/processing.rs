use crate::types::{RegionCollection, RegionValues, StatisticTable};
use geo::Area;
use std::collections::HashSet;
use std::fmt::Write;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct JoinedValues {
    /// Values for regions that have a row in the table.
    pub values: RegionValues,
    /// Regions drawn with the missing-data color.
    pub unmatched_regions: Vec<String>,
    /// Table rows naming no known region.
    pub orphan_rows: Vec<String>,
}

/// Match statistic rows to regions by identifier.
pub fn join(regions: &RegionCollection, table: &StatisticTable) -> JoinedValues {
    let mut joined = JoinedValues::default();

    for region in &regions.regions {
        match table.values.get(&region.id) {
            Some(&value) => {
                joined.values.insert(region.id.clone(), value);
            }
            None => joined.unmatched_regions.push(region.id.clone()),
        }
    }

    let known: HashSet<&str> = regions.regions.iter().map(|r| r.id.as_str()).collect();
    joined.orphan_rows = table
        .values
        .keys()
        .filter(|id| !known.contains(id.as_str()))
        .cloned()
        .collect();
    joined.orphan_rows.sort();

    info!(
        "Joined {} of {} regions ({} table rows without a region)",
        joined.values.len(),
        regions.len(),
        joined.orphan_rows.len()
    );
    if !joined.unmatched_regions.is_empty() {
        warn!("{} regions have no statistic and will use the missing color", joined.unmatched_regions.len());
    }

    joined
}

/// Planar area of every region in the units of its own CRS, also stored as the `area` property.
pub fn derive_area(regions: &mut RegionCollection) -> RegionValues {
    if let Some(crs) = &regions.crs {
        info!("Measuring area in source CRS: {}", crs_name(crs));
    } else {
        warn!("Measuring area in unknown CRS units");
    }

    let mut areas = RegionValues::with_capacity(regions.len());
    for region in &mut regions.regions {
        let area = region.geometry.unsigned_area();
        region.properties.insert("area".to_string(), area.to_string());
        areas.insert(region.id.clone(), area);
    }
    areas
}

// PROJCS["NAD_1983_StatePlane_New_York_Long_Island_FIPS_3104_Feet",...] -> the quoted name
fn crs_name(wkt: &str) -> &str {
    wkt.split('"').nth(1).unwrap_or(wkt)
}

/// Text preview of the first `n` regions: identifier, attributes and part count.
pub fn head(regions: &RegionCollection, n: usize) -> String {
    let rows: Vec<_> = regions.regions.iter().take(n).collect();

    let mut columns: Vec<&str> = Vec::new();
    for region in &rows {
        for key in region.properties.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut table: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    let mut header = vec!["id".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));
    header.push("geometry".to_string());
    table.push(header);

    for region in &rows {
        let mut line = vec![region.id.clone()];
        line.extend(columns.iter().map(|c| region.properties.get(*c).cloned().unwrap_or_default()));
        line.push(format!("MULTIPOLYGON ({} parts)", region.geometry.0.len()));
        table.push(line);
    }

    format_table(&table)
}

/// One `id  value` line per region, in collection order, headed by `name`.
pub fn format_series(regions: &RegionCollection, values: &RegionValues, name: &str) -> String {
    let mut table = vec![vec!["id".to_string(), name.to_string()]];
    for region in &regions.regions {
        let value = values.get(&region.id).map(|v| format!("{:.6}", v)).unwrap_or_else(|| "NaN".to_string());
        table.push(vec![region.id.clone(), value]);
    }
    format_table(&table)
}

fn format_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; width];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<w$}", cell, w = widths[i]))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;
    use geo::{polygon, MultiPolygon};
    use std::collections::BTreeMap;

    fn square(id: &str, x: f64, side: f64) -> Region {
        let poly = polygon![
            (x: x, y: 0.0),
            (x: x + side, y: 0.0),
            (x: x + side, y: side),
            (x: x, y: side),
            (x: x, y: 0.0)
        ];
        Region {
            id: id.to_string(),
            geometry: MultiPolygon::new(vec![poly]),
            properties: BTreeMap::new(),
        }
    }

    fn collection(regions: Vec<Region>) -> RegionCollection {
        RegionCollection { regions, crs: None }
    }

    #[test]
    fn join_reports_both_sides() {
        let regions = collection(vec![square("A", 0.0, 1.0), square("B", 2.0, 1.0), square("C", 4.0, 1.0)]);
        let mut table = StatisticTable::default();
        table.values.insert("A".into(), 5.0);
        table.values.insert("B".into(), 7.0);
        table.values.insert("Z".into(), 1.0);

        let joined = join(&regions, &table);
        assert_eq!(joined.values.len(), 2);
        assert_eq!(joined.values["B"], 7.0);
        assert_eq!(joined.unmatched_regions, vec!["C".to_string()]);
        assert_eq!(joined.orphan_rows, vec!["Z".to_string()]);
    }

    #[test]
    fn square_of_side_two_has_area_four() {
        let mut regions = collection(vec![square("sq", 0.0, 2.0)]);
        let areas = derive_area(&mut regions);
        assert_eq!(areas["sq"], 4.0);
        assert_eq!(regions.regions[0].properties["area"], "4");
    }

    #[test]
    fn area_is_deterministic_and_ignores_winding() {
        let mut ccw = collection(vec![square("a", 0.0, 3.0)]);
        let mut cw = ccw.clone();
        cw.regions[0].geometry.0[0].exterior_mut(|ring| ring.0.reverse());

        let first = derive_area(&mut ccw);
        let second = derive_area(&mut ccw);
        assert_eq!(first, second);
        assert_eq!(derive_area(&mut cw)["a"], 9.0);
    }

    #[test]
    fn area_excludes_holes() {
        let poly = polygon!(
            exterior: [(x: 0., y: 0.), (x: 4., y: 0.), (x: 4., y: 4.), (x: 0., y: 4.), (x: 0., y: 0.)],
            interiors: [[(x: 1., y: 1.), (x: 2., y: 1.), (x: 2., y: 2.), (x: 1., y: 2.), (x: 1., y: 1.)]]
        );
        let mut regions = collection(vec![Region {
            id: "holey".into(),
            geometry: MultiPolygon::new(vec![poly]),
            properties: BTreeMap::new(),
        }]);
        assert_eq!(derive_area(&mut regions)["holey"], 15.0);
    }

    #[test]
    fn head_lists_attributes() {
        let mut a = square("Staten Island", 0.0, 1.0);
        a.properties.insert("BoroCode".into(), "5".into());
        let b = square("Queens", 2.0, 1.0);
        let out = head(&collection(vec![a, b, square("Brooklyn", 4.0, 1.0)]), 2);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id"));
        assert!(lines[0].contains("BoroCode"));
        assert!(lines[1].contains("Staten Island"));
        assert!(!out.contains("Brooklyn"));
    }

    #[test]
    fn crs_name_is_extracted_from_wkt() {
        assert_eq!(crs_name(r#"PROJCS["NAD_1983",GEOGCS["x"]]"#), "NAD_1983");
        assert_eq!(crs_name("EPSG:2263"), "EPSG:2263");
    }
}
