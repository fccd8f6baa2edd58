use crate::fetch::{self, Source};
use crate::types::{Region, RegionCollection, StatisticTable};
use anyhow::{Context, Result, anyhow, bail};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use geojson::feature::Id;
use shapefile::Reader;
use shapefile::dbase::FieldValue;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Load a boundary collection, choosing the reader from the source's extension.
///
/// `id_key` names the identifier: `id` (GeoJSON feature id), `properties.<name>`
/// or a bare attribute name.
pub fn load_geometry(source: &Source, id_key: &str) -> Result<RegionCollection> {
    let extension = source.extension();

    let collection = match (source, extension.as_deref()) {
        (Source::Local(path), Some("shp")) => load_shapefile(path, attribute_name(id_key))?,
        (Source::Remote(_), Some("shp")) => {
            return Err(anyhow!("Shapefiles must be local, got {}", source));
        }
        (Source::Remote(_), _) | (Source::Local(_), Some("json" | "geojson")) => {
            let bytes = fetch::fetch_bytes(source)?;
            parse_geojson(&bytes, id_key)
                .with_context(|| format!("Failed to load GeoJSON from {}", source))?
        }
        (Source::Local(_), Some(other)) => {
            return Err(anyhow!("Unsupported geometry format: {}", other));
        }
        (Source::Local(_), None) => {
            return Err(anyhow!("Input geometry file has no extension"));
        }
    };

    info!("Loaded {} regions from {}", collection.len(), source);
    Ok(collection)
}

fn attribute_name(id_key: &str) -> &str {
    id_key.strip_prefix("properties.").unwrap_or(id_key)
}

pub fn parse_geojson(bytes: &[u8], id_key: &str) -> Result<RegionCollection> {
    let geojson = GeoJson::from_reader(bytes).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .map(|crs| crs.to_string());

    let mut regions = Vec::new();
    let mut skipped = 0usize;

    for feature in collection.features {
        let id = if id_key == "id" {
            match &feature.id {
                Some(Id::String(s)) => Some(s.clone()),
                Some(Id::Number(n)) => Some(n.to_string()),
                None => None,
            }
        } else {
            feature
                .properties
                .as_ref()
                .and_then(|props| props.get(attribute_name(id_key)))
                .and_then(json_to_id)
        };

        let Some(id) = id else {
            skipped += 1;
            continue;
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", id, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        warn!("Skipping region {}: geometry is not areal", id);
                        continue;
                    }
                }
            }
            None => {
                warn!("Skipping region {}: no geometry", id);
                continue;
            }
        };

        let properties: BTreeMap<String, String> = feature
            .properties
            .map(|props| {
                props
                    .into_iter()
                    .map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, text)
                    })
                    .collect()
            })
            .unwrap_or_default();

        regions.push(Region { id, geometry, properties });
    }

    if skipped > 0 {
        warn!("Skipped {} features without a '{}' identifier", skipped, id_key);
    }

    ensure_unique_ids(&regions)?;
    Ok(RegionCollection { regions, crs })
}

fn json_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn load_shapefile(path: &Path, id_field: &str) -> Result<RegionCollection> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut regions = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result
            .with_context(|| format!("Failed to read record from {:?}", path))?;

        let id_value = record.get(id_field)
            .ok_or_else(|| anyhow!("Index field '{}' not found in Shapefile", id_field))?;

        let id = match id_value {
            FieldValue::Character(Some(s)) => s.trim().to_string(),
            FieldValue::Character(None) => continue,
            other => field_to_string(other),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => {
                warn!("Skipping region {}: shape is not a polygon", id);
                continue;
            }
        };

        let properties: BTreeMap<String, String> = record
            .into_iter()
            .map(|(name, value)| (name, field_to_string(&value)))
            .collect();

        regions.push(Region { id, geometry, properties });
    }

    ensure_unique_ids(&regions)?;

    let crs = std::fs::read_to_string(path.with_extension("prj"))
        .ok()
        .map(|wkt| wkt.trim().to_string())
        .filter(|wkt| !wkt.is_empty());
    if crs.is_none() {
        warn!("No .prj next to {:?}; coordinate system unknown", path);
    }

    Ok(RegionCollection { regions, crs })
}

fn field_to_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Character(Some(s)) => s.trim().to_string(),
        FieldValue::Character(None) => String::new(),
        FieldValue::Numeric(Some(n)) => n.to_string(),
        FieldValue::Numeric(None) => String::new(),
        FieldValue::Float(Some(f)) => f.to_string(),
        FieldValue::Float(None) => String::new(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Double(d) => d.to_string(),
        FieldValue::Logical(Some(b)) => b.to_string(),
        FieldValue::Logical(None) => String::new(),
        other => format!("{:?}", other),
    }
}

fn ensure_unique_ids(regions: &[Region]) -> Result<()> {
    let mut seen = HashSet::with_capacity(regions.len());
    for region in regions {
        if !seen.insert(region.id.as_str()) {
            bail!("Region identifier '{}' appears more than once", region.id);
        }
    }
    Ok(())
}

/// Parse a CSV statistic table. The identifier column is kept as text.
pub fn parse_statistics(bytes: &[u8], id_column: &str, value_column: &str) -> Result<StatisticTable> {
    let mut rdr = ReaderBuilder::new().from_reader(bytes);
    let headers = rdr.headers().context("Failed to read CSV header")?.clone();

    let id_idx = headers.iter().position(|h| h == id_column)
        .ok_or_else(|| anyhow!("Location column '{}' not found in CSV", id_column))?;
    let value_idx = headers.iter().position(|h| h == value_column)
        .ok_or_else(|| anyhow!("Value column '{}' not found in CSV", value_column))?;

    let mut table = StatisticTable::default();

    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed CSV row {}", row + 1))?;
        let id = record.get(id_idx).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }

        let raw = record.get(value_idx).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        let value: f64 = raw.parse()
            .with_context(|| format!("Value '{}' for '{}' in column '{}' is not a number", raw, id, value_column))?;

        if table.values.insert(id.to_string(), value).is_some() {
            warn!("Identifier '{}' repeated in statistic table; keeping the last value", id);
        }
    }

    info!("Loaded {} statistic rows", table.values.len());
    Ok(table)
}

/// Fetch and parse the statistic table for the choropleth pipeline.
pub fn load_statistics(source: &Source, id_column: &str, value_column: &str) -> Result<StatisticTable> {
    let bytes = fetch::fetch_bytes(source)?;
    parse_statistics(&bytes, id_column, value_column)
        .with_context(|| format!("Failed to load statistics from {}", source))
}
