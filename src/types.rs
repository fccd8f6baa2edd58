use geo::MultiPolygon;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    // Source attributes rendered as display strings, keyed by field name
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionCollection {
    pub regions: Vec<Region>,
    /// Coordinate reference system as described by the source, if it says.
    pub crs: Option<String>,
}

impl RegionCollection {
    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

/// Region identifier -> measurement. Identifiers stay strings so `"01001"` keeps its zero.
#[derive(Debug, Clone, Default)]
pub struct StatisticTable {
    pub values: HashMap<String, f64>,
}

/// Value per region identifier, as handed to the renderer.
pub type RegionValues = HashMap<String, f64>;
