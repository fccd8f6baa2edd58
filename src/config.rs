use std::collections::HashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

use crate::color::ColorScale;
use crate::projection::Scope;

pub const COUNTIES_GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json";
pub const UNEMPLOYMENT_CSV_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/fips-unemp-16.csv";
pub const BOROUGHS_SHAPEFILE: &str = "data/nybb/nybb.shp";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub choropleth: ChoroplethConfig,
    pub area: AreaConfig,
    pub server: ServerConfig,
}

/// Pipeline A: remote boundaries joined with a remote statistic table.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChoroplethConfig {
    pub geometry: String,
    /// `id` for the feature's own identifier, `properties.<name>` for an attribute.
    pub feature_id_key: String,
    pub statistics: String,
    pub location_column: String,
    pub value_column: String,
    pub export: Option<PathBuf>,
    pub style: StyleConfig,
}

/// Pipeline B: local boundaries colored by their own computed area.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AreaConfig {
    pub geometry: String,
    pub index_field: String,
    pub preview_rows: usize,
    pub export: Option<PathBuf>,
    pub style: StyleConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub color_scale: ColorScale,
    /// Fixed `[min, max]` of the color axis. Taken from the data when absent.
    pub range: Option<[f64; 2]>,
    pub scope: Scope,
    pub margin: Margin,
    /// Display names for value columns, shown as the legend title.
    pub labels: HashMap<String, String>,
    pub width: u32,
    pub height: u32,
    pub legend: bool,
    pub legend_width: u32,
    pub background: String,
    pub missing_color: String,
    pub border_color: Option<String>,
    /// TrueType font for legend text. Common system locations are searched when unset.
    pub font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct Margin {
    #[serde(alias = "t")]
    pub top: u32,
    #[serde(alias = "r")]
    pub right: u32,
    #[serde(alias = "b")]
    pub bottom: u32,
    #[serde(alias = "l")]
    pub left: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ChoroplethConfig {
    fn default() -> Self {
        Self {
            geometry: COUNTIES_GEOJSON_URL.to_string(),
            feature_id_key: "id".to_string(),
            statistics: UNEMPLOYMENT_CSV_URL.to_string(),
            location_column: "fips".to_string(),
            value_column: "unemp".to_string(),
            export: Some(PathBuf::from("first-interactive-map-plotly.png")),
            style: StyleConfig {
                color_scale: ColorScale::Viridis,
                range: Some([0.0, 12.0]),
                scope: Scope::Usa,
                margin: Margin::default(),
                labels: HashMap::from([("unemp".to_string(), "unemployment rate".to_string())]),
                border_color: Some("#e5e5e5".to_string()),
                ..StyleConfig::default()
            },
        }
    }
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            geometry: BOROUGHS_SHAPEFILE.to_string(),
            index_field: "BoroName".to_string(),
            preview_rows: 5,
            export: None,
            style: StyleConfig {
                margin: Margin { top: 20, right: 10, bottom: 20, left: 20 },
                ..StyleConfig::default()
            },
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            color_scale: ColorScale::Viridis,
            range: None,
            scope: Scope::Fit,
            margin: Margin::default(),
            labels: HashMap::new(),
            width: 1000,
            height: 600,
            legend: true,
            legend_width: 140,
            background: "#ffffff".to_string(),
            missing_color: "#d3d3d3".to_string(),
            border_color: None,
            font: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8050 }
    }
}

impl StyleConfig {
    /// Legend title for a value column: its configured label, or the column name.
    pub fn label_for<'a>(&'a self, column: &'a str) -> &'a str {
        self.labels.get(column).map(String::as_str).unwrap_or(column)
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Built-in defaults unless a config file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_demo_literals() {
        let config = AppConfig::default();
        assert_eq!(config.choropleth.location_column, "fips");
        assert_eq!(config.choropleth.style.range, Some([0.0, 12.0]));
        assert_eq!(config.choropleth.style.scope, Scope::Usa);
        assert_eq!(config.choropleth.style.label_for("unemp"), "unemployment rate");
        assert_eq!(config.choropleth.export, Some(PathBuf::from("first-interactive-map-plotly.png")));
        assert_eq!(config.area.index_field, "BoroName");
        assert_eq!(config.area.style.range, None);
        assert_eq!(config.area.style.label_for("area"), "area");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[choropleth]
statistics = "local/unemp.csv"

[choropleth.style]
color_scale = "plasma"
margin = {{ r = 5, t = 6 }}

[server]
port = 9000
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.choropleth.statistics, "local/unemp.csv");
        assert_eq!(config.choropleth.geometry, COUNTIES_GEOJSON_URL);
        assert_eq!(config.choropleth.style.color_scale, ColorScale::Plasma);
        assert_eq!(config.choropleth.style.margin, Margin { top: 6, right: 5, bottom: 0, left: 0 });
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.area.geometry, BOROUGHS_SHAPEFILE);
    }

    #[test]
    fn unknown_scale_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[area.style]\ncolor_scale = \"rainbow\"").unwrap();
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }
}
