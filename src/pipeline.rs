use crate::config::{AreaConfig, ChoroplethConfig, ServerConfig};
use crate::data;
use crate::fetch::Source;
use crate::processing;
use crate::render::Figure;
use crate::server;
use anyhow::Result;
use tracing::info;

// Each pipeline stops at the first failing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Interactive,
    Skip,
}

/// Boundaries and a statistic table, joined on region id and colored by value.
pub fn run_choropleth(config: &ChoroplethConfig, server_config: &ServerConfig, display: Display) -> Result<Figure> {
    let regions = data::load_geometry(&Source::parse(&config.geometry), &config.feature_id_key)?;
    let table = data::load_statistics(
        &Source::parse(&config.statistics),
        &config.location_column,
        &config.value_column,
    )?;

    let joined = processing::join(&regions, &table);
    let figure = Figure::render(&regions, &joined.values, &config.style, &config.value_column)?;

    if display == Display::Interactive {
        server::show(&figure, server_config)?;
    }
    if let Some(path) = &config.export {
        figure.save(path)?;
    }

    info!("Choropleth pipeline finished");
    Ok(figure)
}

/// Local boundaries colored by the planar area of each region.
pub fn run_area(config: &AreaConfig, server_config: &ServerConfig, display: Display) -> Result<Figure> {
    let mut regions = data::load_geometry(&Source::parse(&config.geometry), &config.index_field)?;
    print!("{}", processing::head(&regions, config.preview_rows));

    let areas = processing::derive_area(&mut regions);
    print!("{}", processing::format_series(&regions, &areas, "area"));

    let figure = Figure::render(&regions, &areas, &config.style, "area")?;

    if display == Display::Interactive {
        server::show(&figure, server_config)?;
    }
    if let Some(path) = &config.export {
        figure.save(path)?;
    }

    info!("Area pipeline finished");
    Ok(figure)
}
