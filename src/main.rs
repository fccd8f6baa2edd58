use clap::{Parser, Subcommand};
use geochart::config::AppConfig;
use geochart::pipeline::{self, Display};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Color US counties by unemployment rate, show the map and save it as PNG
    Choropleth {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Skip the interactive viewer
        #[arg(long)]
        no_show: bool,
    },
    /// Color boroughs by their computed area and show the map
    Area {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Skip the interactive viewer
        #[arg(long)]
        no_show: bool,
    },
}

fn display(no_show: bool) -> Display {
    if no_show { Display::Skip } else { Display::Interactive }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Choropleth { config, no_show } => {
            let app_config = AppConfig::load(config.as_deref())?;
            pipeline::run_choropleth(&app_config.choropleth, &app_config.server, display(*no_show))?;
        }
        Commands::Area { config, no_show } => {
            let app_config = AppConfig::load(config.as_deref())?;
            pipeline::run_area(&app_config.area, &app_config.server, display(*no_show))?;
        }
    }

    Ok(())
}
