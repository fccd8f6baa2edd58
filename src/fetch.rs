use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Remote(location.to_string())
        } else {
            Source::Local(PathBuf::from(location))
        }
    }

    /// Lowercased extension of the path or URL, ignoring any query string.
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Source::Remote(url) => {
                let trimmed = url.split(['?', '#']).next().unwrap_or(url);
                Path::new(trimmed).extension()?.to_str()?.to_lowercase()
            }
            Source::Local(path) => path.extension()?.to_str()?.to_lowercase(),
        };
        Some(path)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote(url) => write!(f, "{}", url),
            Source::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Read the whole source into memory. Blocks until done; never retries.
pub fn fetch_bytes(source: &Source) -> Result<Vec<u8>> {
    match source {
        Source::Remote(url) => fetch_remote(url),
        Source::Local(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {:?}", path)),
    }
}

fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    info!("Fetching {}", url);
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Server refused {}", url))?;
    let body = resp
        .bytes()
        .with_context(|| format!("Failed to read response body from {}", url))?;
    info!("Fetched {} bytes from {}", body.len(), url);
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_remote_everything_else_local() {
        assert_eq!(
            Source::parse("https://example.org/a.csv"),
            Source::Remote("https://example.org/a.csv".to_string())
        );
        assert_eq!(Source::parse("data/nybb.shp"), Source::Local(PathBuf::from("data/nybb.shp")));
    }

    #[test]
    fn extension_ignores_query_and_case() {
        assert_eq!(Source::parse("https://x.org/c.GeoJSON?raw=1").extension().as_deref(), Some("geojson"));
        assert_eq!(Source::parse("boroughs/nybb.SHP").extension().as_deref(), Some("shp"));
        assert_eq!(Source::parse("no_extension").extension(), None);
    }

    #[test]
    fn missing_local_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_bytes(&Source::Local(dir.path().join("absent.csv"))).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.csv"));
    }

    #[test]
    fn local_file_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "fips,unemp\n01001,5.3\n").unwrap();
        assert_eq!(fetch_bytes(&Source::Local(path)).unwrap(), b"fips,unemp\n01001,5.3\n");
    }
}
