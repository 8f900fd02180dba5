//! Dataset sources: a local parquet file or a remote URL fetched as bytes.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

const USER_AGENT: &str = concat!("marketlens/", env!("CARGO_PKG_VERSION"));
const PARQUET_EXTENSION: &str = "parquet";

/// Errors while obtaining dataset bytes
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file extension for {name}: expected a .parquet file")]
    UnsupportedExtension { name: String },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("another load is already in progress")]
    Busy,

    #[error(transparent)]
    Engine(#[from] crate::query::QueryError),
}

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    File(PathBuf),
    Url(String),
}

fn has_parquet_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PARQUET_EXTENSION))
}

impl LoadSource {
    /// Accept a local file only if it carries a `.parquet` extension.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        if !has_parquet_extension(&path) {
            return Err(LoadError::UnsupportedExtension {
                name: path.display().to_string(),
            });
        }
        Ok(Self::File(path))
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Name the bytes are registered under: the file name, or the last URL
    /// path segment (`data.parquet` when there is none).
    pub fn name(&self) -> String {
        match self {
            LoadSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            LoadSource::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                let rest = path.split_once("://").map_or(path, |(_, rest)| rest);
                rest.split_once('/')
                    .and_then(|(_, p)| p.rsplit('/').next())
                    .filter(|tail| !tail.is_empty())
                    .unwrap_or("data.parquet")
                    .to_string()
            }
        }
    }

    /// Read the raw bytes.
    pub async fn fetch(&self) -> Result<Bytes, LoadError> {
        match self {
            LoadSource::File(path) => {
                if !has_parquet_extension(path) {
                    return Err(LoadError::UnsupportedExtension {
                        name: path.display().to_string(),
                    });
                }
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|source| LoadError::ReadFile {
                        path: path.clone(),
                        source,
                    })?;
                Ok(Bytes::from(data))
            }
            LoadSource::Url(url) => fetch_url(url).await,
        }
    }
}

async fn fetch_url(url: &str) -> Result<Bytes, LoadError> {
    let fetch_err = |source: reqwest::Error| LoadError::Fetch {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(fetch_err)?;
    let response = client.get(url).send().await.map_err(fetch_err)?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(fetch_err)?;
    tracing::debug!(url, bytes = body.len(), "dataset fetched");
    Ok(body)
}
