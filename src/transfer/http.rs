//! HTTP(S) provider: GET on fetch, PUT on store.

use camino::Utf8Path;
use reqwest::StatusCode;
use tokio::fs;

use super::{FileProvider, ProviderFuture, TransferError};

/// Provider handling `http://` and `https://` locators.
#[derive(Clone, Debug, Default)]
pub struct HttpFileProvider {
    client: reqwest::Client,
}

impl HttpFileProvider {
    /// Creates a provider with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider reusing an existing client, so callers can share
    /// connection pools or supply custom TLS settings.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, source: &str, destination: &Utf8Path) -> Result<(), TransferError> {
        let response = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|error| request_failure(source, &error))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransferError::MissingSource {
                locator: source.to_owned(),
            });
        }
        if !response.status().is_success() {
            return Err(TransferError::Http {
                locator: source.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|error| request_failure(source, &error))?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| write_failure(destination, &error))?;
        }
        fs::write(destination, &body)
            .await
            .map_err(|error| write_failure(destination, &error))?;
        Ok(())
    }

    async fn upload(&self, source: &Utf8Path, destination: &str) -> Result<(), TransferError> {
        let body = match fs::read(source).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::MissingSource {
                    locator: source.to_string(),
                });
            }
            Err(error) => return Err(write_failure(source, &error)),
        };
        let response = self
            .client
            .put(destination)
            .body(body)
            .send()
            .await
            .map_err(|error| request_failure(destination, &error))?;
        if !response.status().is_success() {
            return Err(TransferError::Http {
                locator: destination.to_owned(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn request_failure(locator: &str, error: &reqwest::Error) -> TransferError {
    TransferError::Failed {
        locator: locator.to_owned(),
        message: error.to_string(),
    }
}

fn write_failure(path: &Utf8Path, error: &std::io::Error) -> TransferError {
    TransferError::Failed {
        locator: path.to_string(),
        message: error.to_string(),
    }
}

impl FileProvider for HttpFileProvider {
    fn fetch<'a>(&'a self, source: &'a str, destination: &'a Utf8Path) -> ProviderFuture<'a, ()> {
        Box::pin(self.download(source, destination))
    }

    fn store<'a>(&'a self, source: &'a Utf8Path, destination: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.upload(source, destination))
    }
}
