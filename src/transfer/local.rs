//! Local filesystem provider: copies files between local paths.

use camino::Utf8Path;
use tokio::fs;

use super::{FileProvider, ProviderFuture, TransferError};

/// Provider handling unprefixed locators as local filesystem paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileProvider;

impl LocalFileProvider {
    async fn copy(source: &Utf8Path, destination: &Utf8Path) -> Result<(), TransferError> {
        let exists = fs::try_exists(source)
            .await
            .map_err(|error| io_failure(source.as_str(), &error))?;
        if !exists {
            return Err(TransferError::MissingSource {
                locator: source.to_string(),
            });
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| io_failure(destination.as_str(), &error))?;
        }
        fs::copy(source, destination)
            .await
            .map_err(|error| io_failure(source.as_str(), &error))?;
        Ok(())
    }
}

fn io_failure(locator: &str, error: &std::io::Error) -> TransferError {
    TransferError::Failed {
        locator: locator.to_owned(),
        message: error.to_string(),
    }
}

impl FileProvider for LocalFileProvider {
    fn fetch<'a>(&'a self, source: &'a str, destination: &'a Utf8Path) -> ProviderFuture<'a, ()> {
        Box::pin(Self::copy(Utf8Path::new(source), destination))
    }

    fn store<'a>(&'a self, source: &'a Utf8Path, destination: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(Self::copy(source, Utf8Path::new(destination)))
    }
}
