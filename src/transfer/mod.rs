//! File transfer contract and scheme-based provider routing.
//!
//! A [`FileProvider`] moves bytes between a scheme-prefixed locator and a
//! local path. The [`ProviderRouter`] selects among registered providers by
//! locator prefix; a locator without a `scheme://` prefix falls back to the
//! local filesystem provider. A prefixed locator with no matching
//! registration is a configuration error, never a silent fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use camino::Utf8Path;
use thiserror::Error;

mod http;
mod local;

pub use http::HttpFileProvider;
pub use local::LocalFileProvider;

/// Errors surfaced while transferring a file.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransferError {
    /// Raised when the source of a transfer does not exist.
    #[error("source not found: {locator}")]
    MissingSource {
        /// Locator that could not be resolved.
        locator: String,
    },
    /// Raised when a locator carries a scheme no provider is registered for.
    #[error("no file provider registered for scheme {scheme}://")]
    UnknownScheme {
        /// Unrecognised scheme prefix.
        scheme: String,
    },
    /// Raised when an HTTP transfer completes with a non-success status.
    #[error("HTTP transfer of {locator} failed with status {status}")]
    Http {
        /// Locator being transferred.
        locator: String,
        /// HTTP status code returned by the server.
        status: u16,
    },
    /// Raised when a transfer fails for a provider-specific reason.
    #[error("transfer of {locator} failed: {message}")]
    Failed {
        /// Locator being transferred.
        locator: String,
        /// Provider error string.
        message: String,
    },
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Capability to fetch a locator into a local path and push a local path to
/// a locator, polymorphic over locator scheme.
pub trait FileProvider: Send + Sync {
    /// Materialises the file identified by `source` at the local
    /// `destination`, creating parent directories as needed.
    fn fetch<'a>(&'a self, source: &'a str, destination: &'a Utf8Path) -> ProviderFuture<'a, ()>;

    /// Pushes the local file at `source` to the `destination` locator.
    fn store<'a>(&'a self, source: &'a Utf8Path, destination: &'a str) -> ProviderFuture<'a, ()>;
}

/// Routes transfers to registered providers by locator scheme prefix.
#[derive(Clone)]
pub struct ProviderRouter {
    routes: Vec<(String, Arc<dyn FileProvider>)>,
    fallback: Arc<dyn FileProvider>,
}

impl ProviderRouter {
    /// Creates a router with `fallback` handling unprefixed locators.
    #[must_use]
    pub fn new(fallback: Arc<dyn FileProvider>) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
        }
    }

    /// Creates a router with the local filesystem fallback and the HTTP
    /// provider registered for `http://` and `https://`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let http_provider: Arc<dyn FileProvider> = Arc::new(HttpFileProvider::new());
        Self::new(Arc::new(LocalFileProvider))
            .register("http://", Arc::clone(&http_provider))
            .register("https://", http_provider)
    }

    /// Registers `provider` for locators starting with `prefix`.
    #[must_use]
    pub fn register(mut self, prefix: impl Into<String>, provider: Arc<dyn FileProvider>) -> Self {
        self.routes.push((prefix.into(), provider));
        self
    }

    /// Checks that a provider is registered for `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnknownScheme`] when the locator carries a
    /// scheme prefix with no matching registration.
    pub fn recognised(&self, locator: &str) -> Result<(), TransferError> {
        self.provider_for(locator).map(|_| ())
    }

    /// Fetches `source` into the local `destination` via the matching
    /// provider.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] from routing or from the provider.
    pub async fn fetch(&self, source: &str, destination: &Utf8Path) -> Result<(), TransferError> {
        self.provider_for(source)?.fetch(source, destination).await
    }

    /// Pushes the local `source` to the `destination` locator via the
    /// matching provider.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] from routing or from the provider.
    pub async fn store(&self, source: &Utf8Path, destination: &str) -> Result<(), TransferError> {
        self.provider_for(destination)?
            .store(source, destination)
            .await
    }

    fn provider_for(&self, locator: &str) -> Result<&Arc<dyn FileProvider>, TransferError> {
        let Some((scheme, _)) = locator.split_once("://") else {
            return Ok(&self.fallback);
        };
        self.routes
            .iter()
            .find(|(prefix, _)| locator.starts_with(prefix.as_str()))
            .map(|(_, provider)| provider)
            .ok_or_else(|| TransferError::UnknownScheme {
                scheme: scheme.to_owned(),
            })
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes = self
            .routes
            .iter()
            .map(|(prefix, _)| prefix.as_str())
            .collect::<Vec<_>>();
        f.debug_struct("ProviderRouter")
            .field("routes", &prefixes)
            .finish()
    }
}

impl FileProvider for ProviderRouter {
    fn fetch<'a>(&'a self, source: &'a str, destination: &'a Utf8Path) -> ProviderFuture<'a, ()> {
        Box::pin(Self::fetch(self, source, destination))
    }

    fn store<'a>(&'a self, source: &'a Utf8Path, destination: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(Self::store(self, source, destination))
    }
}
