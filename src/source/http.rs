//! HTTP package registry
//!
//! `GET {base}/packages/{id-lower}` returns the package document; a 404
//! means the registry does not carry the package. Relative artifact URLs
//! resolve against `{base}/packages/{id-lower}/`.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::LoaderError;
use crate::package::{DependencyEdge, PackageId, PackageIdentity, PackageVersion, Platform};
use crate::source::integrity::verify_sha256;
use crate::source::types::PackageDocument;
use crate::source::{PackageRegistry, RegistryOptions};

/// Registry served over HTTP(S)
pub struct HttpRegistry {
    base: String,
    client: reqwest::Client,
    max_download_bytes: u64,
    /// Package documents already fetched, `None` for packages the server lacks
    documents: Mutex<HashMap<PackageId, Option<PackageDocument>>>,
}

impl HttpRegistry {
    pub fn new(base: &str, options: &RegistryOptions) -> Result<Self, LoaderError> {
        let base = base.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .user_agent(concat!("component-loader/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| LoaderError::Registry {
                registry: base.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            base,
            client,
            max_download_bytes: options.max_download_bytes,
            documents: Mutex::new(HashMap::new()),
        })
    }

    fn package_url(&self, id: &PackageId) -> String {
        format!("{}/packages/{}", self.base, id.normalized())
    }

    fn artifact_url(&self, identity: &PackageIdentity, declared: Option<&str>) -> String {
        match declared {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
            Some(url) => format!(
                "{}/{}",
                self.package_url(&identity.id),
                url.trim_start_matches('/')
            ),
            None => format!(
                "{}/{}.tgz",
                self.package_url(&identity.id),
                identity.file_stem()
            ),
        }
    }

    fn registry_error(&self, message: String) -> LoaderError {
        LoaderError::Registry {
            registry: self.base.clone(),
            message,
        }
    }

    async fn document(&self, id: &PackageId) -> Result<Option<PackageDocument>, LoaderError> {
        if let Some(cached) = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(cached.clone());
        }

        let url = self.package_url(id);
        debug!("Fetching package document: {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.registry_error(format!("request to {} failed: {}", url, e)))?;

        let document = if response.status() == reqwest::StatusCode::NOT_FOUND {
            None
        } else if !response.status().is_success() {
            return Err(self.registry_error(format!("{} returned {}", url, response.status())));
        } else {
            let document = response
                .json::<PackageDocument>()
                .await
                .map_err(|e| self.registry_error(format!("malformed document at {}: {}", url, e)))?;
            Some(document)
        };

        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), document.clone());
        Ok(document)
    }
}

/// Read a response body, failing once it exceeds `max_size` bytes
async fn download_with_limit(response: reqwest::Response, max_size: u64) -> Result<Vec<u8>, String> {
    use futures::StreamExt;

    let capacity = usize::try_from(response.content_length().unwrap_or(0).min(max_size)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download error: {}", e))?;
        bytes.extend_from_slice(&chunk);
        let current_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if current_size > max_size {
            return Err(format!("artifact exceeds {} bytes", max_size));
        }
    }

    Ok(bytes)
}

#[async_trait]
impl PackageRegistry for HttpRegistry {
    fn name(&self) -> &str {
        &self.base
    }

    async fn list_versions(
        &self,
        id: &PackageId,
    ) -> Result<Option<Vec<PackageVersion>>, LoaderError> {
        Ok(self.document(id).await?.map(|doc| doc.versions()))
    }

    async fn dependencies(
        &self,
        identity: &PackageIdentity,
        platform: &Platform,
    ) -> Result<Vec<DependencyEdge>, LoaderError> {
        let document = self
            .document(&identity.id)
            .await?
            .ok_or_else(|| self.registry_error(format!("{} is not published", identity.id)))?;
        let version = document
            .version(&identity.version)
            .ok_or_else(|| self.registry_error(format!("{} is not published", identity)))?;
        version
            .dependencies_for(platform)
            .map_err(|e| self.registry_error(format!("{}: {}", identity, e)))
    }

    async fn download(&self, identity: &PackageIdentity) -> Result<Bytes, LoaderError> {
        let download_error = |message: String| LoaderError::Download {
            identity: identity.clone(),
            message,
        };

        let artifact = self
            .document(&identity.id)
            .await?
            .and_then(|doc| doc.version(&identity.version).and_then(|v| v.artifact.clone()));
        let url = self.artifact_url(identity, artifact.as_ref().map(|a| a.url.as_str()));
        debug!("Downloading {} from {}", identity, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| download_error(format!("request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(download_error(format!("{} returned {}", url, response.status())));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_download_bytes {
                return Err(download_error(format!(
                    "artifact is {} bytes, limit is {}",
                    len, self.max_download_bytes
                )));
            }
        }

        let data = download_with_limit(response, self.max_download_bytes)
            .await
            .map_err(download_error)?;
        if let Some(expected) = artifact.as_ref().and_then(|a| a.sha256.as_deref()) {
            verify_sha256(&data, expected, identity)?;
        }
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_urls() {
        let registry =
            HttpRegistry::new("https://example.test/v1/", &RegistryOptions::default()).unwrap();
        let identity = PackageIdentity::new("App", PackageVersion::new(1, 2, 0));

        assert_eq!(
            registry.artifact_url(&identity, None),
            "https://example.test/v1/packages/app/app.1.2.0.tgz"
        );
        assert_eq!(
            registry.artifact_url(&identity, Some("files/a.tgz")),
            "https://example.test/v1/packages/app/files/a.tgz"
        );
        assert_eq!(
            registry.artifact_url(&identity, Some("https://cdn.test/a.tgz")),
            "https://cdn.test/a.tgz"
        );
    }
}
