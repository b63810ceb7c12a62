//! Local folder registry
//!
//! Layout: `<root>/<id-lower>/index.json` holds the package document and
//! artifacts live next to it. Without an explicit artifact URL the file is
//! `<id-lower>.<version>.tgz`.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::LoaderError;
use crate::package::{DependencyEdge, PackageId, PackageIdentity, PackageVersion, Platform};
use crate::source::integrity::verify_sha256;
use crate::source::types::PackageDocument;
use crate::source::PackageRegistry;

/// Package index file name inside each package directory
pub const INDEX_FILE: &str = "index.json";

/// Registry backed by a directory tree
pub struct LocalRegistry {
    root: PathBuf,
    name: String,
    max_download_bytes: u64,
}

impl LocalRegistry {
    pub fn new<P: AsRef<Path>>(root: P, max_download_bytes: u64) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            name: root.display().to_string(),
            root,
            max_download_bytes,
        }
    }

    fn package_dir(&self, id: &PackageId) -> PathBuf {
        self.root.join(id.normalized())
    }

    fn registry_error(&self, message: String) -> LoaderError {
        LoaderError::Registry {
            registry: self.name.clone(),
            message,
        }
    }

    async fn document(&self, id: &PackageId) -> Result<Option<PackageDocument>, LoaderError> {
        let path = self.package_dir(id).join(INDEX_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index for {} at {:?}", id, path);
                return Ok(None);
            }
            Err(e) => {
                return Err(self.registry_error(format!("failed to read {:?}: {}", path, e)));
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| self.registry_error(format!("malformed index {:?}: {}", path, e)))
    }

    async fn require_document(&self, identity: &PackageIdentity) -> Result<PackageDocument, LoaderError> {
        self.document(&identity.id)
            .await?
            .ok_or_else(|| self.registry_error(format!("{} is not published", identity.id)))
    }
}

#[async_trait]
impl PackageRegistry for LocalRegistry {
    fn name(&self) -> &str {
        &self.name
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
        let document = self.require_document(identity).await?;
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

        let document = self.require_document(identity).await?;
        let artifact = document
            .version(&identity.version)
            .and_then(|v| v.artifact.clone());

        let dir = self.package_dir(&identity.id);
        let path = match artifact.as_ref() {
            Some(info) => dir.join(info.url.strip_prefix("file://").unwrap_or(&info.url)),
            None => dir.join(format!("{}.tgz", identity.file_stem())),
        };

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| download_error(format!("artifact {:?}: {}", path, e)))?;
        if metadata.len() > self.max_download_bytes {
            return Err(download_error(format!(
                "artifact is {} bytes, limit is {}",
                metadata.len(),
                self.max_download_bytes
            )));
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| download_error(format!("artifact {:?}: {}", path, e)))?;
        if let Some(expected) = artifact.as_ref().and_then(|info| info.sha256.as_deref()) {
            verify_sha256(&data, expected, identity)?;
        }
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::integrity::sha256_hex;
    use tempfile::TempDir;

    fn write_package(root: &Path, id: &str, index: &str) -> PathBuf {
        let dir = root.join(id.to_ascii_lowercase());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(INDEX_FILE), index).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_and_dependencies() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            "App",
            r#"{"id":"App","versions":{"1.0.0":{"dependencies":{"any":{"Util":"1.0"}}}}}"#,
        );
        let registry = LocalRegistry::new(temp.path(), 1024);

        let versions = registry.list_versions(&PackageId::new("APP")).await.unwrap();
        assert_eq!(versions, Some(vec![PackageVersion::new(1, 0, 0)]));
        assert_eq!(
            registry.list_versions(&PackageId::new("Other")).await.unwrap(),
            None
        );

        let identity = PackageIdentity::new("App", PackageVersion::new(1, 0, 0));
        let deps = registry.dependencies(&identity, &Platform::current()).await.unwrap();
        assert_eq!(deps[0].id.as_str(), "Util");
    }

    #[tokio::test]
    async fn test_download_default_file_name() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "Util", r#"{"versions":{"1.0.0":{}}}"#);
        std::fs::write(dir.join("util.1.0.0.tgz"), b"payload").unwrap();

        let registry = LocalRegistry::new(temp.path(), 1024);
        let identity = PackageIdentity::new("Util", PackageVersion::new(1, 0, 0));
        assert_eq!(registry.download(&identity).await.unwrap().as_ref(), b"payload");

        let small = LocalRegistry::new(temp.path(), 3);
        assert!(matches!(
            small.download(&identity).await,
            Err(LoaderError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_verifies_integrity() {
        let temp = TempDir::new().unwrap();
        let index = format!(
            r#"{{"versions":{{"1.0.0":{{"artifact":{{"url":"blob.tgz","sha256":"{}"}}}}}}}}"#,
            sha256_hex(b"expected")
        );
        let dir = write_package(temp.path(), "Lib", &index);
        std::fs::write(dir.join("blob.tgz"), b"tampered").unwrap();

        let registry = LocalRegistry::new(temp.path(), 1024);
        let identity = PackageIdentity::new("Lib", PackageVersion::new(1, 0, 0));
        let err = registry.download(&identity).await.unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }

    #[tokio::test]
    async fn test_malformed_index() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "Bad", "{ not json");
        let registry = LocalRegistry::new(temp.path(), 1024);
        assert!(matches!(
            registry.list_versions(&PackageId::new("Bad")).await,
            Err(LoaderError::Registry { .. })
        ));
    }
}
