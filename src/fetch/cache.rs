//! On-disk artifact cache
//!
//! `<root>/<id-lower>/<version>/<id-lower>.<version>.tgz`. Writes go to a
//! temporary file in the target directory and are renamed into place, so
//! concurrent writers of the same key leave one complete file.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::LoaderError;
use crate::package::PackageIdentity;

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the cached artifact for `identity`
    pub fn path_for(&self, identity: &PackageIdentity) -> PathBuf {
        self.root
            .join(identity.id.normalized())
            .join(identity.version.to_string())
            .join(format!("{}.tgz", identity.file_stem()))
    }

    /// Cached artifact path, if present
    pub fn lookup(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        let path = self.path_for(identity);
        path.is_file().then_some(path)
    }

    /// Store artifact bytes atomically and return the final path
    pub fn store(&self, identity: &PackageIdentity, data: &[u8]) -> Result<PathBuf, LoaderError> {
        let path = self.path_for(identity);
        let dir = path
            .parent()
            .ok_or_else(|| LoaderError::Config(format!("invalid cache path {:?}", path)))?;
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| LoaderError::Io(e.error))?;

        debug!("Cached {} at {:?}", identity, path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageVersion;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_lookup() {
        let temp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(temp.path());
        let identity = PackageIdentity::new("Util", PackageVersion::new(1, 2, 0));

        assert!(cache.lookup(&identity).is_none());
        let path = cache.store(&identity, b"first").unwrap();
        assert!(path.ends_with("util/1.2.0/util.1.2.0.tgz"));
        assert_eq!(cache.lookup(&identity), Some(path.clone()));

        cache.store(&identity, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
