//! Flat layout extraction
//!
//! Every artifact of a resolved set contributes the binaries of its binary
//! group nearest to the target platform. They are copied into one flat
//! directory per root, keeping only file names, so the root binary finds
//! its whole private dependency set next to itself. Non-binary payload goes
//! to a separate content root. A marker file records which resolved set and
//! which fetched artifacts produced the layout; a matching marker means the
//! layout is reused.

pub mod archive;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::LoaderError;
use crate::fetch::FetchedArtifact;
use crate::package::{PackageIdentity, PackageManifest, Platform};
use crate::resolver::ResolvedSet;

use archive::{read_artifact, ArchiveFile};

/// Marker file written into a finished flat layout
pub const LAYOUT_MARKER: &str = ".layout.json";

/// Extracted binaries are never given more than these permission bits
const MODE_MASK: u32 = 0o755;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LayoutMarker {
    fingerprint: String,
    platform: String,
    root_binary: String,
    binaries: Vec<String>,
}

/// Result of extracting one resolved set
#[derive(Debug, Clone)]
pub struct ExtractedLayout {
    pub root: PackageIdentity,
    /// Flat directory holding every binary
    pub binary_dir: PathBuf,
    /// Directory holding non-binary payload
    pub content_dir: PathBuf,
    /// Binaries present in `binary_dir`
    pub binaries: Vec<PathBuf>,
    /// Binary to launch
    pub root_binary: PathBuf,
    /// Manifest of the root package, if it shipped one
    pub manifest: Option<PackageManifest>,
    /// Layout was already on disk and not re-extracted
    pub reused: bool,
}

/// Lays fetched artifacts out as flat binary directories
#[derive(Debug, Clone)]
pub struct LayoutExtractor {
    layouts_root: PathBuf,
    content_root: PathBuf,
}

impl LayoutExtractor {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(layouts_root: P, content_root: Q) -> Self {
        Self {
            layouts_root: layouts_root.as_ref().to_path_buf(),
            content_root: content_root.as_ref().to_path_buf(),
        }
    }

    /// Flat directory for a root identity
    pub fn binary_dir_for(&self, root: &PackageIdentity) -> PathBuf {
        self.layouts_root.join(root.file_stem())
    }

    /// Content directory for a root identity
    pub fn content_dir_for(&self, root: &PackageIdentity) -> PathBuf {
        self.content_root.join(root.file_stem())
    }

    /// Produce the flat layout for `resolved`, reusing a matching one
    ///
    /// `artifacts` must hold the root's artifact; dependencies without an
    /// artifact are left out of the layout.
    pub fn extract(
        &self,
        resolved: &ResolvedSet,
        artifacts: &[FetchedArtifact],
        platform: &Platform,
    ) -> Result<ExtractedLayout, LoaderError> {
        let root = resolved.root().identity.clone();
        let binary_dir = self.binary_dir_for(&root);
        let content_dir = self.content_dir_for(&root);
        let fingerprint = layout_fingerprint(resolved, artifacts);

        if let Some(layout) = self.reuse(&root, &binary_dir, &content_dir, &fingerprint, platform) {
            info!("Reusing flat layout for {} at {:?}", root, binary_dir);
            return Ok(layout);
        }

        let root_artifact = artifacts
            .iter()
            .find(|a| a.identity == root)
            .ok_or_else(|| LoaderError::extraction(&root, "root artifact was not fetched"))?;
        let ordered: Vec<&FetchedArtifact> = std::iter::once(root_artifact)
            .chain(artifacts.iter().filter(|a| a.identity != root))
            .collect();

        let layout = extract_into(&root, &ordered, platform, &binary_dir, &content_dir)?;

        let marker = LayoutMarker {
            fingerprint,
            platform: platform.to_string(),
            root_binary: file_name_of(&layout.root_binary),
            binaries: layout.binaries.iter().map(|p| file_name_of(p)).collect(),
        };
        let json = serde_json::to_vec_pretty(&marker)
            .map_err(|e| LoaderError::extraction(&root, format!("failed to encode marker: {}", e)))?;
        std::fs::write(binary_dir.join(LAYOUT_MARKER), json)?;

        Ok(layout)
    }

    fn reuse(
        &self,
        root: &PackageIdentity,
        binary_dir: &Path,
        content_dir: &Path,
        fingerprint: &str,
        platform: &Platform,
    ) -> Option<ExtractedLayout> {
        let bytes = std::fs::read(binary_dir.join(LAYOUT_MARKER)).ok()?;
        let marker: LayoutMarker = match serde_json::from_slice(&bytes) {
            Ok(marker) => marker,
            Err(e) => {
                debug!("Ignoring unreadable layout marker in {:?}: {}", binary_dir, e);
                return None;
            }
        };
        if marker.fingerprint != fingerprint || marker.platform != platform.to_string() {
            debug!("Layout at {:?} is stale", binary_dir);
            return None;
        }

        let root_binary = binary_dir.join(&marker.root_binary);
        let binaries: Vec<PathBuf> = marker.binaries.iter().map(|b| binary_dir.join(b)).collect();
        if !root_binary.is_file() || binaries.iter().any(|b| !b.is_file()) {
            return None;
        }

        Some(ExtractedLayout {
            root: root.clone(),
            binary_dir: binary_dir.to_path_buf(),
            content_dir: content_dir.to_path_buf(),
            binaries,
            root_binary,
            manifest: None,
            reused: true,
        })
    }
}

/// Fingerprint of a resolved set plus the artifacts actually available
///
/// A dependency whose download was skipped leaves a different fingerprint
/// than the complete set, so a later run that has its artifact re-extracts.
fn layout_fingerprint(resolved: &ResolvedSet, artifacts: &[FetchedArtifact]) -> String {
    let mut extracted: Vec<String> = artifacts
        .iter()
        .map(|a| format!("{}@{}", a.identity.id.normalized(), a.identity.version))
        .collect();
    extracted.sort();
    extracted.dedup();

    let mut hasher = Sha256::new();
    hasher.update(resolved.fingerprint().as_bytes());
    for identity in &extracted {
        hasher.update(b"\n");
        hasher.update(identity.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Extract artifacts into a flat binary directory and a content directory
///
/// The first artifact is the root. Re-extracting over an existing directory
/// overwrites same-named files. When two artifacts ship the same binary
/// file name the later one wins.
pub fn extract_into(
    root: &PackageIdentity,
    artifacts: &[&FetchedArtifact],
    platform: &Platform,
    binary_dir: &Path,
    content_dir: &Path,
) -> Result<ExtractedLayout, LoaderError> {
    std::fs::create_dir_all(binary_dir)?;

    let mut owners: HashMap<String, PackageIdentity> = HashMap::new();
    let mut binaries: Vec<PathBuf> = Vec::new();
    let mut root_manifest = None;

    for artifact in artifacts {
        let identity = &artifact.identity;
        let contents = read_artifact(&artifact.path)
            .map_err(|e| LoaderError::extraction(identity, e))?;

        let groups = contents.binary_groups();
        match platform.nearest(groups.as_slice()) {
            Some(index) => {
                let group = &groups[index];
                debug!("Using binary group {} of {}", group, identity);
                for (file, relative) in contents.binaries_in(group) {
                    let Some(name) = relative.file_name().map(|n| n.to_string_lossy().to_string())
                    else {
                        continue;
                    };
                    if let Some(previous) = owners.insert(name.clone(), identity.clone()) {
                        if &previous != identity {
                            warn!(
                                "Binary {} from {} replaces the copy from {} in {:?}",
                                name, identity, previous, binary_dir
                            );
                        }
                    }
                    let target = binary_dir.join(&name);
                    write_file(&target, file)?;
                    if !binaries.contains(&target) {
                        binaries.push(target);
                    }
                }
            }
            None if groups.is_empty() => debug!("{} ships no binaries", identity),
            None => warn!(
                "{} has no binaries for platform {} (groups: {})",
                identity,
                platform,
                groups.join(", ")
            ),
        }

        for (file, relative) in contents.content() {
            let target = content_dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_file(&target, file)?;
        }

        if identity == root {
            root_manifest = contents.manifest;
        }
    }

    let entry_point = match root_manifest.as_ref() {
        Some(manifest) => manifest.entry_point_or(&root.id),
        None => root.id.as_str().to_string(),
    };
    let root_binary = binary_dir.join(format!("{}{}", entry_point, std::env::consts::EXE_SUFFIX));
    if !root_binary.is_file() {
        return Err(LoaderError::extraction(
            root,
            format!("root binary {:?} not found for platform {}", root_binary, platform),
        ));
    }

    info!(
        "Extracted {} binaries for {} into {:?}",
        binaries.len(),
        root,
        binary_dir
    );
    Ok(ExtractedLayout {
        root: root.clone(),
        binary_dir: binary_dir.to_path_buf(),
        content_dir: content_dir.to_path_buf(),
        binaries,
        root_binary,
        manifest: root_manifest,
        reused: false,
    })
}

fn write_file(target: &Path, file: &ArchiveFile) -> Result<(), LoaderError> {
    std::fs::write(target, &file.data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = (file.mode & MODE_MASK) | 0o600;
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = file.mode & MODE_MASK;
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageVersion;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_tgz(dir: &Path, name: &str, files: &[(&str, &[u8], u32)]) -> PathBuf {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        let path = dir.join(name);
        std::fs::write(&path, builder.into_inner().unwrap().finish().unwrap()).unwrap();
        path
    }

    fn artifact(dir: &Path, id: &str, files: &[(&str, &[u8], u32)]) -> FetchedArtifact {
        FetchedArtifact {
            identity: PackageIdentity::new(id, PackageVersion::new(1, 0, 0)),
            path: write_tgz(dir, &format!("{}.tgz", id), files),
            cached: false,
        }
    }

    #[test]
    fn test_extract_into_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let root_binary = format!("bin/any/app{}", std::env::consts::EXE_SUFFIX);
        let root = artifact(
            temp.path(),
            "app",
            &[(root_binary.as_str(), b"app", 0o755), ("content/a.txt", b"a", 0o644)],
        );
        let dep = artifact(temp.path(), "dep", &[("bin/linux/libdep.so", b"dep", 0o644)]);
        let platform = Platform::new("linux-x86_64");
        let binary_dir = temp.path().join("flat");
        let content_dir = temp.path().join("content");

        let first = extract_into(&root.identity, &[&root, &dep], &platform, &binary_dir, &content_dir)
            .unwrap();
        let second = extract_into(&root.identity, &[&root, &dep], &platform, &binary_dir, &content_dir)
            .unwrap();

        assert_eq!(first.binaries, second.binaries);
        assert_eq!(first.root_binary, second.root_binary);
        assert_eq!(std::fs::read(binary_dir.join("libdep.so")).unwrap(), b"dep");
        assert_eq!(std::fs::read(content_dir.join("a.txt")).unwrap(), b"a");
        assert!(first.manifest.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_special_mode_bits_are_dropped() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root_binary = format!("bin/any/app{}", std::env::consts::EXE_SUFFIX);
        let root = artifact(temp.path(), "app", &[(root_binary.as_str(), b"app", 0o4777)]);
        let binary_dir = temp.path().join("flat");

        let layout = extract_into(
            &root.identity,
            &[&root],
            &Platform::any(),
            &binary_dir,
            &temp.path().join("content"),
        )
        .unwrap();
        let mode = std::fs::metadata(&layout.root_binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }
}
