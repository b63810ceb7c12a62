//! Safe reading of package artifacts (`.tgz`)
//!
//! Entries are validated before anything touches the filesystem:
//! - no absolute paths or `..` components
//! - only regular files, directories and metadata headers
//! - bounded entry count and total size

use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::package::{PackageManifest, MANIFEST_FILE};

/// Maximum number of entries allowed in an artifact
const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total unpacked size (500 MB)
const MAX_EXTRACTED_SIZE: u64 = 500_000_000;

/// Top-level directory holding per-platform binary groups
pub const BIN_DIR: &str = "bin";

/// Top-level directory holding non-binary payload
pub const CONTENT_DIR: &str = "content";

/// A regular file read from an artifact
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    /// Normalized relative path inside the artifact
    pub path: PathBuf,
    pub mode: u32,
    pub data: Vec<u8>,
}

/// Everything of interest inside one artifact
#[derive(Debug, Clone, Default)]
pub struct ArtifactContents {
    pub manifest: Option<PackageManifest>,
    pub files: Vec<ArchiveFile>,
}

impl ArtifactContents {
    /// Platform descriptors of the binary groups, in archive order
    pub fn binary_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for file in &self.files {
            if let Some((group, _)) = split_binary_path(&file.path) {
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }
        groups
    }

    /// Files of one binary group with their path below the group directory
    pub fn binaries_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = (&'a ArchiveFile, PathBuf)> + 'a {
        self.files.iter().filter_map(move |file| {
            split_binary_path(&file.path)
                .filter(|(g, _)| g == group)
                .map(|(_, rest)| (file, rest))
        })
    }

    /// Non-binary payload with its path below `content/`
    pub fn content(&self) -> impl Iterator<Item = (&ArchiveFile, PathBuf)> + '_ {
        self.files.iter().filter_map(|file| {
            file.path
                .strip_prefix(CONTENT_DIR)
                .ok()
                .filter(|rest| !rest.as_os_str().is_empty())
                .map(|rest| (file, rest.to_path_buf()))
        })
    }
}

/// `bin/<group>/<rest>` → `(group, rest)`
fn split_binary_path(path: &Path) -> Option<(String, PathBuf)> {
    let mut components = path.components();
    if components.next()?.as_os_str() != BIN_DIR {
        return None;
    }
    let group = components.next()?.as_os_str().to_string_lossy().to_string();
    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        return None;
    }
    Some((group, rest))
}

/// Read an artifact from disk
pub fn read_artifact(path: &Path) -> Result<ArtifactContents, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("failed to open {:?}: {}", path, e))?;
    read_archive(file)
}

/// Read a gzip-compressed tar stream
pub fn read_archive<R: Read>(reader: R) -> Result<ArtifactContents, String> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut contents = ArtifactContents::default();
    let mut entry_count = 0usize;
    let mut total_size: u64 = 0;

    let entries = archive
        .entries()
        .map_err(|e| format!("failed to read archive entries: {}", e))?;
    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| format!("failed to read archive entry: {}", e))?;

        entry_count = entry_count.saturating_add(1);
        if entry_count > MAX_ENTRY_COUNT {
            return Err(format!("archive exceeds maximum entry count ({})", MAX_ENTRY_COUNT));
        }

        let entry_type = entry.header().entry_type();
        if !is_safe_entry_type(entry_type) {
            let entry_path = entry
                .path()
                .map_or_else(|_| "<unknown>".to_string(), |p| p.display().to_string());
            return Err(format!("unsafe entry type {:?}: {}", entry_type, entry_path));
        }

        let entry_size = entry
            .header()
            .size()
            .map_err(|e| format!("failed to read entry size: {}", e))?;
        total_size = total_size.saturating_add(entry_size);
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(format!(
                "archive exceeds maximum extracted size ({} bytes)",
                MAX_EXTRACTED_SIZE
            ));
        }

        if entry_type != tar::EntryType::Regular {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|e| format!("failed to read entry path: {}", e))?
            .into_owned();
        let path = normalize_entry_path(&raw_path)?;
        let mode = entry.header().mode().unwrap_or(0o644);

        let mut data = Vec::with_capacity(usize::try_from(entry_size).unwrap_or(0));
        entry
            .read_to_end(&mut data)
            .map_err(|e| format!("failed to read {}: {}", raw_path.display(), e))?;

        if path == Path::new(MANIFEST_FILE) {
            let text = String::from_utf8(data).map_err(|_| "manifest is not UTF-8".to_string())?;
            contents.manifest = Some(PackageManifest::from_toml_str(&text)?);
            continue;
        }
        contents.files.push(ArchiveFile { path, mode, data });
    }

    if entry_count == 0 {
        return Err("archive is empty".to_string());
    }
    Ok(contents)
}

fn is_safe_entry_type(entry_type: tar::EntryType) -> bool {
    matches!(
        entry_type,
        tar::EntryType::Regular
            | tar::EntryType::Directory
            | tar::EntryType::GNULongName
            | tar::EntryType::XHeader
            | tar::EntryType::XGlobalHeader
    )
}

/// Reject traversal and drop `.` components
fn normalize_entry_path(path: &Path) -> Result<PathBuf, String> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path traversal in archive entry: {}", path.display()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(format!("empty archive entry path: {}", path.display()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_groups_and_content() {
        let data = tgz(&[
            ("package.toml", b"name = \"App\"\nversion = \"1.0.0\""),
            ("bin/any/app", b"bin"),
            ("./bin/linux-x86_64/native/lib.so", b"so"),
            ("content/wwwroot/site.css", b"css"),
        ]);
        let contents = read_archive(data.as_slice()).unwrap();

        assert_eq!(contents.manifest.as_ref().unwrap().name, "App");
        assert_eq!(contents.binary_groups(), vec!["any", "linux-x86_64"]);
        let linux: Vec<PathBuf> = contents.binaries_in("linux-x86_64").map(|(_, p)| p).collect();
        assert_eq!(linux, vec![PathBuf::from("native/lib.so")]);
        let content: Vec<PathBuf> = contents.content().map(|(_, p)| p).collect();
        assert_eq!(content, vec![PathBuf::from("wwwroot/site.css")]);
    }

    #[test]
    fn test_rejects_garbage_and_empty() {
        assert!(read_archive(&b"definitely not gzip"[..]).is_err());
        assert!(read_archive(tgz(&[]).as_slice()).is_err());
    }

    #[test]
    fn test_normalize_entry_path() {
        assert!(normalize_entry_path(Path::new("../etc/passwd")).is_err());
        assert!(normalize_entry_path(Path::new("/etc/passwd")).is_err());
        assert_eq!(
            normalize_entry_path(Path::new("./bin/any/x")).unwrap(),
            PathBuf::from("bin/any/x")
        );
    }
}
