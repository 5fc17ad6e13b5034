//! Locating sync packages and their containers on disk.
//!
//! ```text
//! <packages>/<package>/SystemAppData/wgs/<folder>/containers.index
//! <packages>/<package>/SystemAppData/wgs/<folder>/<CONTAINER GUID>/container.<n>
//! <packages>/<package>/SystemAppData/wgs/<folder>/<CONTAINER GUID>/<FILE GUID>
//! ```
//!
//! GUID folder and file names are the GUID text without hyphens, uppercase.
//! `<folder>` is the first subdirectory of `wgs` not named `t`.
//!
//! Missing folders and files are reported per container or per file; only an
//! unreadable index or a missing packages root fails a whole call.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::container::{ContainerFileRecord, ContainerFileTable, CONTAINER_FILE_PREFIX};
use crate::index::{ContainerIndex, ContainerRecord, IndexHeader, INDEX_FILE_NAME};
use crate::options::ScanOptions;

/// Subdirectory holding the temporary sync folder; never a container root.
pub const TEMP_WGS_FOLDER: &str = "t";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Packages directory not found: {}", .0.display())]
    PackagesDirMissing(PathBuf),
    #[error("No containers.index found for package {0}")]
    IndexMissing(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Package discovery ─────────────────────────────────────────────────────────

/// One package that has sync data.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    /// Package directory name, e.g. `TeamCherry.HollowKnightSilksong_y4jvztpgccj42`.
    pub package_name:    String,
    /// Package name from the index header, or the directory name.
    pub display_name:    String,
    pub index_path:      PathBuf,
    pub container_count: u32,
    pub timestamp:       Option<DateTime<Utc>>,
    pub wgs_folder:      String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:           Option<String>,
}

/// `%LOCALAPPDATA%\Packages` for the current user, if a home directory is known.
pub fn default_packages_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(|home| PathBuf::from(home).join("AppData").join("Local").join("Packages"))
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Locate `containers.index` inside a package directory.
///
/// Returns the sync folder name and the index path.
pub fn find_index(package_dir: &Path) -> Option<(String, PathBuf)> {
    let wgs = package_dir.join("SystemAppData").join("wgs");
    let folder = sorted_entries(&wgs)
        .ok()?
        .into_iter()
        .find(|e| e.file_name() != TEMP_WGS_FOLDER && e.path().is_dir())?;

    let index_path = folder.path().join(INDEX_FILE_NAME);
    index_path
        .is_file()
        .then(|| (folder.file_name().to_string_lossy().into_owned(), index_path))
}

/// Enumerate every package under `packages_dir` that has a sync index.
pub fn scan_packages(packages_dir: &Path, opts: &ScanOptions) -> Result<Vec<PackageSummary>, StoreError> {
    if !packages_dir.is_dir() {
        return Err(StoreError::PackagesDirMissing(packages_dir.to_owned()));
    }

    let mut packages = Vec::new();
    for entry in sorted_entries(packages_dir)? {
        if !entry.path().is_dir() {
            continue;
        }
        let Some((wgs_folder, index_path)) = find_index(&entry.path()) else {
            continue;
        };
        let package_name = entry.file_name().to_string_lossy().into_owned();

        let summary = match ContainerIndex::read_file(&index_path, opts) {
            Ok(index) => PackageSummary {
                display_name:    index.package_name().unwrap_or(&package_name).to_owned(),
                container_count: index.header.as_ref().map_or(0, |h| h.container_count),
                timestamp:       index.header.as_ref().map(|h| h.timestamp),
                error:           None,
                package_name,
                index_path,
                wgs_folder,
            },
            Err(e) => {
                warn!(package = %package_name, "cannot read index: {e}");
                PackageSummary {
                    display_name:    package_name.clone(),
                    container_count: 0,
                    timestamp:       None,
                    error:           Some(format!("Parse error: {e}")),
                    package_name,
                    index_path,
                    wgs_folder,
                }
            }
        };
        packages.push(summary);
    }

    debug!(count = packages.len(), dir = %packages_dir.display(), "packages scanned");
    Ok(packages)
}

// ── Container resolution ──────────────────────────────────────────────────────

/// Why a container could not be resolved.  Serialized as its message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Folder not found: {0}")]
    FolderNotFound(String),
    #[error("No container file found in directory")]
    NoContainerFile,
    #[error("Failed to read folder: {0}")]
    ReadFolder(String),
    #[error("Failed to parse: {0}")]
    Parse(String),
}

impl ContainerError {
    /// The container's folder or its file table is absent on disk.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::FolderNotFound(_) | Self::NoContainerFile)
    }
}

impl Serialize for ContainerError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A file-table entry with its payload location resolved.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    #[serde(flatten)]
    pub record:    ContainerFileRecord,
    /// Payload file name inside the container folder.
    pub file_guid: Option<String>,
    /// Payload size in bytes, 0 if the payload is missing.
    pub size:      u64,
}

/// A container record with its folder and file table resolved.
#[derive(Debug, Clone, Serialize)]
pub struct StoredContainer {
    #[serde(flatten)]
    pub record:      ContainerRecord,
    pub folder_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table:       Option<ContainerFileTable>,
    /// Present only when the file table parsed cleanly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files:       Option<Vec<StoredFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:       Option<ContainerError>,
}

impl StoredContainer {
    fn failed(record: ContainerRecord, error: ContainerError) -> Self {
        warn!(container = %record.display_name, "{error}");
        Self {
            folder_name: record.folder_name(),
            record,
            table: None,
            files: None,
            error: Some(error),
        }
    }
}

/// Full scan of one package's sync folder.
#[derive(Debug, Clone, Serialize)]
pub struct PackageScan {
    pub index_path: PathBuf,
    /// Directory holding the index and the container folders.
    pub base_path:  PathBuf,
    pub header:     Option<IndexHeader>,
    pub containers: Vec<StoredContainer>,
}

impl PackageScan {
    pub fn container_dir(&self, container: &StoredContainer) -> PathBuf {
        self.base_path.join(&container.folder_name)
    }
}

/// Parse an index and resolve every container it lists.
pub fn scan_package(index_path: &Path, opts: &ScanOptions) -> Result<PackageScan, StoreError> {
    let index = ContainerIndex::read_file(index_path, opts)?;
    let base_path = index_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let containers = resolve_all(&base_path, index.entries, opts);

    Ok(PackageScan {
        index_path: index_path.to_owned(),
        base_path,
        header: index.header,
        containers,
    })
}

#[cfg(feature = "parallel")]
fn resolve_all(base: &Path, entries: Vec<ContainerRecord>, opts: &ScanOptions) -> Vec<StoredContainer> {
    use rayon::prelude::*;

    entries
        .into_par_iter()
        .map(|record| resolve_container(base, record, opts))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn resolve_all(base: &Path, entries: Vec<ContainerRecord>, opts: &ScanOptions) -> Vec<StoredContainer> {
    entries
        .into_iter()
        .map(|record| resolve_container(base, record, opts))
        .collect()
}

/// Find the `container.*` blob in a container folder.
fn find_file_table(dir: &Path) -> io::Result<Option<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .find(|e| e.file_name().to_string_lossy().starts_with(CONTAINER_FILE_PREFIX))
        .map(|e| e.path()))
}

/// Resolve one container record against the folder layout under `base`.
pub fn resolve_container(base: &Path, record: ContainerRecord, opts: &ScanOptions) -> StoredContainer {
    let folder_name = record.folder_name();
    let dir = base.join(&folder_name);

    if !dir.is_dir() {
        return StoredContainer::failed(record, ContainerError::FolderNotFound(folder_name));
    }

    let table_path = match find_file_table(&dir) {
        Ok(Some(path)) => path,
        Ok(None) => return StoredContainer::failed(record, ContainerError::NoContainerFile),
        Err(e) => return StoredContainer::failed(record, ContainerError::ReadFolder(e.to_string())),
    };

    let table = match fs::read(&table_path)
        .map_err(|e| e.to_string())
        .and_then(|buf| ContainerFileTable::parse(&buf, opts).map_err(|e| e.to_string()))
    {
        Ok(table) => table,
        Err(e) => return StoredContainer::failed(record, ContainerError::Parse(e)),
    };

    let files = table.files.as_ref().map(|files| {
        files
            .iter()
            .map(|file| {
                let file_guid = file.file_name();
                let size = file_guid
                    .as_ref()
                    .and_then(|name| fs::metadata(dir.join(name)).ok())
                    .map_or(0, |m| m.len());
                StoredFile { record: file.clone(), file_guid, size }
            })
            .collect()
    });

    StoredContainer {
        record,
        folder_name,
        table: Some(table),
        files,
        error: None,
    }
}
