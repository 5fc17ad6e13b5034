//! Copying save files out of a scanned package.
//!
//! An [`Exporter`] decides where each file of a [`PackageScan`] lands under a
//! destination directory.  Per-file problems go into the [`ExportReport`];
//! only failures to create the destination itself abort an export.

mod generic;
mod hollow_knight;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::store::PackageScan;

pub use generic::GenericExporter;
pub use hollow_knight::{HollowKnightExporter, SHARED_DATA_FILE};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Cannot create {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedFile {
    pub container:     String,
    pub file:          String,
    pub path:          PathBuf,
    pub relative_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file:      Option<String>,
    pub reason:    String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file:   String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub exported: Vec<ExportedFile>,
    pub skipped:  Vec<SkippedFile>,
    pub errors:   Vec<FailedFile>,
}

impl ExportReport {
    pub fn skip(&mut self, container: &str, file: Option<&str>, reason: &str) {
        self.skipped.push(SkippedFile {
            container: container.to_owned(),
            file:      file.map(str::to_owned),
            reason:    reason.to_owned(),
        });
    }

    pub fn fail(&mut self, file: &str, reason: impl ToString) {
        self.errors.push(FailedFile {
            file:   file.to_owned(),
            reason: reason.to_string(),
        });
    }

    pub(crate) fn exported(&mut self, dest: &Path, container: &str, file: &str, path: PathBuf) {
        let relative_path = path.strip_prefix(dest).unwrap_or(&path).to_path_buf();
        self.exported.push(ExportedFile {
            container: container.to_owned(),
            file:      file.to_owned(),
            path,
            relative_path,
        });
    }
}

pub trait Exporter: Sync {
    fn name(&self) -> &'static str;
    fn export(&self, scan: &PackageScan, dest: &Path, report: &mut ExportReport) -> Result<(), ExportError>;
}

/// Package names with a dedicated exporter.
pub const HOLLOW_KNIGHT_PACKAGES: [&str; 2] = [
    "TeamCherry.HollowKnightSilksong_y4jvztpgccj42",
    "TeamCherry.15373CD61C66B_y4jvztpgccj42",
];

pub fn has_exporter(package_name: &str) -> bool {
    HOLLOW_KNIGHT_PACKAGES.contains(&package_name)
}

/// The exporter for a package, falling back to [`GenericExporter`].
pub fn exporter_for(package_name: &str) -> &'static dyn Exporter {
    if has_exporter(package_name) {
        &HollowKnightExporter
    } else {
        &GenericExporter
    }
}

/// Message recorded for names that cannot be used as a single path component.
pub const UNSAFE_NAME: &str = "Unsafe file name";

/// `name` as a path, if it is exactly one normal component.
///
/// Names come from the index and file tables, so absolute paths, drive
/// prefixes, `.` and `..` are refused.
pub fn safe_component(name: &str) -> Option<&Path> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(path),
        _ => None,
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(path).map_err(|source| ExportError::CreateDir {
        path: path.to_owned(),
        source,
    })
}

/// Run `exporter` over `scan`, creating `dest` first.
pub fn export_package(
    scan:     &PackageScan,
    dest:     &Path,
    exporter: &dyn Exporter,
) -> Result<ExportReport, ExportError> {
    create_dir(dest)?;
    let mut report = ExportReport::default();
    exporter.export(scan, dest, &mut report)?;
    info!(
        exporter = exporter.name(),
        exported = report.exported.len(),
        skipped = report.skipped.len(),
        errors = report.errors.len(),
        "export finished"
    );
    Ok(report)
}
