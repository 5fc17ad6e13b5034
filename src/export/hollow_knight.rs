use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{create_dir, safe_component, ExportError, ExportReport, Exporter, UNSAFE_NAME};
use crate::codec;
use crate::store::PackageScan;

/// Destination of the `shareddata` container's payload.
pub const SHARED_DATA_FILE: &str = "shared.dat";

/// Lays files out the way the Steam build of the games expects them.
///
/// | Container   | Destination |
/// |-------------|-------------|
/// | `shareddata` | `shared.dat`, wrapped with the save codec if it is plain |
/// | `restore<N>` | `user*` files at the root, the rest under `Restore_Points<N>/` |
/// | `save*`      | root |
pub struct HollowKnightExporter;

enum Placement {
    SharedData,
    Copy(PathBuf),
    Unknown,
    Unsafe,
}

fn placement(container: &str, filename: &str, dest: &Path) -> Result<Placement, ExportError> {
    if container == "shareddata" {
        return Ok(Placement::SharedData);
    }
    let dir = if let Some(n) = container.strip_prefix("restore") {
        if filename.starts_with("user") {
            dest.to_path_buf()
        } else {
            let sub = format!("Restore_Points{n}");
            match safe_component(&sub) {
                Some(sub) => dest.join(sub),
                None => return Ok(Placement::Unsafe),
            }
        }
    } else if container.starts_with("save") {
        dest.to_path_buf()
    } else {
        return Ok(Placement::Unknown);
    };

    let Some(file) = safe_component(filename) else {
        return Ok(Placement::Unsafe);
    };
    create_dir(&dir)?;
    Ok(Placement::Copy(dir.join(file)))
}

/// Copy a plain payload as an enveloped one; already wrapped payloads are copied as is.
fn write_shared_data(source: &Path, target: &Path) -> io::Result<()> {
    let content = fs::read(source)?;
    if content.len() > codec::MAGIC.len() && codec::is_wrapped(&content) {
        fs::write(target, content)
    } else {
        fs::write(target, codec::encode_bytes(&content))
    }
}

impl Exporter for HollowKnightExporter {
    fn name(&self) -> &'static str {
        "Hollow Knight / Hollow Knight: Silksong (Steam)"
    }

    fn export(&self, scan: &PackageScan, dest: &Path, report: &mut ExportReport) -> Result<(), ExportError> {
        let first_missing = scan
            .containers
            .first()
            .map_or(true, |c| c.error.as_ref().is_some_and(|e| e.is_missing()));
        if first_missing {
            report.fail("N/A", "No containers found in scan data");
            return Ok(());
        }

        for container in &scan.containers {
            let name = container.record.display_name.to_lowercase();
            let Some(files) = &container.files else {
                report.skip(&name, None, "No file data");
                continue;
            };
            let source_dir = scan.container_dir(container);

            for file in files {
                let Some(filename) = file.record.filename.as_deref() else {
                    continue;
                };
                let source = match &file.file_guid {
                    Some(guid) if source_dir.join(guid).is_file() => source_dir.join(guid),
                    _ => {
                        report.fail(filename, "File not found");
                        continue;
                    }
                };

                let result = match placement(&name, filename, dest)? {
                    Placement::SharedData => {
                        let target = dest.join(SHARED_DATA_FILE);
                        write_shared_data(&source, &target).map(|_| (SHARED_DATA_FILE, target))
                    }
                    Placement::Copy(target) => fs::copy(&source, &target).map(|_| (filename, target)),
                    Placement::Unknown => {
                        report.skip(&name, Some(filename), "Unknown container type");
                        continue;
                    }
                    Placement::Unsafe => {
                        report.fail(filename, UNSAFE_NAME);
                        continue;
                    }
                };

                match result {
                    Ok((shown, target)) => report.exported(dest, &name, shown, target),
                    Err(e) => report.fail(filename, e),
                }
            }
        }
        Ok(())
    }
}
