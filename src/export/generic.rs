use std::fs;
use std::path::Path;

use super::{create_dir, safe_component, ExportError, ExportReport, Exporter, UNSAFE_NAME};
use crate::store::PackageScan;

/// Mirrors the container structure: `<dest>/<container name>/<filename>`.
pub struct GenericExporter;

impl Exporter for GenericExporter {
    fn name(&self) -> &'static str {
        "Generic"
    }

    fn export(&self, scan: &PackageScan, dest: &Path, report: &mut ExportReport) -> Result<(), ExportError> {
        for container in &scan.containers {
            let name = container.record.display_name.as_str();
            let Some(files) = &container.files else {
                report.skip(name, None, "No file data");
                continue;
            };

            let Some(dir_name) = safe_component(name) else {
                report.fail(name, UNSAFE_NAME);
                continue;
            };
            let container_dest = dest.join(dir_name);
            create_dir(&container_dest)?;
            let source_dir = scan.container_dir(container);

            for file in files {
                let Some(filename) = file.record.filename.as_deref() else {
                    report.skip(name, Some("(no name)"), "Missing filename");
                    continue;
                };
                let Some(target_name) = safe_component(filename) else {
                    report.fail(filename, UNSAFE_NAME);
                    continue;
                };

                let source = match &file.file_guid {
                    Some(guid) if source_dir.join(guid).is_file() => source_dir.join(guid),
                    _ => {
                        report.fail(filename, "File not found in source");
                        continue;
                    }
                };

                let target = container_dest.join(target_name);
                match fs::copy(&source, &target) {
                    Ok(_) => report.exported(dest, name, filename, target),
                    Err(e) => report.fail(filename, e),
                }
            }
        }
        Ok(())
    }
}
