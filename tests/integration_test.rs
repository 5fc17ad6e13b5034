use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wgsave::export::{export_package, GenericExporter, HollowKnightExporter, SHARED_DATA_FILE, UNSAFE_NAME};
use wgsave::primitives::{format_guid, guid_to_file_name};
use wgsave::{codec, store, ContainerError, ContainerIndex, RecordVariant, ScanOptions};

const FILETIME_2020: u64 = 132_223_104_000_000_000;
const PACKAGE: &str = "TeamCherry.15373CD61C66B_y4jvztpgccj42";
const WGS_FOLDER: &str = "000900000ABCDEF_0000000000000000000000007A1B2C3D";

fn guid_bytes(first: u8) -> [u8; 16] {
    std::array::from_fn(|i| first + i as u8)
}

fn put_utf16(buf: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    buf.write_u32::<LittleEndian>(units.len() as u32).unwrap();
    for u in units {
        buf.write_u16::<LittleEndian>(u).unwrap();
    }
}

/// Header followed by duplicate-name records and the trailing scan margin.
fn index_bytes(records: &[(&str, [u8; 16])]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(1).unwrap();
    buf.write_u32::<LittleEndian>(records.len() as u32).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();
    put_utf16(&mut buf, "Pkg");
    buf.write_u64::<LittleEndian>(FILETIME_2020).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();
    put_utf16(&mut buf, "ID");

    for (i, (name, guid)) in records.iter().enumerate() {
        put_utf16(&mut buf, name);
        put_utf16(&mut buf, name);
        put_utf16(&mut buf, &format!("0x{:X}", i + 1));
        buf.push(0);
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(guid);
    }
    buf.extend_from_slice(&[0; 64]);
    buf
}

fn file_table(files: &[(&str, [u8; 16])]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(4).unwrap();
    buf.write_u32::<LittleEndian>(files.len() as u32).unwrap();
    for (name, guid) in files {
        let mut slot = Vec::with_capacity(128);
        for u in name.encode_utf16() {
            slot.write_u16::<LittleEndian>(u).unwrap();
        }
        slot.resize(128, 0);
        buf.extend_from_slice(&slot);
        buf.extend_from_slice(guid);
        buf.extend_from_slice(guid);
    }
    buf
}

struct Container<'a> {
    name:  &'a str,
    guid:  [u8; 16],
    files: Vec<(&'a str, [u8; 16], &'a [u8])>,
}

/// Lay out `<root>/Packages/<PACKAGE>/SystemAppData/wgs/<folder>/...`.
fn write_package(root: &Path, containers: &[Container<'_>]) -> PathBuf {
    let wgs = root.join("Packages").join(PACKAGE).join("SystemAppData").join("wgs");
    fs::create_dir_all(wgs.join("t")).unwrap();
    let base = wgs.join(WGS_FOLDER);
    fs::create_dir_all(&base).unwrap();

    let records: Vec<_> = containers.iter().map(|c| (c.name, c.guid)).collect();
    fs::write(base.join("containers.index"), index_bytes(&records)).unwrap();

    for c in containers {
        let dir = base.join(guid_to_file_name(&format_guid(&c.guid)));
        fs::create_dir_all(&dir).unwrap();
        let entries: Vec<_> = c.files.iter().map(|(n, g, _)| (*n, *g)).collect();
        fs::write(dir.join("container.3"), file_table(&entries)).unwrap();
        for (_, guid, content) in &c.files {
            fs::write(dir.join(guid_to_file_name(&format_guid(guid))), content).unwrap();
        }
    }
    root.join("Packages")
}

fn hollow_knight_layout(tmp: &TempDir) -> PathBuf {
    write_package(tmp.path(), &[
        Container {
            name:  "shareddata",
            guid:  guid_bytes(0x11),
            files: vec![("shared", guid_bytes(0x81), &br#"{"x":1}"#[..])],
        },
        Container {
            name:  "Restore2",
            guid:  guid_bytes(0x31),
            files: vec![
                ("user1.dat", guid_bytes(0x91), &b"user one"[..]),
                ("restoreData.dat", guid_bytes(0xA1), &b"restore point"[..]),
            ],
        },
        Container {
            name:  "Save1",
            guid:  guid_bytes(0x51),
            files: vec![("user2.dat", guid_bytes(0xB1), &b"user two"[..])],
        },
    ])
}

fn container_path(packages_dir: &Path, guid: [u8; 16]) -> PathBuf {
    packages_dir
        .join(PACKAGE)
        .join("SystemAppData")
        .join("wgs")
        .join(WGS_FOLDER)
        .join(guid_to_file_name(&format_guid(&guid)))
}

fn scan_of(packages_dir: &Path) -> store::PackageScan {
    let (_, index_path) = store::find_index(&packages_dir.join(PACKAGE)).unwrap();
    store::scan_package(&index_path, &ScanOptions::default()).unwrap()
}

#[test]
fn test_single_record_after_header() {
    let buf = index_bytes(&[("Save1", guid_bytes(0x11))]);
    let index = ContainerIndex::parse(&buf, &ScanOptions::default());

    let header = index.header.unwrap();
    assert_eq!(header.package_name, "Pkg");
    assert_eq!(header.timestamp.to_rfc3339(), "2020-01-01T00:00:00+00:00");
    assert_eq!(header.container_id.as_deref(), Some("ID"));

    assert_eq!(index.entries.len(), 1);
    let record = &index.entries[0];
    assert_eq!(record.offset, 42);
    assert_eq!(record.display_name, "Save1");
    assert_eq!(record.identifier, "0x1");
    assert_eq!(record.sequence, 0);
    assert_eq!(record.guid, "14131211-1615-1817-191A-1B1C1D1E1F20");
    assert_eq!(record.variant, RecordVariant::WithDuplicateName);
}

#[test]
fn test_discover_and_resolve_package() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    fs::create_dir_all(packages_dir.join("Unrelated.App_123")).unwrap();
    let opts = ScanOptions::default();

    let packages = store::scan_packages(&packages_dir, &opts).unwrap();
    assert_eq!(packages.len(), 1);
    let pkg = &packages[0];
    assert_eq!(pkg.package_name, PACKAGE);
    assert_eq!(pkg.display_name, "Pkg");
    assert_eq!(pkg.container_count, 3);
    assert_eq!(pkg.wgs_folder, WGS_FOLDER);
    assert!(pkg.error.is_none());

    let scan = store::scan_package(&pkg.index_path, &opts).unwrap();
    let names: Vec<_> = scan.containers.iter().map(|c| c.record.display_name.as_str()).collect();
    assert_eq!(names, ["shareddata", "Restore2", "Save1"]);

    let restore = &scan.containers[1];
    assert!(restore.error.is_none());
    let files = restore.files.as_ref().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].record.filename.as_deref(), Some("user1.dat"));
    assert_eq!(files[0].size, b"user one".len() as u64);
    assert_eq!(files[1].record.filename.as_deref(), Some("restoreData.dat"));
    assert_eq!(files[1].size, b"restore point".len() as u64);
}

#[test]
fn test_missing_container_folder_is_per_container() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let base = packages_dir.join(PACKAGE).join("SystemAppData").join("wgs").join(WGS_FOLDER);
    let save_dir = base.join(guid_to_file_name(&format_guid(&guid_bytes(0x51))));
    fs::remove_dir_all(&save_dir).unwrap();

    let scan = store::scan_package(&base.join("containers.index"), &ScanOptions::default()).unwrap();
    assert_eq!(scan.containers.len(), 3);
    assert!(scan.containers[0].files.is_some());
    let save = &scan.containers[2];
    assert!(save.files.is_none());
    let err = save.error.as_ref().unwrap();
    assert!(matches!(err, ContainerError::FolderNotFound(_)));
    assert!(err.to_string().starts_with("Folder not found: "));
}

#[test]
fn test_generic_export_mirrors_containers() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let (_, index_path) = store::find_index(&packages_dir.join(PACKAGE)).unwrap();
    let scan = store::scan_package(&index_path, &ScanOptions::default()).unwrap();

    let dest = tmp.path().join("out");
    let report = export_package(&scan, &dest, &GenericExporter).unwrap();

    assert_eq!(report.exported.len(), 4);
    assert!(report.errors.is_empty());
    assert_eq!(fs::read(dest.join("Save1").join("user2.dat")).unwrap(), b"user two");
    assert_eq!(fs::read(dest.join("shareddata").join("shared")).unwrap(), br#"{"x":1}"#);
    assert_eq!(report.exported[0].relative_path, Path::new("shareddata").join("shared"));
}

#[test]
fn test_hollow_knight_export_layout() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let (_, index_path) = store::find_index(&packages_dir.join(PACKAGE)).unwrap();
    let scan = store::scan_package(&index_path, &ScanOptions::default()).unwrap();

    let dest = tmp.path().join("hk");
    let report = export_package(&scan, &dest, &HollowKnightExporter).unwrap();
    assert_eq!(report.exported.len(), 4);
    assert!(report.errors.is_empty());
    assert!(report.skipped.is_empty());

    let shared = fs::read(dest.join(SHARED_DATA_FILE)).unwrap();
    assert!(codec::is_wrapped(&shared));
    assert_eq!(codec::decode(&shared).unwrap(), r#"{"x":1}"#);

    assert_eq!(fs::read(dest.join("user1.dat")).unwrap(), b"user one");
    assert_eq!(fs::read(dest.join("Restore_Points2").join("restoreData.dat")).unwrap(), b"restore point");
    assert_eq!(fs::read(dest.join("user2.dat")).unwrap(), b"user two");
}

#[test]
fn test_hollow_knight_keeps_wrapped_shared_data() {
    let tmp = TempDir::new().unwrap();
    let wrapped = codec::encode(r#"{"y":2}"#);
    let packages_dir = write_package(tmp.path(), &[Container {
        name:  "shareddata",
        guid:  guid_bytes(0x11),
        files: vec![("shared", guid_bytes(0x81), wrapped.as_slice())],
    }]);
    let (_, index_path) = store::find_index(&packages_dir.join(PACKAGE)).unwrap();
    let scan = store::scan_package(&index_path, &ScanOptions::default()).unwrap();

    let dest = tmp.path().join("hk");
    export_package(&scan, &dest, &HollowKnightExporter).unwrap();
    assert_eq!(fs::read(dest.join(SHARED_DATA_FILE)).unwrap(), wrapped);
}

#[test]
fn test_hollow_knight_skips_unknown_containers() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = write_package(tmp.path(), &[Container {
        name:  "Options",
        guid:  guid_bytes(0x11),
        files: vec![("settings", guid_bytes(0x81), &b"{}"[..])],
    }]);
    let (_, index_path) = store::find_index(&packages_dir.join(PACKAGE)).unwrap();
    let scan = store::scan_package(&index_path, &ScanOptions::default()).unwrap();

    let report = export_package(&scan, &tmp.path().join("hk"), &HollowKnightExporter).unwrap();
    assert!(report.exported.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].container, "options");
    assert_eq!(report.skipped[0].reason, "Unknown container type");
}

#[test]
fn test_save_envelope_on_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("user1.dat");
    fs::write(&path, codec::encode(r#"{"x":1}"#)).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 48);
    assert_eq!(&bytes[..22], &codec::MAGIC);
    assert_eq!(bytes[22], 0x18);
    assert_eq!(&bytes[23..47], b"9zEAZmIqj2zSmEvQTQZUcw==");
    assert_eq!(bytes[47], codec::TRAILER);
    assert_eq!(codec::decode(&bytes).unwrap(), r#"{"x":1}"#);
}

#[test]
fn test_exports_never_leave_the_destination() {
    let tmp = TempDir::new().unwrap();
    let outside = tmp.path().join("escaped.txt");
    let outside_name = outside.to_str().unwrap().to_owned();
    let packages_dir = write_package(tmp.path(), &[
        Container {
            name:  "Save1",
            guid:  guid_bytes(0x11),
            files: vec![
                (outside_name.as_str(), guid_bytes(0x81), &b"absolute"[..]),
                ("../escaped2.txt", guid_bytes(0x91), &b"parent"[..]),
                ("user1.dat", guid_bytes(0xA1), &b"fine"[..]),
            ],
        },
        Container {
            name:  "..",
            guid:  guid_bytes(0x31),
            files: vec![("user2.dat", guid_bytes(0xB1), &b"climbs"[..])],
        },
    ]);
    let scan = scan_of(&packages_dir);

    let dest = tmp.path().join("out");
    let report = export_package(&scan, &dest, &GenericExporter).unwrap();
    assert_eq!(report.exported.len(), 1);
    assert_eq!(fs::read(dest.join("Save1").join("user1.dat")).unwrap(), b"fine");
    let failed: Vec<_> = report.errors.iter().map(|e| (e.file.as_str(), e.reason.as_str())).collect();
    assert_eq!(failed, [
        (outside_name.as_str(), UNSAFE_NAME),
        ("../escaped2.txt", UNSAFE_NAME),
        ("..", UNSAFE_NAME),
    ]);

    let hk_dest = tmp.path().join("hk");
    let report = export_package(&scan, &hk_dest, &HollowKnightExporter).unwrap();
    assert_eq!(report.exported.len(), 1);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.reason == UNSAFE_NAME));

    assert!(!outside.exists());
    assert!(!dest.join("escaped2.txt").exists());
    assert!(!tmp.path().join("escaped2.txt").exists());
    assert!(!tmp.path().join("user2.dat").exists());
}

#[test]
fn test_missing_payload_is_reported_per_file() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let save_dir = container_path(&packages_dir, guid_bytes(0x51));
    fs::remove_file(save_dir.join(guid_to_file_name(&format_guid(&guid_bytes(0xB1))))).unwrap();

    let scan = scan_of(&packages_dir);
    let save_files = scan.containers[2].files.as_ref().unwrap();
    assert_eq!(save_files[0].record.filename.as_deref(), Some("user2.dat"));
    assert_eq!(save_files[0].size, 0);

    let report = export_package(&scan, &tmp.path().join("generic"), &GenericExporter).unwrap();
    assert_eq!(report.exported.len(), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "user2.dat");
    assert_eq!(report.errors[0].reason, "File not found in source");

    let report = export_package(&scan, &tmp.path().join("hk"), &HollowKnightExporter).unwrap();
    assert_eq!(report.exported.len(), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "user2.dat");
    assert_eq!(report.errors[0].reason, "File not found");
}

#[test]
fn test_hollow_knight_requires_first_container_on_disk() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let shared_dir = container_path(&packages_dir, guid_bytes(0x11));

    fs::remove_file(shared_dir.join("container.3")).unwrap();
    let scan = scan_of(&packages_dir);
    assert_eq!(scan.containers[0].error, Some(ContainerError::NoContainerFile));
    assert_eq!(
        scan.containers[0].error.as_ref().unwrap().to_string(),
        "No container file found in directory"
    );

    let report = export_package(&scan, &tmp.path().join("hk1"), &HollowKnightExporter).unwrap();
    assert!(report.exported.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "N/A");
    assert_eq!(report.errors[0].reason, "No containers found in scan data");

    fs::remove_dir_all(&shared_dir).unwrap();
    let scan = scan_of(&packages_dir);
    let report = export_package(&scan, &tmp.path().join("hk2"), &HollowKnightExporter).unwrap();
    assert!(report.exported.is_empty());
    assert_eq!(report.errors[0].reason, "No containers found in scan data");
}

#[test]
fn test_hollow_knight_continues_past_unparsable_first_table() {
    let tmp = TempDir::new().unwrap();
    let packages_dir = hollow_knight_layout(&tmp);
    let shared_dir = container_path(&packages_dir, guid_bytes(0x11));
    fs::write(shared_dir.join("container.3"), [0u8; 4]).unwrap();

    let scan = scan_of(&packages_dir);
    assert!(matches!(scan.containers[0].error, Some(ContainerError::Parse(_))));

    let dest = tmp.path().join("hk");
    let report = export_package(&scan, &dest, &HollowKnightExporter).unwrap();
    assert_eq!(report.exported.len(), 3);
    assert!(report.errors.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].container, "shareddata");
    assert_eq!(report.skipped[0].reason, "No file data");
    assert!(!dest.join(SHARED_DATA_FILE).exists());
    assert_eq!(fs::read(dest.join("user2.dat")).unwrap(), b"user two");
}
