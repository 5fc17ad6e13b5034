use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wgsave::export::{export_package, exporter_for, Exporter, GenericExporter};
use wgsave::store::{self, PackageScan, StoreError};
use wgsave::{codec, ScanOptions};

#[derive(Parser)]
#[command(name = "wgsave", about = "Inspect and export cloud-sync save containers")]
struct Cli {
    /// Log parser diagnostics (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List packages that have sync data
    Packages {
        /// Packages root (default: <home>/AppData/Local/Packages)
        #[arg(long)]
        packages_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show the containers and files of one package
    Inspect {
        /// Path to a containers.index, or a package directory name
        target: String,
        #[arg(long)]
        packages_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Copy a package's save files into a directory
    Export {
        /// Path to a containers.index, or a package directory name
        target: String,
        #[arg(short, long, default_value = "exported_save_files")]
        output: PathBuf,
        /// Use the generic layout even if a game-specific exporter exists
        #[arg(long)]
        generic: bool,
        #[arg(long)]
        packages_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Unwrap an encrypted Hollow Knight save into plain JSON
    Decode {
        input:  PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Wrap a plain Hollow Knight save into the encrypted envelope
    Encode {
        input:  PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let opts = ScanOptions::default();

    match cli.command {

        // ── Packages ─────────────────────────────────────────────────────────
        Commands::Packages { packages_dir, json } => {
            let dir = packages_root(packages_dir)?;
            let packages = store::scan_packages(&dir, &opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&packages)?);
                return Ok(());
            }
            println!("Packages in {} ({} with sync data)", dir.display(), packages.len());
            println!("{:<56} {:<32} {:>10}  Last modified", "Package", "Name", "Containers");
            for p in &packages {
                let modified = p.timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "—".into());
                println!("{:<56} {:<32} {:>10}  {}",
                    p.package_name, p.display_name, p.container_count, modified);
                if let Some(err) = &p.error {
                    println!("    ! {err}");
                }
            }
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { target, packages_dir, json } => {
            let (_, index_path) = resolve_target(&target, packages_dir)?;
            let scan = store::scan_package(&index_path, &opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&scan)?);
            } else {
                print_scan(&scan);
            }
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { target, output, generic, packages_dir, json } => {
            let (package, index_path) = resolve_target(&target, packages_dir)?;
            let scan = store::scan_package(&index_path, &opts)?;
            if scan.containers.is_empty() {
                println!("No containers found in {}", index_path.display());
                return Ok(());
            }

            let exporter: &dyn Exporter = if generic { &GenericExporter } else { exporter_for(&package) };
            println!("Using {} exporter", exporter.name());
            let report = export_package(&scan, &output, exporter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for f in &report.exported {
                println!("  exported  {:<16} {}", f.container, f.relative_path.display());
            }
            for s in &report.skipped {
                println!("  skipped   {:<16} {} ({})", s.container, s.file.as_deref().unwrap_or("-"), s.reason);
            }
            for e in &report.errors {
                println!("  error     {:<16} {}", e.file, e.reason);
            }
            println!("{} exported, {} skipped, {} errors → {}",
                report.exported.len(), report.skipped.len(), report.errors.len(), output.display());
        }

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { input, output } => {
            let plain = codec::decode(&std::fs::read(&input)?)?;
            std::fs::write(&output, plain)?;
            println!("Decoded {} → {}", input.display(), output.display());
        }

        // ── Encode ───────────────────────────────────────────────────────────
        Commands::Encode { input, output } => {
            let data = std::fs::read(&input)?;
            if codec::is_wrapped(&data) {
                return Err(format!("{} is already an encrypted save", input.display()).into());
            }
            std::fs::write(&output, codec::encode_bytes(&data))?;
            println!("Encoded {} → {}", input.display(), output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn packages_root(dir: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    dir.or_else(store::default_packages_dir)
        .ok_or_else(|| "cannot determine home directory; pass --packages-dir".into())
}

/// Returns the package name (for exporter lookup) and the index path.
fn resolve_target(target: &str, packages_dir: Option<PathBuf>) -> Result<(String, PathBuf), Box<dyn std::error::Error>> {
    let path = Path::new(target);
    if path.is_file() {
        return Ok((package_of_index(path), path.to_owned()));
    }
    let root = packages_root(packages_dir)?;
    let (_, index_path) = store::find_index(&root.join(target))
        .ok_or_else(|| StoreError::IndexMissing(target.to_owned()))?;
    Ok((target.to_owned(), index_path))
}

/// `<package>/SystemAppData/wgs/<folder>/containers.index` → `<package>`.
fn package_of_index(index_path: &Path) -> String {
    index_path
        .ancestors()
        .nth(4)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_scan(scan: &PackageScan) {
    println!("── containers.index ─────────────────────────────────────");
    println!("  Path           {}", scan.index_path.display());
    match &scan.header {
        Some(h) => {
            println!("  Version        {}", h.version);
            println!("  Package        {}", h.package_name);
            println!("  Containers     {} declared, {} found", h.container_count, scan.containers.len());
            println!("  Modified       {}", h.timestamp.to_rfc3339());
            println!("  Container ID   {}", h.container_id.as_deref().unwrap_or("—"));
        }
        None => println!("  Header         unrecognised, {} containers found", scan.containers.len()),
    }

    println!();
    println!("{:<24} {:<12} {:>4}  {:<36}  Files", "Container", "Identifier", "Seq", "GUID");
    for c in &scan.containers {
        let table_error = c.table.as_ref().and_then(|t| t.error.as_ref());
        let files = match (&c.files, &c.error, table_error) {
            (Some(files), _, _) => files.len().to_string(),
            (None, Some(err), _) => format!("! {err}"),
            (None, None, Some(err)) => format!("! {err}"),
            (None, None, None) => "—".into(),
        };
        println!("{:<24} {:<12} {:>4}  {:<36}  {}",
            c.record.display_name, c.record.identifier, c.record.sequence, c.record.guid, files);
    }

    for c in &scan.containers {
        let Some(files) = &c.files else { continue };
        println!();
        println!("{} ({})", c.record.display_name, c.folder_name);
        for f in files {
            println!("  {:<40} {:>10} B  {}",
                f.record.filename.as_deref().unwrap_or("(no name)"),
                f.size,
                f.file_guid.as_deref().unwrap_or("—"));
        }
    }
}
