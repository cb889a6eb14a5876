//! Recording inspector - summarise recordings and dump frames
//!
//! Usage:
//!   cargo run --bin inspect -- recordings/menu.<id>.rgrec.zip
//!   cargo run --bin inspect -- recordings/menu.<id>.rgrec.zip --frame 12
//!   cargo run --bin inspect -- --catalog recordings.db

use playtest::RecordingCatalog;
use playtest::recording::RecordingReader;
use std::path::Path;

enum Command {
    Summary { path: String, frame: Option<u64> },
    Catalog { path: String },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut path = None;
    let mut frame = None;
    let mut catalog = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frame" | "-f" => {
                let raw = args.get(i + 1).ok_or("--frame requires a frame number")?;
                frame = Some(
                    raw.parse::<u64>()
                        .map_err(|_| format!("Invalid frame number: {}", raw))?,
                );
                i += 1;
            }
            "--catalog" => {
                catalog = Some(
                    args.get(i + 1)
                        .cloned()
                        .ok_or("--catalog requires a database path")?,
                );
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("Unknown argument: {}", other)),
            other => path = Some(other.to_string()),
        }
        i += 1;
    }

    match (catalog, path) {
        (Some(catalog), _) => Ok(Command::Catalog { path: catalog }),
        (None, Some(path)) => Ok(Command::Summary { path, frame }),
        (None, None) => Err("No recording given (try --help)".to_string()),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let result = match parse_args(&args) {
        Ok(Command::Summary { path, frame }) => summarize(&path, frame),
        Ok(Command::Catalog { path }) => list_catalog(&path),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn summarize(path: &str, frame: Option<u64>) -> Result<(), String> {
    let reader = RecordingReader::open(Path::new(path)).map_err(|e| e.to_string())?;
    let info = reader.info();

    println!("=== Recording: {} ===", info.name);
    println!("Id:          {}", info.id);
    println!("Format:      v{}", info.version);
    println!("Started:     {}", info.start_time);
    println!("Machine:     {} ({})", info.machine_name, info.user_name);
    println!(
        "Source:      {}",
        if reader.is_archive() { "archive" } else { "directory" }
    );
    println!(
        "Frames:      {} ({} snapshots, {} screenshots)",
        reader.frames().len(),
        reader.snapshot_count(),
        reader.screenshot_count()
    );
    if let (Some(first), Some(last)) = (reader.frames().first(), reader.frames().last()) {
        println!("Range:       {}..={}", first.frame, last.frame);
    }

    let Some(frame) = frame else {
        return Ok(());
    };
    let snapshot = reader
        .snapshot_at(frame)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("No snapshot at or before frame {}", frame))?;
    println!();
    if snapshot.frame.frame_count != frame {
        println!(
            "(frame {} unchanged since {})",
            frame, snapshot.frame.frame_count
        );
    }
    let json = snapshot.to_pretty_json().map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn list_catalog(path: &str) -> Result<(), String> {
    let catalog = RecordingCatalog::open(Path::new(path))
        .map_err(|e| format!("Failed to open catalog {}: {}", path, e))?;
    let entries = catalog
        .list()
        .map_err(|e| format!("Failed to read catalog {}: {}", path, e))?;

    println!(
        "{:<34} {:<20} {:<9} {:>7} {:>9}  Started",
        "Id", "Name", "Status", "Frames", "Failures"
    );
    for entry in &entries {
        println!(
            "{:<34} {:<20} {:<9} {:>7} {:>9}  {}",
            entry.id, entry.name, entry.status, entry.frames, entry.write_failures, entry.started_at
        );
        if let Some(error) = &entry.error {
            println!("    error: {}", error);
        }
    }
    println!("{} recording(s)", entries.len());
    Ok(())
}

fn print_help() {
    println!(
        r#"Inspect - Summarise playtest recordings

USAGE:
    cargo run --bin inspect -- <RECORDING> [OPTIONS]
    cargo run --bin inspect -- --catalog <FILE>

ARGS:
    <RECORDING>         Session directory or .rgrec.zip archive

OPTIONS:
    --frame, -f <N>     Print the world state as of frame N
    --catalog <FILE>    List sessions in a recording catalog
    --help, -h          Show this help
"#
    );
}
