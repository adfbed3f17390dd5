//! CLI for wellformed: validate files or directories and report both verdicts.

#![cfg(feature = "cli")]

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use clap::Parser;
use indexmap::IndexMap;
use log::debug;
use walkdir::WalkDir;
use wellformed::{detect_file_type, validate, FileType, ParseOptions, RepInfo, Severity, Tristate};

/// Bytes read up front for magic detection.
const HEAD_LEN: u64 = 16;

#[derive(Parser)]
#[command(name = "wellformed")]
#[command(about = "Check PNG, JPEG, GIF, TIFF and WAVE files for well-formedness and validity", long_about = None)]
struct Args {
    /// Path to a file or directory (use -d/--directory to scan a whole directory)
    path: Option<String>,

    /// Scan a whole directory (optionally with -r to recurse into subdirectories)
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    directory: Option<String>,

    /// When scanning a directory, recurse into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// File extensions to check (comma-separated). Files without an extension are always checked.
    #[arg(short, long, default_value = "png,apng,jpg,jpeg,jpe,jfif,gif,tif,tiff,dng,wav,wave,bwf")]
    extensions: String,

    /// Check all files and detect the type from content (ignore the extension filter)
    #[arg(long)]
    all: bool,

    /// Output JSON per file (one line per file unless --pretty)
    #[arg(long)]
    json: bool,

    /// Pretty-print JSON (use with --json)
    #[arg(long)]
    pretty: bool,

    /// Quiet: only print files that are not well-formed or not valid
    #[arg(short, long)]
    quiet: bool,

    /// Give up after this many units per file
    #[arg(long, value_name = "N")]
    max_units: Option<usize>,

    /// Largest TIFF stream, in bytes, buffered whole
    #[arg(long, value_name = "BYTES")]
    max_buffered: Option<u64>,

    /// Skip the whole-stream CRC-32 and SHA-256
    #[arg(long)]
    no_digests: bool,
}

impl Args {
    fn options(&self) -> ParseOptions {
        let mut options = ParseOptions::default().compute_digests(!self.no_digests);
        if let Some(n) = self.max_units {
            options = options.max_units(n);
        }
        if let Some(n) = self.max_buffered {
            options = options.max_buffered(n);
        }
        options
    }

    fn wants(&self, path: &Path, exts: &HashSet<String>) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        self.all || ext.is_empty() || exts.is_empty() || exts.contains(&ext)
    }
}

/// Running totals for the closing summary and the exit code.
#[derive(Default)]
struct Tally {
    total: u64,
    not_well_formed: u64,
    not_valid: u64,
    unknown: u64,
}

impl Tally {
    fn add(&mut self, info: &RepInfo, file_type: FileType) {
        self.total += 1;
        if file_type == FileType::Unknown {
            self.unknown += 1;
        } else if info.well_formed != Tristate::True {
            self.not_well_formed += 1;
        } else if info.valid != Tristate::True {
            self.not_valid += 1;
        }
    }

    fn failed(&self) -> bool {
        self.not_well_formed + self.not_valid > 0
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let exts: HashSet<String> = args
        .extensions
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let path_str = args
        .directory
        .as_ref()
        .or(args.path.as_ref())
        .ok_or("Missing path: give a file/directory as argument or use -d/--directory <DIR>")?;
    let path = Path::new(path_str.as_str());

    if !path.exists() {
        eprintln!("Not found: {}", path.display());
        std::process::exit(2);
    }

    let mut tally = Tally::default();
    if path.is_file() {
        if args.directory.is_some() {
            eprintln!("--directory expects a directory, not a file: {}", path.display());
            std::process::exit(2);
        }
        check_file(path, &args, &mut tally)?;
    } else if path.is_dir() {
        if !args.quiet {
            eprintln!("Scanning directory: {} {}", path.display(), if args.recursive { "(recursive)" } else { "" });
        }
        check_dir(path, &args, &exts, &mut tally)?;
        if !args.quiet {
            eprintln!(
                "Checked {} files: {} not well-formed, {} not valid, {} unrecognised",
                tally.total, tally.not_well_formed, tally.not_valid, tally.unknown
            );
        }
    } else {
        eprintln!("Not a file or directory: {}", path.display());
        std::process::exit(2);
    }

    if tally.failed() {
        std::process::exit(1);
    }
    Ok(())
}

fn check_dir(
    dir: &Path,
    args: &Args,
    exts: &HashSet<String>,
    tally: &mut Tally,
) -> Result<(), Box<dyn std::error::Error>> {
    let walker = if args.recursive {
        WalkDir::new(dir).into_iter()
    } else {
        WalkDir::new(dir).max_depth(1).into_iter()
    };
    for entry in walker.filter_entry(|e| !e.path().starts_with(".")) {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !args.wants(path, exts) {
            continue;
        }
        if let Err(err) = check_file(path, args, tally) {
            eprintln!("Cannot read {}: {}", path.display(), err);
        }
    }
    Ok(())
}

/// Detect the type from the first bytes, then stream the whole file through its module.
fn check_file(path: &Path, args: &Args, tally: &mut Tally) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut head = Vec::with_capacity(HEAD_LEN as usize);
    (&mut file).take(HEAD_LEN).read_to_end(&mut head)?;
    let file_type = detect_file_type(&head);
    debug!("{}: detected {}", path.display(), file_type.label());

    let info = validate(file_type, head.as_slice().chain(file), &args.options());
    tally.add(&info, file_type);
    print_result(&path.display().to_string(), file_type, &info, args)
}

fn verdict(info: &RepInfo) -> &'static str {
    match (info.well_formed, info.valid) {
        (Tristate::True, Tristate::True) => "VALID",
        (Tristate::True, _) => "NOT VALID",
        (Tristate::False, _) => "NOT WELL-FORMED",
        (Tristate::Undetermined, _) => "UNKNOWN",
    }
}

fn print_result(
    path: &str,
    file_type: FileType,
    info: &RepInfo,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let clean = info.well_formed == Tristate::True && info.valid == Tristate::True;
    if args.quiet && (clean || file_type == FileType::Unknown) {
        return Ok(());
    }
    if args.json {
        let mut out = IndexMap::<String, serde_json::Value>::new();
        out.insert("path".to_string(), serde_json::Value::String(path.to_string()));
        out.insert("verdict".to_string(), serde_json::Value::String(verdict(info).to_string()));
        out.insert("detected_type".to_string(), serde_json::to_value(file_type)?);
        out.insert("info".to_string(), serde_json::to_value(info)?);
        let json_str = if args.pretty {
            serde_json::to_string_pretty(&out)?
        } else {
            serde_json::to_string(&out)?
        };
        println!("{}", json_str);
        return Ok(());
    }

    let size_str = info.size.map(|n| format!(" ({} bytes)", n)).unwrap_or_default();
    println!("{} {}{}", verdict(info), path, size_str);
    if args.quiet {
        return Ok(());
    }
    let mut format = info.format.clone();
    if let Some(v) = &info.version {
        format.push(' ');
        format.push_str(v);
    }
    if let Some(m) = &info.mime_type {
        format.push_str(&format!(" [{}]", m));
    }
    println!("  format: {}", format);
    if !info.profiles.is_empty() {
        println!("  profiles: {}", info.profiles.join(", "));
    }
    for m in &info.messages {
        let level = match m.severity {
            Severity::Error => "error",
            Severity::Info => "info",
        };
        let at = m.offset.map(|o| format!(" @{}", o)).unwrap_or_default();
        match &m.sub_text {
            Some(sub) => println!("  {} {}{}: {} ({})", level, m.id, at, m.text, sub),
            None => println!("  {} {}{}: {}", level, m.id, at, m.text),
        }
    }
    for c in &info.checksums {
        println!("  {}: {}", c.algorithm.to_lowercase(), c.value);
    }
    Ok(())
}
