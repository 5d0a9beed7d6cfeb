//! Binary entry point for the `pgzip` command-line tool.
//!
//! A thin external-collaborator layer over the `pgzip` library: argument
//! parsing, file opening, output-path derivation, and process exit codes.
//! None of the pipeline's invariants live here -- this binary only ever
//! calls into [`pgzip::pipeline::compress`] or
//! [`pgzip::decompress::decompress`] and reports what they return.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, warn};

use pgzip::config::{Config, Format};
use pgzip::{decompress, pipeline};

/// Parallel gzip/zlib/zip compression and decompression over deflate.
#[derive(Parser, Debug)]
#[command(name = "pgzip", version, about)]
struct Cli {
    /// Files to process. Reads stdin and writes stdout when empty.
    files: Vec<PathBuf>,

    /// Decompress instead of compress.
    #[arg(short = 'd', long)]
    decompress: bool,

    /// Number of compressor worker threads. `1` selects the single-threaded
    /// fallback.
    #[arg(short = 'p', long = "processes", default_value_t = default_workers())]
    processes: usize,

    /// Uncompressed block size in KiB.
    #[arg(short = 'b', long = "blocksize", default_value_t = 128)]
    block_size_kb: usize,

    /// Deflate compression level, 0-9.
    #[arg(short = 'L', long, default_value_t = 6)]
    level: u8,

    /// Output container format.
    #[arg(long, value_enum, default_value_t = FormatArg::Gzip)]
    format: FormatArg,

    /// Write to stdout and keep the input file(s).
    #[arg(short = 'c', long = "stdout")]
    to_stdout: bool,

    /// Keep the input file(s) (the default removes them after success).
    #[arg(short = 'k', long)]
    keep: bool,

    /// Overwrite an existing output file without prompting.
    #[arg(short = 'f', long)]
    force: bool,

    /// Do not seed each block with the previous block's trailing dictionary.
    #[arg(long = "no-dict")]
    no_dict: bool,

    /// List format, name, and size information instead of decompressing.
    #[arg(short = 'l', long)]
    list: bool,

    /// Increase logging verbosity; may be repeated.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Gzip,
    Zlib,
    Zip,
}

impl From<FormatArg> for Format {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Gzip => Format::Gzip,
            FormatArg::Zlib => Format::Zlib,
            FormatArg::Zip => Format::Zip,
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.files.is_empty() {
        return match run_stdio(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut failed = false;
    for path in &cli.files {
        if let Err(e) = run_file(&cli, path) {
            error!("{}: {e}", path.display());
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn build_config(cli: &Cli, name: Option<&Path>) -> pgzip::Result<Config> {
    let format: Format = cli.format.into();
    let cfg = Config {
        level: cli.level,
        workers: cli.processes,
        block_size: cli.block_size_kb * 1024,
        format,
        dict: !cli.no_dict,
        store_name: name.is_some(),
        store_mtime: name.is_some(),
        name: name.and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned().into_bytes()),
        mtime: name.and_then(|p| p.metadata().ok()).and_then(|m| m.modified().ok()).and_then(|t| {
            t.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_secs() as u32)
        }),
    };
    cfg.validate()
}

fn run_stdio(cli: &Cli) -> pgzip::Result<()> {
    if io::stdin().is_terminal() {
        return Err(pgzip::Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "refusing to read compressed data from a terminal")));
    }
    let stdin = BufReader::new(io::stdin());
    let mut stdout = BufWriter::new(io::stdout());

    if cli.list {
        let report = decompress::decompress(cli.processes, stdin, &mut io::sink())?;
        print_listing(None, &report);
        return Ok(());
    }

    if cli.decompress {
        let report = decompress::decompress(cli.processes, stdin, &mut stdout)?;
        stdout.flush()?;
        if report.trailing_junk {
            warn!("input has trailing junk which was ignored");
        }
    } else {
        let cfg = build_config(cli, None)?;
        pipeline::compress(&cfg, stdin, &mut stdout)?;
        stdout.flush()?;
    }
    Ok(())
}

fn run_file(cli: &Cli, input_path: &Path) -> pgzip::Result<()> {
    if cli.list {
        let mut input = BufReader::new(File::open(input_path)?);
        let report = decompress::decompress(cli.processes, &mut input, &mut io::sink())?;
        print_listing(Some(input_path), &report);
        return Ok(());
    }

    let output_path = derive_output_path(cli, input_path);

    if !cli.force && output_path.exists() {
        return Err(pgzip::Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists, use -f to overwrite", output_path.display()),
        )));
    }

    let input_file = File::open(input_path)?;
    let mut input = BufReader::new(input_file);
    let out_file = File::create(&output_path)?;
    let mut guard = CleanupGuard::new(output_path.clone());
    let mut output = BufWriter::new(out_file);

    if cli.decompress {
        let report = decompress::decompress(cli.processes, &mut input, &mut output)?;
        output.flush()?;
        if report.trailing_junk {
            warn!("{}: trailing junk which was ignored", input_path.display());
        }
    } else {
        let cfg = build_config(cli, Some(input_path))?;
        pipeline::compress(&cfg, &mut input, &mut output)?;
        output.flush()?;
    }

    guard.commit();
    drop(input);

    if !cli.keep {
        std::fs::remove_file(input_path)?;
    }
    Ok(())
}

/// Prints a single `gzip -l`-style summary line for a decoded stream. Sits
/// entirely in the CLI layer -- the library only hands back a
/// [`pgzip::decompress::DecodeReport`], the listing cosmetics named as out
/// of scope for the core are this function's job alone.
fn print_listing(path: Option<&Path>, report: &pgzip::decompress::DecodeReport) {
    let ratio = if report.uncompressed_len == 0 {
        0.0
    } else {
        100.0 * (1.0 - report.compressed_len as f64 / report.uncompressed_len as f64)
    };
    let label = path.map(|p| p.display().to_string()).or_else(|| {
        report.name.as_ref().map(|n| String::from_utf8_lossy(n).into_owned())
    });
    println!(
        "{:>10} {:>10} {:>6.1}% {:?} {}",
        report.compressed_len,
        report.uncompressed_len,
        ratio,
        report.format,
        label.unwrap_or_else(|| "-".to_string()),
    );
}

/// Derives the sibling output path for a file operation: `.gz`/`.zz`/`.zip`
/// appended for compression, stripped for decompression (falling back to
/// `.out` when the input carries none of the recognized suffixes).
fn derive_output_path(cli: &Cli, input_path: &Path) -> PathBuf {
    if cli.to_stdout {
        return PathBuf::from("/dev/stdout");
    }
    let format: Format = cli.format.into();
    if cli.decompress {
        let name = input_path.to_string_lossy();
        for suffix in [".gz", ".zz", ".zip", ".Z"] {
            if let Some(stripped) = name.strip_suffix(suffix) {
                return PathBuf::from(stripped);
            }
        }
        input_path.with_extension("out")
    } else {
        let suffix = match format {
            Format::Gzip => "gz",
            Format::Zlib => "zz",
            Format::Zip => "zip",
        };
        let mut out = input_path.as_os_str().to_owned();
        out.push(".");
        out.push(suffix);
        PathBuf::from(out)
    }
}

/// Deletes the output file on an early return unless [`Self::commit`] is
/// called first, mirroring the partial-output cleanup pigz performs on a
/// fatal error without needing a signal handler (see `error.rs` docs).
struct CleanupGuard {
    path: PathBuf,
    committed: bool,
}

impl CleanupGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, committed: false }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
