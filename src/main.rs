//! Binary entry point for the `fqc` command-line tool.
//!
//! A thin shell over the library's four operations. Exit codes are part
//! of the contract: 0 success, 1 usage, 2 I/O, 3 format/version,
//! 4 checksum, 5 unsupported codec.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use fqc::display::{display_line, set_notification_level};
use fqc::{
    Config, DecodeOptions, FqcError, IdMode, LengthMode, OutputSink, QualityMode, RangeSelector,
    VerifyMode,
};

#[derive(Parser)]
#[command(name = "fqc", version, about = "FASTQ archive engine")]
struct Cli {
    /// Increase verbosity (repeatable).
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Silence all output.
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a FASTQ file into an archive.
    Compress(CompressArgs),
    /// Decompress an archive back to FASTQ.
    Decompress(DecompressArgs),
    /// Check archive integrity.
    Verify(VerifyArgs),
    /// Print archive metadata.
    Info { archive: PathBuf },
}

#[derive(Args)]
struct CompressArgs {
    input: PathBuf,
    output: PathBuf,
    /// Worker threads (0 = all cores).
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// Keep reads in input order (disables the reordering analysis).
    #[arg(long)]
    preserve_order: bool,
    /// Skip the reordering analysis but keep archive-order storage.
    #[arg(long)]
    no_reorder: bool,
    /// Single-pass mode; implies --preserve-order.
    #[arg(long)]
    streaming: bool,
    /// lossless | illumina8 | qvz | discard
    #[arg(long, default_value = "lossless")]
    quality_mode: String,
    /// exact | tokenize | discard
    #[arg(long, default_value = "tokenize")]
    id_mode: String,
    /// auto | short | medium | long
    #[arg(long, default_value = "auto")]
    length_mode: String,
    /// Reads per block (0 = length-class default).
    #[arg(long, default_value_t = 0)]
    block_reads: u32,
    /// Cap on bases per block.
    #[arg(long)]
    max_block_bases: Option<u64>,
    /// Memory budget in MiB (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    memory_limit_mb: usize,
    /// Input is interleaved paired-end.
    #[arg(long)]
    paired: bool,
    /// Encode LONG reads with the overlap codec.
    #[arg(long)]
    overlap: bool,
}

#[derive(Args)]
struct DecompressArgs {
    archive: PathBuf,
    /// Output FASTQ path (stdout if omitted).
    output: Option<PathBuf>,
    /// Worker threads (0 = all cores).
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// Replace corrupted blocks with placeholder reads.
    #[arg(long)]
    skip_corrupted: bool,
    /// Write mates of an interleaved archive to <OUTPUT> and this path.
    #[arg(long)]
    split_pe: Option<PathBuf>,
    /// Archive-id range `start:end` (half-open).
    #[arg(long)]
    range: Option<String>,
    /// Original-id range `start:end` (half-open; needs the reorder map).
    #[arg(long)]
    original_range: Option<String>,
}

#[derive(Args)]
struct VerifyArgs {
    archive: PathBuf,
    /// Decode every block instead of checking only checksums and index.
    #[arg(long)]
    full: bool,
}

fn parse_range(text: &str) -> Result<(u64, u64), FqcError> {
    let (a, b) = text
        .split_once(':')
        .ok_or_else(|| FqcError::Usage(format!("range '{text}' is not start:end")))?;
    let start: u64 = a
        .parse()
        .map_err(|_| FqcError::Usage(format!("bad range start '{a}'")))?;
    let end: u64 = b
        .parse()
        .map_err(|_| FqcError::Usage(format!("bad range end '{b}'")))?;
    if start >= end {
        return Err(FqcError::Usage(format!("empty range '{text}'")));
    }
    Ok((start, end))
}

fn build_config(args: &CompressArgs) -> Result<Config, FqcError> {
    let quality_mode = match args.quality_mode.as_str() {
        "lossless" => QualityMode::Lossless,
        "illumina8" => QualityMode::Illumina8,
        "qvz" => QualityMode::Qvz,
        "discard" => QualityMode::Discard,
        other => {
            return Err(FqcError::Usage(format!("unknown quality mode '{other}'")));
        }
    };
    let id_mode = match args.id_mode.as_str() {
        "exact" => IdMode::Exact,
        "tokenize" => IdMode::Tokenize,
        "discard" => IdMode::Discard,
        other => return Err(FqcError::Usage(format!("unknown id mode '{other}'"))),
    };
    let length_mode = match args.length_mode.as_str() {
        "auto" => LengthMode::Auto,
        "short" => LengthMode::Short,
        "medium" => LengthMode::Medium,
        "long" => LengthMode::Long,
        other => return Err(FqcError::Usage(format!("unknown length mode '{other}'"))),
    };
    let mut config = Config {
        threads: args.threads,
        reorder: !args.no_reorder,
        preserve_order: args.preserve_order || args.streaming,
        streaming: args.streaming,
        quality_mode,
        id_mode,
        length_mode,
        block_reads: args.block_reads,
        memory_limit_mb: args.memory_limit_mb,
        paired: args.paired,
        overlap_long_reads: args.overlap,
        ..Config::default()
    };
    if let Some(bases) = args.max_block_bases {
        config.max_block_bases = bases;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Compress(args) => {
            let config = build_config(&args)?;
            let stats = fqc::ops::compress_path(&args.input, &args.output, &config)?;
            display_line(
                2,
                &format!(
                    "compressed {} reads ({} bases) into {} bytes ==> {:.2}%",
                    stats.reads,
                    stats.bases,
                    stats.bytes_out,
                    stats.ratio_percent()
                ),
            );
            let [ids, seq, qual, aux] = stats.substream_bytes;
            display_line(
                3,
                &format!("substreams: ids {ids}  seq {seq}  qual {qual}  aux {aux}"),
            );
            Ok(())
        }
        Command::Decompress(args) => {
            let range = match (&args.range, &args.original_range) {
                (Some(_), Some(_)) => {
                    return Err(FqcError::Usage(
                        "--range and --original-range are mutually exclusive".into(),
                    )
                    .into())
                }
                (Some(r), None) => {
                    let (s, e) = parse_range(r)?;
                    RangeSelector::ArchiveIds(s, e)
                }
                (None, Some(r)) => {
                    let (s, e) = parse_range(r)?;
                    RangeSelector::OriginalIds(s, e)
                }
                (None, None) => RangeSelector::All,
            };
            let options = DecodeOptions {
                range,
                skip_corrupted: args.skip_corrupted,
                threads: args.threads,
            };

            let create = |p: &PathBuf| {
                std::fs::File::create(p)
                    .with_context(|| format!("cannot create {}", p.display()))
            };
            let stats = match (&args.output, &args.split_pe) {
                (Some(out1), Some(out2)) => {
                    let mut w1 = BufWriter::new(create(out1)?);
                    let mut w2 = BufWriter::new(create(out2)?);
                    let stats = fqc::ops::decompress(
                        &args.archive,
                        OutputSink::SplitPe(&mut w1, &mut w2),
                        &options,
                    )?;
                    w1.flush()?;
                    w2.flush()?;
                    stats
                }
                (None, Some(_)) => {
                    return Err(FqcError::Usage(
                        "--split-pe needs an explicit first output path".into(),
                    )
                    .into())
                }
                (Some(out), None) => {
                    let mut w = BufWriter::new(create(out)?);
                    let stats =
                        fqc::ops::decompress(&args.archive, OutputSink::Single(&mut w), &options)?;
                    w.flush()?;
                    stats
                }
                (None, None) => {
                    let stdout = std::io::stdout();
                    let mut w = BufWriter::new(stdout.lock());
                    let stats =
                        fqc::ops::decompress(&args.archive, OutputSink::Single(&mut w), &options)?;
                    w.flush()?;
                    stats
                }
            };
            display_line(
                2,
                &format!(
                    "decompressed {} reads ({} bases), {} corrupted block(s)",
                    stats.reads,
                    stats.bases,
                    stats.corrupted_blocks.len()
                ),
            );
            Ok(())
        }
        Command::Verify(args) => {
            let mode = if args.full {
                VerifyMode::Full
            } else {
                VerifyMode::Quick
            };
            let report = fqc::ops::verify(&args.archive, mode)?;
            if report.is_ok() {
                display_line(
                    2,
                    &format!("ok: {} block(s) verified", report.total_blocks),
                );
                Ok(())
            } else {
                display_line(
                    1,
                    &format!(
                        "FAILED: global checksum {}, failing blocks {:?}",
                        if report.global_checksum_ok { "ok" } else { "mismatch" },
                        report.failed_blocks
                    ),
                );
                Err(FqcError::ChecksumMismatch {
                    block_id: report.failed_blocks.first().copied(),
                    expected: 0,
                    actual: 0,
                }
                .into())
            }
        }
        Command::Info { archive } => {
            let summary = fqc::ops::info(&archive)?;
            let mut out = std::io::stdout().lock();
            writeln!(out, "file size:       {} bytes", summary.file_len)?;
            writeln!(out, "reads:           {}", summary.total_read_count)?;
            writeln!(out, "blocks:          {}", summary.block_count)?;
            writeln!(out, "length class:    {:?}", summary.length_class)?;
            writeln!(out, "quality mode:    {:?}", summary.quality_mode)?;
            writeln!(out, "id mode:         {:?}", summary.id_mode)?;
            writeln!(out, "paired:          {}", summary.paired)?;
            writeln!(out, "preserve order:  {}", summary.preserve_order)?;
            writeln!(out, "reorder map:     {}", summary.has_reorder_map)?;
            writeln!(out, "streaming:       {}", summary.streaming)?;
            writeln!(out, "source file:     {}", summary.original_filename)?;
            writeln!(out, "timestamp:       {}", summary.timestamp)?;
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.quiet {
        0
    } else {
        2 + i32::from(cli.verbose)
    };
    set_notification_level(level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display_line(1, &format!("fqc: {e:#}"));
            let code = e
                .downcast_ref::<FqcError>()
                .map(|f| f.exit_code())
                .unwrap_or(2);
            ExitCode::from(code as u8)
        }
    }
}
