//! flashlog CLI
//!
//! Operates a log kept in a flash image file plus a small state file, so the
//! log survives between invocations like it survives resets on a device.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use flashlog::device::FileFlash;
use flashlog::state::FileWords;
use flashlog::{record, Config, FlashLog, FlashLogError, Recovery};

/// flashlog CLI
#[derive(Parser, Debug)]
#[command(name = "flashlog-cli")]
#[command(about = "Circular record log on a file-backed flash image")]
#[command(version)]
struct Args {
    /// Flash image file
    #[arg(short, long, default_value = "./flashlog.img")]
    flash: PathBuf,

    /// Recovery state file
    #[arg(short, long, default_value = "./flashlog.state")]
    state: PathBuf,

    /// Flash image size in KiB
    #[arg(long, default_value = "64")]
    flash_kib: u32,

    /// Page size in bytes
    #[arg(long, default_value = "256")]
    page_size: u32,

    /// Sector size in bytes
    #[arg(long, default_value = "4096")]
    sector_size: u32,

    /// Record size in bytes
    #[arg(short, long, default_value = "32")]
    record_size: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the log (recovering or resetting it) and print its state
    Init,

    /// Append one note per argument
    Push {
        /// Note texts
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Show the oldest note without removing it
    Peek,

    /// Remove the oldest notes
    Pop {
        /// How many notes to remove
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Print and remove every note
    Drain,

    /// Print pointers, capacity and counters
    Stats,

    /// Erase the whole log region
    EraseAll,
}

/// The record stored by the CLI
#[derive(Debug, Serialize, Deserialize)]
struct Note {
    /// Seconds since the unix epoch
    time: u32,
    text: String,
}

type CliLog = FlashLog<FileFlash, FileWords>;

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,flashlog=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("flashlog-cli failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> flashlog::Result<()> {
    tracing::debug!("flashlog v{}", flashlog::VERSION);

    let config = Config::builder()
        .page_size(args.page_size)
        .sector_size(args.sector_size)
        .record_size(args.record_size)
        .build();

    let flash = FileFlash::open(
        &args.flash,
        flash_bytes(args.flash_kib)?,
        args.page_size,
        args.sector_size,
    )?;
    let words = FileWords::open(&args.state)?;
    let mut log = FlashLog::open(config, flash, words)?;

    match args.command {
        Commands::Init => {
            match log.recovery() {
                Recovery::Restored { resynced } => {
                    println!("restored log ({} records found past the checkpoint)", resynced)
                }
                Recovery::Reset => println!("started empty log"),
            }
            print_stats(&log);
        }
        Commands::Push { texts } => {
            for text in texts {
                let note = Note { time: now(), text };
                let bytes = record::encode(&note, log.layout().record_size() as usize)?;
                let outcome = log.push(&bytes)?;
                if outcome.evicted > 0 {
                    println!("log full: {} oldest notes evicted", outcome.evicted);
                }
            }
            println!("count={}", log.count());
        }
        Commands::Peek => match log.peek()? {
            Some(bytes) => print_note(&bytes)?,
            None => println!("(empty)"),
        },
        Commands::Pop { count } => {
            let mut removed = 0;
            while removed < count && log.pop()? {
                removed += 1;
            }
            println!("removed {} notes, count={}", removed, log.count());
        }
        Commands::Drain => {
            while let Some(bytes) = log.pop_record()? {
                print_note(&bytes)?;
            }
        }
        Commands::Stats => print_stats(&log),
        Commands::EraseAll => {
            log.erase_all()?;
            println!("erased {} sectors", log.layout().sector_count());
        }
    }

    let (mut flash, _words) = log.close()?;
    flash.sync()
}

/// Flash image size in bytes; the device addresses it with 32 bits
fn flash_bytes(kib: u32) -> flashlog::Result<u32> {
    kib.checked_mul(1024).ok_or_else(|| {
        FlashLogError::Config(format!(
            "flash size of {} KiB does not fit a 32-bit address space",
            kib
        ))
    })
}

fn print_note(bytes: &[u8]) -> flashlog::Result<()> {
    let note: Note = record::decode(bytes)?;
    println!("@{} {}", note.time, note.text);
    Ok(())
}

fn print_stats(log: &CliLog) {
    let stats = log.stats();
    println!(
        "head={} tail={} count={} usable={} free={} slots={}",
        log.head(),
        log.tail(),
        log.count(),
        log.usable_capacity(),
        log.free_slots(),
        log.capacity_slots()
    );
    println!(
        "session: pushed={} popped={} evicted={} erases={} saves={}",
        stats.pushed, stats.popped, stats.evicted, stats.sector_erases, stats.state_saves
    );
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
