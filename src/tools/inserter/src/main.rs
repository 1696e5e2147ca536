//! Host tool that prepares disk images for the kernel.
//!
//! Formats the image on first use and writes files or directories into it
//! through the same storage engine the kernel runs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ember_common::fs::{FileName, BLOCK_SIZE, ROOT_CLUSTER};
use ember_hal::{BlockDevice, DeviceError};
use ember_kernel::fs::{Fat32, Mount};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Insert files into an Ember disk image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Disk image, created if missing
    image: PathBuf,

    /// Host file to insert
    source: Option<PathBuf>,

    /// Name on disk as NAME.EXT (defaults to the source file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Create a directory with this name instead of inserting a file
    #[arg(long, conflicts_with = "source")]
    mkdir: Option<String>,

    /// Cluster of the parent directory
    #[arg(short, long, default_value_t = ROOT_CLUSTER)]
    parent: u32,

    /// Size of a newly created image in MiB
    #[arg(long, default_value_t = 1)]
    size_mb: u64,

    /// List the parent directory afterwards
    #[arg(short, long)]
    list: bool,

    /// Print storage engine logs
    #[arg(short, long)]
    verbose: bool,
}

/// A disk image file as a block device.
struct FileDisk {
    file: File,
    blocks: u32,
}

impl FileDisk {
    fn open(path: &PathBuf, size_mb: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("cannot open image {}", path.display()))?;
        let mut len = file.metadata()?.len();
        if len == 0 {
            len = size_mb * 1024 * 1024;
            file.set_len(len).context("cannot size image")?;
        }
        let blocks = u32::try_from(len / BLOCK_SIZE as u64).context("image too large")?;
        Ok(Self { file, blocks })
    }

    fn seek_to(&mut self, lba: u32, len: usize) -> Result<(), DeviceError> {
        if len % BLOCK_SIZE != 0 {
            return Err(DeviceError::Misaligned);
        }
        let end = u64::from(lba) + (len / BLOCK_SIZE) as u64;
        if end > u64::from(self.blocks) {
            return Err(DeviceError::OutOfRange);
        }
        self.file
            .seek(SeekFrom::Start(u64::from(lba) * BLOCK_SIZE as u64))
            .map_err(|_| DeviceError::Io)?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> u32 {
        self.blocks
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.seek_to(lba, buf.len())?;
        self.file.read_exact(buf).map_err(|_| DeviceError::Io)
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        self.seek_to(lba, buf.len())?;
        self.file.write_all(buf).map_err(|_| DeviceError::Io)
    }
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.verbose {
        log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("{}", e))?;
        log::set_max_level(log::LevelFilter::Debug);
    }

    let disk = FileDisk::open(&args.image, args.size_mb)?;
    let mut volume = Box::new(Fat32::new(disk));
    match volume.initialize().context("cannot mount image")? {
        Mount::Formatted => println!("Formatted {}", args.image.display()),
        Mount::Loaded => {}
    }

    if let Some(dir) = &args.mkdir {
        let name = FileName::parse(dir);
        let cluster = volume
            .write(&name, args.parent, &[])
            .with_context(|| format!("cannot create directory {}", name))?;
        println!("Created directory {} at cluster {}", name, cluster);
    } else if let Some(source) = &args.source {
        let data = fs::read(source).with_context(|| format!("cannot read {}", source.display()))?;
        if data.is_empty() {
            bail!("{} is empty; use --mkdir for directories", source.display());
        }
        let label = match &args.name {
            Some(name) => name.clone(),
            None => source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned)
                .context("source has no usable file name")?,
        };
        let name = FileName::parse(&label);
        let cluster = volume
            .write(&name, args.parent, &data)
            .with_context(|| format!("cannot insert {}", name))?;
        println!("Inserted {} ({} bytes) at cluster {}", name, data.len(), cluster);
    } else if !args.list {
        bail!("nothing to do: give a source file, --mkdir or --list");
    }

    if args.list {
        println!("Directory at cluster {}:", args.parent);
        volume.for_each_entry(args.parent, |entry| {
            let kind = if entry.is_directory() { "<DIR>" } else { "" };
            println!(
                "  {:<12} {:>8} {:>5} cluster {}",
                entry.file.to_string(),
                entry.size,
                kind,
                entry.cluster()
            );
        })
        .context("cannot list directory")?;
        println!("{} clusters free", volume.free_clusters());
    }
    Ok(())
}
