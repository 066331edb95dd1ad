use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use openntfs_filesystems::ntfs::FileType;
use openntfs_filesystems::{Info, InfoKind, NtfsConfig, NtfsReader};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openntfs")]
#[command(about = "Read-only NTFS image inspector", long_about = None)]
struct Cli {
    /// JSON engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show volume geometry and label
    Info {
        /// Disk image or device node
        image: PathBuf,
    },
    /// List a directory
    Ls {
        image: PathBuf,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Write a file's contents to stdout
    Cat {
        image: PathBuf,
        path: String,
        /// Start at this byte
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Stop after this many bytes
        #[arg(long)]
        length: Option<u64>,
    },
    /// Show size, type and times of a file or directory
    Stat {
        image: PathBuf,
        path: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn mount(image: &Path, config: &NtfsConfig) -> anyhow::Result<NtfsReader> {
    NtfsReader::open_image(image, config.clone())
        .with_context(|| format!("Failed to mount NTFS image {}", image.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => NtfsConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => NtfsConfig::default(),
    };
    debug!("Engine config: {:?}", config);

    match cli.command {
        Commands::Info { image } => {
            let reader = mount(&image, &config)?;
            let geometry = reader.volume().geometry();
            let info = reader.filesystem_info().context("Failed to read volume information")?;

            println!("Image:           {}", image.display());
            println!("Label:           {}", if info.volume_label.is_empty() { "(none)" } else { info.volume_label.as_str() });
            println!("Serial:          {:016X}", geometry.serial_number);
            println!("Size:            {} bytes", info.volume_size);
            println!("Sector size:     {}", geometry.sector_size);
            println!("Cluster size:    {}", geometry.cluster_size);
            println!("FILE record:     {}", geometry.file_record_size);
            println!("INDX record:     {}", geometry.index_record_size);
            println!("$MFT offset:     {:#x}", geometry.first_mft_record);
            println!("$MFTMirr LCN:    {}", geometry.mft_mirror_lcn);
        }
        Commands::Ls { image, path } => {
            let reader = mount(&image, &config)?;
            let entries = reader
                .read_dir(&path)
                .with_context(|| format!("Failed to list {}", path))?;
            for entry in entries {
                let kind = match entry.file_type {
                    FileType::Directory => "dir ",
                    FileType::Symlink => "link",
                    FileType::Regular => "file",
                };
                println!("{} {:>12} {}", kind, entry.file_name.real_size, entry.name());
            }
        }
        Commands::Cat { image, path, offset, length } => {
            let reader = mount(&image, &config)?;
            let mut handle = reader.open(&path).with_context(|| format!("Failed to open {}", path))?;
            if handle.is_directory() {
                bail!("{} is a directory", path);
            }
            handle.set_position(offset).context("Failed to seek")?;

            let mut remaining = length.unwrap_or(u64::MAX);
            let mut buf = vec![0u8; 64 * 1024];
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            while remaining > 0 {
                let want = remaining.min(buf.len() as u64) as usize;
                let n = handle
                    .read(&mut buf[..want])
                    .with_context(|| format!("Failed to read {} at {}", path, handle.position()))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).context("Failed to write to stdout")?;
                remaining -= n as u64;
            }
            out.flush().context("Failed to flush stdout")?;
        }
        Commands::Stat { image, path } => {
            let reader = mount(&image, &config)?;
            let mut handle = reader.open(&path).with_context(|| format!("Failed to open {}", path))?;
            let Info::File(info) = handle.info(InfoKind::File).context("Failed to read file info")? else {
                bail!("unexpected info kind for {}", path);
            };
            let modified = info
                .modification_time
                .to_datetime()
                .map_or_else(|| "unknown".to_string(), |t| t.to_string());

            println!("Path:      {}", handle.path());
            println!("Type:      {}", if info.is_directory() { "directory" } else { "file" });
            println!("Size:      {}", info.file_size);
            println!("Allocated: {}", info.physical_size);
            println!("Modified:  {}", modified);
        }
    }

    Ok(())
}
