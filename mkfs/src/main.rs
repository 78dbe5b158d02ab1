//! `mkfs`: builds a filesystem image for the KT kernel.
//!
//! Takes an output path, an image size (`32M`, `512K`, or a bare byte
//! count), an inode count, and a list of host files to seed into the root
//! directory, and writes out an image matching `kernel::fs::layout`'s
//! on-disk format.

mod image;
mod layout;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use image::Image;
use layout::FS_BLOCK_SIZE;

#[derive(Parser)]
#[command(name = "mkfs")]
#[command(about = "Build a KT filesystem image")]
struct Cli {
    /// Path to write the image to.
    #[arg(short, long)]
    output: PathBuf,

    /// Image size, e.g. "32M", "512K", or a bare byte count.
    #[arg(short, long, default_value = "1M")]
    size: String,

    /// Number of inode slots to reserve (root directory takes one).
    #[arg(short, long, default_value_t = 64)]
    inodes: u32,

    /// Host files to copy into the root directory, named by their file name.
    files: Vec<PathBuf>,
}

fn parse_size(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last() {
        Some('K' | 'k') => (&raw[..raw.len() - 1], 1024u64),
        Some('M' | 'm') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some('G' | 'g') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        Some(_) => (raw, 1),
        None => bail!("empty --size value"),
    };
    let value: u64 = digits.parse().with_context(|| format!("invalid --size value '{raw}'"))?;
    Ok(value * multiplier)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let size_bytes = parse_size(&cli.size)?;
    let total_blocks = (size_bytes / FS_BLOCK_SIZE as u64) as u32;
    if total_blocks == 0 {
        bail!("--size {} is smaller than one block ({FS_BLOCK_SIZE} bytes)", cli.size);
    }

    let inode_count = cli.inodes.max(cli.files.len() as u32 + 1);
    let mut image = Image::new(total_blocks, inode_count)?;

    for path in &cli.files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("'{}' has no usable file name", path.display()))?;
        let contents = fs::read(path).with_context(|| format!("reading '{}'", path.display()))?;
        log::info!("adding '{name}' ({} bytes)", contents.len());
        image.add_file(name, &contents)?;
    }

    let bytes = image.finish();
    fs::write(&cli.output, &bytes).with_context(|| format!("writing image to '{}'", cli.output.display()))?;
    log::info!("wrote {} ({} blocks)", cli.output.display(), total_blocks);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_handles_suffixes_and_bare_bytes() {
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("32M").unwrap(), 32 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("4096").unwrap(), 4096);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("nope").is_err());
        assert!(parse_size("").is_err());
    }
}
