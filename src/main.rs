//! CLI entry point: `info`, `copy`, `to-tiff`, `from-tiff`,
//! dispatched through a `clap` derive subcommand enum, with global logger
//! setup and error-to-exit-code mapping.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::error;

use tiffcore::commands::{Command, CopyCommand, FromTiffCommand, InfoCommand, ToTiffCommand};
use tiffcore::io::byte_order::ByteOrder;
use tiffcore::tiff::errors::TiffError;
use tiffcore::utils::logger::Logger;

#[derive(Parser)]
#[command(name = "tiffcore", version, about = "TIFF/BigTIFF inspection and conversion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the IFD chain of a TIFF/BigTIFF file.
    Info {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Copy a range of IFDs from one TIFF/BigTIFF file to another.
    Copy {
        src: PathBuf,
        dst: PathBuf,
        first: Option<usize>,
        last: Option<usize>,
        #[arg(long)]
        append: bool,
        #[arg(long)]
        repack: bool,
        #[arg(long, conflicts_with = "no_bigtiff")]
        bigtiff: bool,
        #[arg(long)]
        no_bigtiff: bool,
        #[arg(long, conflicts_with = "be")]
        le: bool,
        #[arg(long)]
        be: bool,
        #[arg(long)]
        quality: Option<u8>,
        /// Target compression code for --repack; keeps the source's own
        /// code per IFD when omitted.
        #[arg(long)]
        compression: Option<u64>,
    },
    /// Encode a JPEG/PNG/BMP source image as a single-IFD TIFF.
    ToTiff {
        src: PathBuf,
        dst: PathBuf,
        #[arg(long)]
        bigtiff: bool,
        #[arg(long)]
        quality: Option<u8>,
    },
    /// Decode one IFD of a TIFF/BigTIFF file into a JPEG/PNG/BMP raster.
    FromTiff {
        src: PathBuf,
        dst: PathBuf,
        ifd: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = Logger::init_global_logger("tiffcore.log") {
        eprintln!("Error setting up global logger: {}", e);
        process::exit(2);
    }

    let command: Box<dyn Command> = match cli.command {
        Commands::Info { file, json } => Box::new(InfoCommand::new(file, json)),
        Commands::Copy { src, dst, first, last, append, repack, bigtiff, no_bigtiff, le, be, quality, compression } => {
            let big_tiff = if bigtiff {
                Some(true)
            } else if no_bigtiff {
                Some(false)
            } else {
                None
            };
            let byte_order = if le {
                Some(ByteOrder::LittleEndian)
            } else if be {
                Some(ByteOrder::BigEndian)
            } else {
                None
            };
            let target_compression = if repack { compression } else { None };
            Box::new(CopyCommand {
                src,
                dst,
                append,
                target_compression,
                big_tiff,
                byte_order,
                first,
                last,
            })
        }
        Commands::ToTiff { src, dst, bigtiff, quality } => Box::new(ToTiffCommand { src, dst, big_tiff: bigtiff, quality }),
        Commands::FromTiff { src, dst, ifd } => Box::new(FromTiffCommand { src, dst, ifd_index: ifd }),
    };

    if let Err(e) = command.execute() {
        error!("command failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(exit_code_for(&e));
    }
}

/// Maps a `TiffError` to its exit code: 1 invalid input,
/// 2 I/O error, 3 unsupported-format error.
fn exit_code_for(error: &TiffError) -> i32 {
    match error {
        TiffError::IoError(_) => 2,
        TiffError::UnsupportedCompression(_) | TiffError::UnsupportedFormat(_) => 3,
        _ => 1,
    }
}
