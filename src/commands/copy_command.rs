//! `copy` subcommand: copies an IFD range between TIFF files, optionally
//! recompressing, with an `indicatif` progress bar driven by the `Copier`'s
//! per-tile progress callback.

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::commands::command_traits::Command;
use crate::copier::{Copier, CopierOptions};
use crate::io::byte_order::ByteOrder;
use crate::io::stream::ByteStream;
use crate::reader::{Reader, ReaderOptions};
use crate::tiff::errors::TiffResult;
use crate::writer::{Writer, WriterOptions};

pub struct CopyCommand {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub append: bool,
    pub target_compression: Option<u64>,
    pub big_tiff: Option<bool>,
    pub byte_order: Option<ByteOrder>,
    pub first: Option<usize>,
    pub last: Option<usize>,
}

impl Command for CopyCommand {
    fn execute(&self) -> TiffResult<()> {
        let src_stream = ByteStream::open_read_only(&self.src)?;
        let mut reader = Reader::open(src_stream, ReaderOptions::default())?;

        let ifd_count_total = reader.all_ifds().len();
        let first = self.first.unwrap_or(0);
        let last = self.last.unwrap_or(ifd_count_total.saturating_sub(1));
        let ifd_count = last.saturating_sub(first) + 1;

        let mut options = WriterOptions::default();
        options.big_tiff = self.big_tiff.unwrap_or(false);
        if let Some(order) = self.byte_order {
            options.byte_order = order;
        }

        let mut writer = if self.append && self.dst.exists() {
            let dst_stream = ByteStream::open(&self.dst)?;
            Writer::open_append(dst_stream, options)?
        } else {
            let dst_stream = ByteStream::create(&self.dst)?;
            Writer::create(dst_stream, options)?
        };

        let bar = ProgressBar::new(ifd_count as u64);
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix("copy");

        let copier_options = CopierOptions {
            target_compression: self.target_compression,
            predictor: 0,
            missing_tiles_allowed: false,
        };

        let mut last_image_seen = usize::MAX;
        Copier::copy_range(
            &mut reader,
            &mut writer,
            first,
            ifd_count,
            &copier_options,
            Some(&mut |image_index, image_count, _tile_index, _tile_count, last_tile| {
                if last_tile && image_index != last_image_seen {
                    last_image_seen = image_index;
                    bar.set_message(format!("image {}/{}", image_index + 1, image_count));
                    bar.inc(1);
                }
            }),
        )?;
        bar.finish_and_clear();

        writer.finish()?;
        println!("copied {} IFD(s) from {} to {}", ifd_count, self.src.display(), self.dst.display());
        Ok(())
    }
}
