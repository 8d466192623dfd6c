//! `info` subcommand: opens a TIFF/BigTIFF file and prints its IFD chain,
//! using `tiff/ifd.rs`'s `Display for IFD`/`IFDEntry::description` for the
//! human-readable form and `serde_json` for `--json`.

use std::path::PathBuf;

use serde::Serialize;

use crate::commands::command_traits::Command;
use crate::io::stream::ByteStream;
use crate::reader::{Reader, ReaderOptions};
use crate::tiff::errors::TiffResult;
use crate::tiff::special_kinds::SpecialKinds;
use crate::utils::tag_utils;

pub struct InfoCommand {
    pub path: PathBuf,
    pub json: bool,
}

impl InfoCommand {
    pub fn new(path: PathBuf, json: bool) -> Self {
        InfoCommand { path, json }
    }
}

#[derive(Serialize)]
struct EntrySummary {
    tag: u16,
    name: String,
    field_type: u16,
    count: u64,
    value: u64,
}

#[derive(Serialize)]
struct IfdSummary {
    index: usize,
    offset: u64,
    width: Option<u64>,
    height: Option<u64>,
    samples_per_pixel: u64,
    special_kind: Option<&'static str>,
    entries: Vec<EntrySummary>,
}

#[derive(Serialize)]
struct FileSummary {
    path: String,
    big_tiff: bool,
    ifd_count: usize,
    ifds: Vec<IfdSummary>,
}

impl Command for InfoCommand {
    fn execute(&self) -> TiffResult<()> {
        let stream = ByteStream::open_read_only(&self.path)?;
        let mut reader = Reader::open(stream, ReaderOptions::default())?;
        let kinds = SpecialKinds::classify(reader.all_ifds());

        if self.json {
            let summary = FileSummary {
                path: self.path.display().to_string(),
                big_tiff: reader.is_big_tiff(),
                ifd_count: reader.all_ifds().len(),
                ifds: reader
                    .all_ifds()
                    .iter()
                    .enumerate()
                    .map(|(index, ifd)| {
                        let (width, height) = ifd.get_dimensions().map_or((None, None), |(w, h)| (Some(w), Some(h)));
                        IfdSummary {
                            index,
                            offset: ifd.offset,
                            width,
                            height,
                            samples_per_pixel: ifd.get_samples_per_pixel(),
                            special_kind: kinds[index].map(kind_name),
                            entries: ifd
                                .get_entries()
                                .iter()
                                .map(|e| EntrySummary {
                                    tag: e.tag,
                                    name: tag_utils::get_tag_name(e.tag).to_string(),
                                    field_type: e.field_type,
                                    count: e.count,
                                    value: e.value_offset,
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            };
            let text = serde_json::to_string_pretty(&summary)
                .map_err(|e| crate::tiff::errors::TiffError::GenericError(format!("JSON serialization failed: {}", e)))?;
            println!("{}", text);
        } else {
            println!("{}: {} IFD(s), {}", self.path.display(), reader.all_ifds().len(), if reader.is_big_tiff() { "BigTIFF" } else { "classic TIFF" });
            for (index, ifd) in reader.all_ifds().iter().enumerate() {
                if let Some(kind) = kinds[index] {
                    println!("  [{}]", kind_name(kind));
                }
                print!("{}", ifd);
            }
        }
        Ok(())
    }
}

fn kind_name(kind: crate::tiff::special_kinds::SpecialKind) -> &'static str {
    use crate::tiff::special_kinds::SpecialKind::*;
    match kind {
        Thumbnail => "thumbnail",
        Label => "label",
        Macro => "macro",
    }
}
