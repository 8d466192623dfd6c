pub mod io;
pub mod tiff;
pub mod utils;
pub mod compression;
pub mod sample_packing;
pub mod reader;
pub mod writer;
pub mod copier;
pub mod commands;

pub use reader::{OpenMode, Reader, ReaderOptions};
pub use writer::{Writer, WriterOptions, WriterState};
pub use copier::{Copier, CopierOptions, ProgressCallback};
pub use tiff::{SpecialKind, SpecialKinds};
pub use tiff::tile_map::Region;