//! CLI command implementations
//!
//! Each subcommand (`info`, `copy`, `to-tiff`, `from-tiff`) is a `Command`
//! built directly from its parsed `clap` arguments in `main.rs`, following
//! a Command-pattern shape (`command_traits::Command`). `main.rs` dispatches
//! through a `clap` derive subcommand enum, which performs that dispatch
//! at parse time.

pub mod command_traits;
pub mod info_command;
pub mod copy_command;
pub mod to_tiff_command;
pub mod from_tiff_command;

pub use command_traits::Command;
pub use info_command::InfoCommand;
pub use copy_command::CopyCommand;
pub use to_tiff_command::ToTiffCommand;
pub use from_tiff_command::FromTiffCommand;
