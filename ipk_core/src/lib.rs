//! # ipk Core
//!
//! Build, extract and inspect ipk packages.
//!
//! A package is a gzip-compressed tar stream holding three entries, in order:
//! `./debian-binary` (the format version, `2.0`), `./control.tar.gz`
//! (package metadata and scripts) and `./data.tar.gz` (the files to install).
//! The two members are gzip-compressed tar streams themselves.
//!
//! ## Features
//!
//! - Build a package from a directory: a top-level `CONTROL` subdirectory
//!   becomes the control stream, everything else the data stream
//! - Override the owner and group of every archived entry
//! - Extract regular files, directories, symbolic links and hard links
//! - List package contents `ls -l` style
//!
//! Unix only: modes, ownership and links are taken from and written to a
//! POSIX filesystem.
//!
//! ## Example
//!
//! ```no_run
//! use ipk_core::{BuildOptions, Extractor, PackageBuilder, SystemResolver};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Build a package from a staging directory
//! let builder = PackageBuilder::new(BuildOptions::default(), &SystemResolver)?;
//! builder.build_file(Path::new("./staging"), Path::new("./demo.ipk"))?;
//!
//! // Unpack it again
//! Extractor::new("./unpacked").extract_file(Path::new("./demo.ipk"))?;
//! # Ok(())
//! # }
//! ```

mod build;
mod entry;
mod error;
mod extract;
mod listing;
mod owner;
mod package;
mod stream;
mod walk;

pub use build::{BuildOptions, PackageBuilder};
pub use entry::{Entry, EntryKind, archive_path};
pub use error::{Error, Result};
pub use extract::Extractor;
pub use listing::{
    EntryCollector, ListedEntry, Listing, NESTED_INDENT, format_entry, owner_string,
    permission_string,
};
pub use owner::{Identity, IdentityResolver, Ownership, ResolvedOwnership, SystemResolver};
pub use package::{
    CONTROL_MEMBER, DATA_MEMBER, FORMAT_VERSION, PackageVisitor, VERSION_MEMBER, member_name,
    read_package,
};
pub use stream::{ArchiveReader, ArchiveWriter, Entries, Payload};
pub use walk::{CONTROL_DIR, PartitionedEntry, Partitioner, Placement, Section, classify};
