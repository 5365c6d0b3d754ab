//! Package listing.
//!
//! One line per entry, `ls -l` style:
//!
//! ```text
//! -rw-r--r-- root/root           4 2024-01-01 00:00:00 ./debian-binary
//!     drwxr-xr-x root/root           0 2024-01-01 00:00:00 ./usr
//! ```
//!
//! Entries inside the control and data streams are indented by four spaces.

use crate::entry::{Entry, EntryKind};
use crate::error::Result;
use crate::package::{PackageVisitor, read_package};
use crate::walk::Section;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::io::{Read, Write};

/// Indent applied to entries of the inner streams.
pub const NESTED_INDENT: usize = 4;

/// Ten-character permission string: kind flag plus `rwx` triples.
pub fn permission_string(kind: EntryKind, mode: u32) -> String {
    let mut perms = String::with_capacity(10);
    perms.push(if kind == EntryKind::Directory { 'd' } else { '-' });

    let mut mask = 0o400;
    for flag in ['r', 'w', 'x'].iter().cycle().take(9) {
        perms.push(if mode & mask == mask { *flag } else { '-' });
        mask >>= 1;
    }
    perms
}

/// `owner/group`, preferring names and falling back to numeric ids.
pub fn owner_string(entry: &Entry) -> String {
    let owner = match &entry.uname {
        Some(name) => name.clone(),
        None => entry.uid.to_string(),
    };
    let group = match &entry.gname {
        Some(name) => name.clone(),
        None => entry.gid.to_string(),
    };
    format!("{owner}/{group}")
}

/// Format one listing line (without the trailing newline).
pub fn format_entry<Tz>(entry: &Entry, indent: usize, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mtime = DateTime::<Utc>::from_timestamp(entry.mtime, 0)
        .unwrap_or_default()
        .with_timezone(tz);

    format!(
        "{:indent$}{} {:<10} {:>10} {} {}",
        "",
        permission_string(entry.kind, entry.mode),
        owner_string(entry),
        entry.size,
        mtime.format("%Y-%m-%d %H:%M:%S"),
        entry.name,
    )
}

/// Writes one formatted line per package entry.
pub struct Listing<W: Write, Tz: TimeZone> {
    out: W,
    tz: Tz,
}

impl<W, Tz> Listing<W, Tz>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Create a listing writing to `out`, showing times in `tz`.
    pub fn new(out: W, tz: Tz) -> Self {
        Self { out, tz }
    }

    /// List the package read from `source`.
    ///
    /// The version marker is read but not validated.
    pub fn list<R: Read>(&mut self, source: R) -> Result<()> {
        read_package(source, self)?;
        self.out.flush()?;
        Ok(())
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W, Tz> PackageVisitor for Listing<W, Tz>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    fn outer_entry(&mut self, entry: &Entry) -> Result<()> {
        writeln!(self.out, "{}", format_entry(entry, 0, &self.tz))?;
        Ok(())
    }

    fn member_entry(
        &mut self,
        _section: Section,
        entry: &Entry,
        _payload: &mut dyn Read,
    ) -> Result<()> {
        writeln!(self.out, "{}", format_entry(entry, NESTED_INDENT, &self.tz))?;
        Ok(())
    }
}

/// One entry of a package with its position.
#[derive(Debug, Clone, Serialize)]
pub struct ListedEntry {
    /// Inner stream holding the entry; `None` for outer entries.
    pub section: Option<Section>,
    #[serde(flatten)]
    pub entry: Entry,
}

/// Collects every entry of a package in visit order.
#[derive(Debug, Default)]
pub struct EntryCollector {
    pub entries: Vec<ListedEntry>,
}

impl EntryCollector {
    /// Collect the entries of the package read from `source`.
    pub fn collect<R: Read>(source: R) -> Result<Vec<ListedEntry>> {
        let mut collector = Self::default();
        read_package(source, &mut collector)?;
        Ok(collector.entries)
    }
}

impl PackageVisitor for EntryCollector {
    fn outer_entry(&mut self, entry: &Entry) -> Result<()> {
        self.entries.push(ListedEntry {
            section: None,
            entry: entry.clone(),
        });
        Ok(())
    }

    fn member_entry(
        &mut self,
        section: Section,
        entry: &Entry,
        _payload: &mut dyn Read,
    ) -> Result<()> {
        self.entries.push(ListedEntry {
            section: Some(section),
            entry: entry.clone(),
        });
        Ok(())
    }
}
