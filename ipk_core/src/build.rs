//! Package creation.

use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::owner::{IdentityResolver, Ownership, ResolvedOwnership};
use crate::package::{FORMAT_VERSION, VERSION_MEMBER, member_name};
use crate::stream::ArchiveWriter;
use crate::walk::{Partitioner, Section};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Settings for one package build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Owner/group override applied to every entry.
    pub ownership: Ownership,
    /// Enumerate each directory by file name for reproducible output.
    pub sort_entries: bool,
}

/// Creates packages from an input directory.
///
/// The ownership override is resolved once in [`PackageBuilder::new`] and
/// applied to every entry of every stream the builder writes.
pub struct PackageBuilder<'a> {
    ownership: ResolvedOwnership,
    sort_entries: bool,
    resolver: &'a dyn IdentityResolver,
}

impl<'a> PackageBuilder<'a> {
    /// Resolve the options against `resolver`.
    ///
    /// Fails if an override names an unknown user or group.
    pub fn new(options: BuildOptions, resolver: &'a dyn IdentityResolver) -> Result<Self> {
        Ok(Self {
            ownership: options.ownership.resolve(resolver)?,
            sort_entries: options.sort_entries,
            resolver,
        })
    }

    /// Write a package built from `input_dir` to `sink` and return the sink.
    ///
    /// The outer stream holds `./debian-binary`, `./control.tar.gz` and
    /// `./data.tar.gz`, in that order.
    pub fn build<W: Write>(&self, input_dir: &Path, sink: W) -> Result<W> {
        if !fs::metadata(input_dir)?.is_dir() {
            return Err(Error::Io {
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Not a directory: {}", input_dir.display()),
                ),
            });
        }

        let mut outer = ArchiveWriter::new(sink);

        let process = self.resolver.current()?;
        let marker = format!("{FORMAT_VERSION}\n");
        let version = Entry::file(
            VERSION_MEMBER,
            marker.len() as u64,
            0o644,
            chrono::Utc::now().timestamp(),
        );
        outer.write_bytes(
            &self.ownership.apply_synthesized(version, &process),
            marker.as_bytes(),
        )?;

        let mut control = ArchiveWriter::new(temp_sink("control-")?);
        let mut data = ArchiveWriter::new(temp_sink("data-")?);

        let mut counts = [0usize; 2];
        for item in Partitioner::new(input_dir, self.sort_entries, self.resolver) {
            let item = item?;
            let entry = self.ownership.apply(item.entry);
            let (writer, count) = match item.section {
                Section::Control => (&mut control, &mut counts[0]),
                Section::Data => (&mut data, &mut counts[1]),
            };
            if entry.kind == EntryKind::File {
                writer.write_entry(&entry, fs::File::open(&item.path)?)?;
            } else {
                writer.write_entry(&entry, io::empty())?;
            }
            *count += 1;
        }

        let control = control.finish()?;
        let data = data.finish()?;

        self.append_member(&mut outer, Section::Control, &control)?;
        self.append_member(&mut outer, Section::Data, &data)?;

        let sink = outer.finish()?;

        control.close()?;
        data.close()?;

        log::info!(
            "packaged {} ({} control entries, {} data entries)",
            input_dir.display(),
            counts[0],
            counts[1]
        );
        Ok(sink)
    }

    /// Build a package from `input_dir` into the file at `output`.
    ///
    /// The package is written next to `output` and renamed into place once
    /// complete; on failure no file is left at `output`.
    pub fn build_file(&self, input_dir: &Path, output: &Path) -> Result<()> {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let staged = NamedTempFile::new_in(dir)?;
        let staged = self.build(input_dir, staged)?;
        staged.as_file().sync_all()?;
        set_output_mode(staged.path())?;
        staged.persist(output)?;

        log::info!("wrote {}", output.display());
        Ok(())
    }

    /// Embed a finished inner stream as a regular file in the outer stream.
    fn append_member<W: Write>(
        &self,
        outer: &mut ArchiveWriter<W>,
        section: Section,
        stream: &NamedTempFile,
    ) -> Result<()> {
        let metadata = stream.as_file().metadata()?;
        let entry = Entry::from_metadata(member_name(section), stream.path(), &metadata, self.resolver)?
            .ok_or_else(|| Error::invalid_entry_name(member_name(section), "not a regular file"))?;
        outer.write_entry(&self.ownership.apply(entry), stream.reopen()?)
    }
}

/// Temporary sink for an inner stream, removed when dropped.
fn temp_sink(prefix: &str) -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tar.gz")
        .tempfile()?)
}

/// Give the finished package ordinary file permissions.
fn set_output_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    Ok(())
}
