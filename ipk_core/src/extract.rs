//! Package extraction.

use crate::entry::{Entry, EntryKind, archive_path};
use crate::error::{Error, Result};
use crate::package::{FORMAT_VERSION, PackageVisitor, read_package};
use crate::walk::{CONTROL_DIR, Section};
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Unpacks packages into a directory.
///
/// Data entries land directly under the destination, control entries under
/// its `CONTROL` subdirectory.
#[derive(Debug)]
pub struct Extractor {
    dest: PathBuf,
    materialized: usize,
    /// Directory modes applied once their section has been written.
    pending_modes: Vec<(PathBuf, u32)>,
}

impl Extractor {
    /// Create an extractor targeting `dest`.
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            materialized: 0,
            pending_modes: Vec::new(),
        }
    }

    /// Extract the package read from `source`.
    ///
    /// The format version is checked only after every member has been
    /// extracted, so a package with a wrong version still leaves its files
    /// behind before the error is returned.
    pub fn extract<R: Read>(&mut self, source: R) -> Result<()> {
        fs::create_dir_all(&self.dest)?;

        let version = read_package(source, self)?;
        match version.as_deref() {
            Some(FORMAT_VERSION) => {
                log::info!(
                    "extracted {} entries into {}",
                    self.materialized,
                    self.dest.display()
                );
                Ok(())
            }
            other => Err(Error::unsupported_version(other.unwrap_or_default())),
        }
    }

    /// Extract the package file at `input`.
    pub fn extract_file(&mut self, input: &Path) -> Result<()> {
        let file = fs::File::open(input)?;
        self.extract(io::BufReader::new(file))
    }

    /// Root directory for a section.
    fn section_root(&self, section: Section) -> PathBuf {
        match section {
            Section::Control => self.dest.join(CONTROL_DIR),
            Section::Data => self.dest.clone(),
        }
    }

    /// Recreate one entry below `root`. Returns false if the kind was skipped.
    fn materialize(&mut self, root: &Path, entry: &Entry, payload: &mut dyn Read) -> Result<bool> {
        let target = root.join(entry.relative_path()?);
        self.check_parents(&target, &entry.name)?;

        match entry.kind {
            EntryKind::Directory => {
                if target != root {
                    remove_symlink(&target)?;
                }
                // Created writable; the entry's mode is applied in `end_section`.
                fs::DirBuilder::new().recursive(true).create(&target)?;
                self.pending_modes.push((target.clone(), entry.mode));
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_symlink(&target)?;
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(entry.mode)
                    .open(&target)?;
                let written = io::copy(payload, &mut file)?;
                if written != entry.size {
                    return Err(Error::size_mismatch(entry.name.clone(), entry.size, written));
                }
                // The open mode is filtered by the umask.
                fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode))?;
            }
            EntryKind::Symlink => {
                let link = link_target(entry)?;
                std::os::unix::fs::symlink(link, &target)?;
            }
            EntryKind::HardLink => {
                let link = link_target(entry)?;
                let source = root.join(archive_path(link)?);
                self.check_parents(&source, &entry.name)?;
                if fs::symlink_metadata(&source).is_err() {
                    return Err(Error::link_target(entry.name.clone(), link));
                }
                if fs::symlink_metadata(&target).is_ok() {
                    return Err(Error::path_exists(target));
                }
                fs::hard_link(&source, &target)?;
            }
            EntryKind::Other(flag) => {
                log::warn!(
                    "skipping {}: unsupported entry type {:?}",
                    entry.name,
                    char::from(flag)
                );
                return Ok(false);
            }
        }

        log::debug!("extracted {}", target.display());
        Ok(true)
    }

    /// Fail if any directory between the destination and `path` is a
    /// symbolic link, which an earlier entry could have planted.
    fn check_parents(&self, path: &Path, name: &str) -> Result<()> {
        let relative = path
            .strip_prefix(&self.dest)
            .map_err(|_| Error::invalid_entry_name(name, "outside the destination"))?;

        let mut current = self.dest.clone();
        for component in relative.parent().into_iter().flat_map(Path::components) {
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(Error::invalid_entry_name(
                        name,
                        format!("{} is a symbolic link", current.display()),
                    ));
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl PackageVisitor for Extractor {
    fn begin_section(&mut self, section: Section) -> Result<()> {
        self.pending_modes.clear();
        if section == Section::Control {
            let root = self.section_root(section);
            remove_symlink(&root)?;
            fs::DirBuilder::new().recursive(true).mode(0o755).create(root)?;
        }
        Ok(())
    }

    fn member_entry(
        &mut self,
        section: Section,
        entry: &Entry,
        payload: &mut dyn Read,
    ) -> Result<()> {
        let root = self.section_root(section);
        if self.materialize(&root, entry, payload)? {
            self.materialized += 1;
        }
        Ok(())
    }

    /// Apply directory modes deepest first, so a read-only directory never
    /// blocks the creation of its own children.
    fn end_section(&mut self, _section: Section) -> Result<()> {
        self.pending_modes.sort_by(|a, b| b.0.cmp(&a.0));
        for (path, mode) in self.pending_modes.drain(..) {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
        }
        Ok(())
    }
}

/// Remove `path` if it is a symbolic link, so writes never follow it.
fn remove_symlink(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(fs::remove_file(path)?),
        _ => Ok(()),
    }
}

fn link_target(entry: &Entry) -> Result<&str> {
    entry
        .link_target
        .as_deref()
        .ok_or_else(|| Error::decode(format!("link {} has no target", entry.name)))
}
