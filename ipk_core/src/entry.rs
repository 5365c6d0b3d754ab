//! Archive entries and their metadata.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Component, Path};

/// Kind of filesystem item an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// A regular file with a payload.
    File,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
    /// A hard link to an earlier entry.
    HardLink,
    /// Any other tar type flag (devices, fifos, ...). Listed, never materialized.
    Other(u8),
}

impl EntryKind {
    /// Convert to the tar type flag.
    pub fn to_tar(self) -> tar::EntryType {
        match self {
            EntryKind::File => tar::EntryType::Regular,
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::Symlink => tar::EntryType::Symlink,
            EntryKind::HardLink => tar::EntryType::Link,
            EntryKind::Other(flag) => tar::EntryType::new(flag),
        }
    }

    /// Parse from a tar type flag.
    pub fn from_tar(entry_type: tar::EntryType) -> Self {
        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::File,
            tar::EntryType::Directory => EntryKind::Directory,
            tar::EntryType::Symlink => EntryKind::Symlink,
            tar::EntryType::Link => EntryKind::HardLink,
            other => EntryKind::Other(other.as_byte()),
        }
    }

    /// Whether entries of this kind carry a payload.
    pub fn has_payload(self) -> bool {
        self == EntryKind::File
    }

    /// Whether entries of this kind carry a link target.
    pub fn is_link(self) -> bool {
        matches!(self, EntryKind::Symlink | EntryKind::HardLink)
    }
}

/// Metadata of one archived filesystem item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Archive-relative name, normally prefixed with `./`.
    pub name: String,
    /// Kind of item.
    pub kind: EntryKind,
    /// Payload size in bytes; zero for everything but regular files.
    pub size: u64,
    /// Permission bits (including setuid/setgid/sticky).
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
    /// Numeric owner id.
    pub uid: u64,
    /// Owner name, if known.
    pub uname: Option<String>,
    /// Numeric group id.
    pub gid: u64,
    /// Group name, if known.
    pub gname: Option<String>,
    /// Target of a symbolic or hard link.
    pub link_target: Option<String>,
}

impl Entry {
    /// Create a regular-file entry with empty ownership.
    pub fn file(name: impl Into<String>, size: u64, mode: u32, mtime: i64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            mode,
            mtime,
            uid: 0,
            uname: None,
            gid: 0,
            gname: None,
            link_target: None,
        }
    }

    /// Create a directory entry with empty ownership.
    pub fn directory(name: impl Into<String>, mode: u32, mtime: i64) -> Self {
        Self {
            kind: EntryKind::Directory,
            ..Self::file(name, 0, mode, mtime)
        }
    }

    /// Create a symbolic or hard link entry with empty ownership.
    pub fn link(
        kind: EntryKind,
        name: impl Into<String>,
        target: impl Into<String>,
        mtime: i64,
    ) -> Self {
        Self {
            kind,
            link_target: Some(target.into()),
            ..Self::file(name, 0, 0o777, mtime)
        }
    }

    /// Build an entry from a (non-following) stat of `path`.
    ///
    /// Owner and group names are looked up through `names`; an id without a
    /// database entry keeps `None`. Returns `None` for sockets, fifos and
    /// device nodes, which are not archived.
    pub fn from_metadata(
        name: impl Into<String>,
        path: &Path,
        metadata: &fs::Metadata,
        names: &dyn crate::owner::IdentityResolver,
    ) -> Result<Option<Self>> {
        let file_type = metadata.file_type();
        let mut entry = Self::file(name, 0, metadata.mode() & 0o7777, metadata.mtime());

        if file_type.is_dir() {
            entry.kind = EntryKind::Directory;
        } else if file_type.is_symlink() {
            let target = fs::read_link(path)?;
            let target = target.to_str().ok_or_else(|| {
                Error::invalid_entry_name(entry.name.clone(), "link target is not UTF-8")
            })?;
            entry.kind = EntryKind::Symlink;
            entry.link_target = Some(target.to_string());
        } else if file_type.is_file() {
            entry.size = metadata.len();
        } else if file_type.is_fifo()
            || file_type.is_socket()
            || file_type.is_block_device()
            || file_type.is_char_device()
        {
            return Ok(None);
        }

        entry.uid = u64::from(metadata.uid());
        entry.gid = u64::from(metadata.gid());
        entry.uname = names.user_name(entry.uid).ok().flatten();
        entry.gname = names.group_name(entry.gid).ok().flatten();

        Ok(Some(entry))
    }

    /// Read an entry from a tar header as decoded by the `tar` crate.
    pub(crate) fn from_tar<R: std::io::Read>(entry: &tar::Entry<'_, R>) -> Result<Self> {
        let header = entry.header();
        let bad = |what: &str, e: &dyn std::fmt::Display| Error::decode(format!("{what}: {e}"));

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let kind = EntryKind::from_tar(header.entry_type());
        let link_target = entry
            .link_name_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        let uname = header
            .username()
            .map_err(|e| bad("username", &e))?
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let gname = header
            .groupname()
            .map_err(|e| bad("groupname", &e))?
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            name,
            kind,
            size: header.size().map_err(|e| bad("size", &e))?,
            mode: header.mode().map_err(|e| bad("mode", &e))? & 0o7777,
            mtime: header.mtime().map_err(|e| bad("mtime", &e))? as i64,
            uid: header.uid().map_err(|e| bad("uid", &e))?,
            uname,
            gid: header.gid().map_err(|e| bad("gid", &e))?,
            gname,
            link_target: if kind.is_link() { link_target } else { None },
        })
    }

    /// Build the tar header for this entry.
    ///
    /// The name and link name fields are left for the stream writer, which
    /// stores them byte-for-byte.
    pub(crate) fn to_tar_header(&self) -> Result<tar::Header> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(self.kind.to_tar());
        header.set_size(if self.kind.has_payload() { self.size } else { 0 });
        header.set_mode(self.mode);
        header.set_mtime(self.mtime.max(0) as u64);
        header.set_uid(self.uid);
        header.set_gid(self.gid);
        if let Some(uname) = &self.uname {
            header
                .set_username(uname)
                .map_err(|_| Error::name_too_long(uname.clone()))?;
        }
        if let Some(gname) = &self.gname {
            header
                .set_groupname(gname)
                .map_err(|_| Error::name_too_long(gname.clone()))?;
        }
        Ok(header)
    }

    /// The entry name as a path relative to an extraction root.
    pub fn relative_path(&self) -> Result<&Path> {
        archive_path(&self.name)
    }
}

/// Interpret an archive name as a path relative to an extraction root.
///
/// Rejects absolute names and names that climb out of the root.
pub fn archive_path(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::CurDir | Component::Normal(_) => {}
            Component::ParentDir => {
                return Err(Error::invalid_entry_name(name, "contains `..`"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_entry_name(name, "is absolute"));
            }
        }
    }
    Ok(path)
}
