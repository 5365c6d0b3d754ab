//! Input tree walking and control/data partitioning.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::owner::IdentityResolver;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the input subdirectory holding control files.
pub const CONTROL_DIR: &str = "CONTROL";

/// Which inner stream an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Package metadata and maintainer scripts (`control.tar.gz`).
    Control,
    /// Installable payload (`data.tar.gz`).
    Data,
}

/// Where a visited path ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Not archived (the input root and the `CONTROL` directory itself).
    Skip,
    /// Archived in `section` under the given name.
    Archive { section: Section, name: String },
}

/// Classify an archive-relative name (`./...`) into a section.
///
/// The root (`./.`) and the `./CONTROL` directory are skipped; anything
/// below `./CONTROL/` moves to the control section with that prefix removed;
/// everything else stays in the data section unchanged.
pub fn classify(name: &str, is_dir: bool) -> Placement {
    if is_dir && (name == "./." || name == "./CONTROL") {
        return Placement::Skip;
    }
    match name.strip_prefix("./CONTROL/") {
        Some(rest) => Placement::Archive {
            section: Section::Control,
            name: format!("./{rest}"),
        },
        None => Placement::Archive {
            section: Section::Data,
            name: name.to_string(),
        },
    }
}

/// Archive-relative name of `path` below `root`, always starting with `./`.
fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::invalid_entry_name(path.display().to_string(), "outside the input directory")
    })?;

    let mut name = String::from(".");
    if relative.as_os_str().is_empty() {
        name.push_str("/.");
        return Ok(name);
    }
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::invalid_entry_name(path.display().to_string(), "path is not UTF-8")
        })?;
        name.push('/');
        name.push_str(part);
    }
    Ok(name)
}

/// One filesystem item assigned to a section.
#[derive(Debug, Clone)]
pub struct PartitionedEntry {
    /// Target stream.
    pub section: Section,
    /// Natural metadata, already renamed for its section.
    pub entry: Entry,
    /// Where to read the payload from.
    pub path: PathBuf,
}

/// Depth-first walk of an input tree, yielding entries in visit order.
///
/// Visit order is the filesystem enumeration order unless `sorted` is set,
/// in which case each directory is enumerated by file name.
pub struct Partitioner<'a> {
    root: PathBuf,
    walker: ignore::Walk,
    names: &'a dyn IdentityResolver,
}

impl<'a> Partitioner<'a> {
    /// Start walking `root`.
    pub fn new(root: &Path, sorted: bool, names: &'a dyn IdentityResolver) -> Self {
        let mut builder = ignore::WalkBuilder::new(root);
        builder
            .standard_filters(false) // Archive everything, hidden files included
            .follow_links(false);
        if sorted {
            builder.sort_by_file_name(|a, b| a.cmp(b));
        }

        Self {
            root: root.to_path_buf(),
            walker: builder.build(),
            names,
        }
    }

    fn visit(&self, walked: ignore::DirEntry) -> Result<Option<PartitionedEntry>> {
        let path = walked.into_path();
        let metadata = fs::symlink_metadata(&path)?;
        let name = relative_name(&self.root, &path)?;

        let (section, name) = match classify(&name, metadata.is_dir()) {
            Placement::Skip => return Ok(None),
            Placement::Archive { section, name } => (section, name),
        };

        match Entry::from_metadata(name, &path, &metadata, self.names)? {
            Some(entry) => Ok(Some(PartitionedEntry {
                section,
                entry,
                path,
            })),
            None => {
                log::warn!("skipping special file {}", path.display());
                Ok(None)
            }
        }
    }
}

impl Iterator for Partitioner<'_> {
    type Item = Result<PartitionedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let walked = match self.walker.next()? {
                Ok(walked) => walked,
                Err(e) => return Some(Err(e.into())),
            };
            match self.visit(walked) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use crate::owner::tests::FakeResolver;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn partition(root: &Path, sorted: bool) -> Vec<(Section, String, EntryKind)> {
        let resolver = FakeResolver::default();
        Partitioner::new(root, sorted, &resolver)
            .map(|item| {
                let item = item.unwrap();
                (item.section, item.entry.name, item.entry.kind)
            })
            .collect()
    }

    #[test]
    fn test_classify_root_and_control_dir_skipped() {
        assert_eq!(classify("./.", true), Placement::Skip);
        assert_eq!(classify("./CONTROL", true), Placement::Skip);
    }

    #[test]
    fn test_classify_control_file_is_stripped() {
        assert_eq!(
            classify("./CONTROL/postinst", false),
            Placement::Archive {
                section: Section::Control,
                name: "./postinst".to_string(),
            }
        );
        assert_eq!(
            classify("./CONTROL/sub/dir", true),
            Placement::Archive {
                section: Section::Control,
                name: "./sub/dir".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_control_file_not_dir_goes_to_data() {
        // Only the CONTROL *directory* is special.
        assert_eq!(
            classify("./CONTROL", false),
            Placement::Archive {
                section: Section::Data,
                name: "./CONTROL".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_lookalike_prefix_stays_in_data() {
        assert_eq!(
            classify("./CONTROLS/x", false),
            Placement::Archive {
                section: Section::Data,
                name: "./CONTROLS/x".to_string(),
            }
        );
        assert_eq!(
            classify("./usr/CONTROL/x", false),
            Placement::Archive {
                section: Section::Data,
                name: "./usr/CONTROL/x".to_string(),
            }
        );
    }

    #[test]
    fn test_relative_name() {
        let root = Path::new("/in");
        assert_eq!(relative_name(root, Path::new("/in")).unwrap(), "./.");
        assert_eq!(relative_name(root, Path::new("/in/a/b")).unwrap(), "./a/b");
        assert!(relative_name(root, Path::new("/elsewhere")).is_err());
    }

    #[test]
    fn test_partition_control_and_data() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("CONTROL")).unwrap();
        fs::write(root.join("CONTROL/postinst"), b"#!/bin/sh\n").unwrap();
        fs::write(root.join("data.txt"), b"data").unwrap();

        let mut entries = partition(root, false);
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        assert_eq!(
            entries,
            vec![
                (Section::Data, "./data.txt".to_string(), EntryKind::File),
                (Section::Control, "./postinst".to_string(), EntryKind::File),
            ]
        );
    }

    #[test]
    fn test_partition_includes_hidden_files_and_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("etc")).unwrap();
        fs::write(root.join("etc/.hidden"), b"x").unwrap();
        fs::write(root.join(".gitignore"), b"etc\n").unwrap();
        std::os::unix::fs::symlink("etc/.hidden", root.join("link")).unwrap();

        let entries = partition(root, true);
        assert_eq!(
            entries,
            vec![
                (Section::Data, "./.gitignore".to_string(), EntryKind::File),
                (Section::Data, "./etc".to_string(), EntryKind::Directory),
                (Section::Data, "./etc/.hidden".to_string(), EntryKind::File),
                (Section::Data, "./link".to_string(), EntryKind::Symlink),
            ]
        );
    }

    #[test]
    fn test_partition_visits_parents_before_children() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/b/c/file"), b"x").unwrap();

        // Unsorted: only the depth-first property is stable.
        let names: Vec<String> = partition(root, false).into_iter().map(|e| e.1).collect();
        assert_eq!(names, vec!["./a", "./a/b", "./a/b/c", "./a/b/c/file"]);
    }

    #[test]
    fn test_partition_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = FakeResolver::default();
        let mut walker = Partitioner::new(&temp_dir.path().join("nope"), false, &resolver);
        assert!(walker.next().unwrap().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Every archived name keeps the `./` prefix.
        #[test]
        fn prop_archived_names_keep_prefix(rest in "[a-zA-Z0-9_./-]{1,40}", is_dir in any::<bool>()) {
            let name = format!("./{rest}");
            if let Placement::Archive { name, .. } = classify(&name, is_dir) {
                prop_assert!(name.starts_with("./"));
            }
        }

        /// Control names are the input name minus `CONTROL/`.
        #[test]
        fn prop_control_prefix_stripped(rest in "[a-z0-9_]{1,20}(/[a-z0-9_]{1,20}){0,3}", is_dir in any::<bool>()) {
            let placement = classify(&format!("./CONTROL/{rest}"), is_dir);
            prop_assert_eq!(
                placement,
                Placement::Archive { section: Section::Control, name: format!("./{rest}") }
            );
        }
    }
}
