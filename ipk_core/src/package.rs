//! Package container layout and the shared read traversal.
//!
//! A package is a `tar.gz` holding, in order, `./debian-binary`,
//! `./control.tar.gz` and `./data.tar.gz`. The two members are themselves
//! `tar.gz` streams.

use crate::entry::Entry;
use crate::error::Result;
use crate::stream::ArchiveReader;
use crate::walk::Section;
use std::io::Read;

/// Format version written to and expected in `./debian-binary`.
pub const FORMAT_VERSION: &str = "2.0";

/// Outer entry holding the format version.
pub const VERSION_MEMBER: &str = "./debian-binary";

/// Outer entry holding the control stream.
pub const CONTROL_MEMBER: &str = "./control.tar.gz";

/// Outer entry holding the data stream.
pub const DATA_MEMBER: &str = "./data.tar.gz";

/// Outer member name for an inner section.
pub fn member_name(section: Section) -> &'static str {
    match section {
        Section::Control => CONTROL_MEMBER,
        Section::Data => DATA_MEMBER,
    }
}

/// Receives the entries of a package as [`read_package`] walks it.
pub trait PackageVisitor {
    /// Called for every outer entry, before its payload is dispatched.
    fn outer_entry(&mut self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Called when an inner stream is about to be read.
    fn begin_section(&mut self, _section: Section) -> Result<()> {
        Ok(())
    }

    /// Called for every entry of an inner stream with its payload.
    fn member_entry(
        &mut self,
        section: Section,
        entry: &Entry,
        payload: &mut dyn Read,
    ) -> Result<()>;

    /// Called once every entry of an inner stream has been visited.
    fn end_section(&mut self, _section: Section) -> Result<()> {
        Ok(())
    }
}

/// Walk a package, feeding every entry to `visitor`.
///
/// Outer entries are dispatched by name and in any order; unknown names are
/// ignored. Returns the trimmed content of `./debian-binary`, if present.
/// The version is not checked here.
pub fn read_package<R: Read>(source: R, visitor: &mut dyn PackageVisitor) -> Result<Option<String>> {
    let mut version = None;
    let mut outer = ArchiveReader::new(source);

    outer.for_each(|entry, payload| {
        visitor.outer_entry(entry)?;

        let section = match entry.name.as_str() {
            VERSION_MEMBER => {
                let mut raw = Vec::new();
                payload.read_to_end(&mut raw)?;
                version = Some(String::from_utf8_lossy(&raw).trim().to_string());
                return Ok(());
            }
            CONTROL_MEMBER => Section::Control,
            DATA_MEMBER => Section::Data,
            other => {
                log::debug!("ignoring outer entry {other}");
                return Ok(());
            }
        };

        visitor.begin_section(section)?;
        ArchiveReader::new(payload).for_each(|inner, inner_payload| {
            visitor.member_entry(section, inner, inner_payload)
        })?;
        visitor.end_section(section)
    })?;

    Ok(version)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stream::ArchiveWriter;
    use std::io;

    /// Build a package by hand: `(outer name, inner entries)` in the given order.
    pub(crate) fn package_bytes(version: &[u8], members: &[(&str, &[(Entry, &[u8])])]) -> Vec<u8> {
        let mut outer = ArchiveWriter::new(Vec::new());
        outer
            .write_bytes(
                &Entry::file(VERSION_MEMBER, version.len() as u64, 0o644, 0),
                version,
            )
            .unwrap();
        for (name, entries) in members {
            let mut inner = ArchiveWriter::new(Vec::new());
            for (entry, data) in entries.iter() {
                inner.write_entry(entry, *data).unwrap();
            }
            let inner = inner.finish().unwrap();
            outer
                .write_bytes(&Entry::file(*name, inner.len() as u64, 0o644, 0), &inner)
                .unwrap();
        }
        outer.finish().unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl PackageVisitor for Recorder {
        fn outer_entry(&mut self, entry: &Entry) -> Result<()> {
            self.events.push(format!("outer {}", entry.name));
            Ok(())
        }

        fn begin_section(&mut self, section: Section) -> Result<()> {
            self.events.push(format!("begin {section:?}"));
            Ok(())
        }

        fn member_entry(
            &mut self,
            section: Section,
            entry: &Entry,
            payload: &mut dyn Read,
        ) -> Result<()> {
            let mut data = String::new();
            payload.read_to_string(&mut data)?;
            self.events.push(format!("{section:?} {} {data}", entry.name));
            Ok(())
        }

        fn end_section(&mut self, section: Section) -> Result<()> {
            self.events.push(format!("end {section:?}"));
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_by_member_name() {
        let bytes = package_bytes(
            b"2.0\n",
            &[
                (CONTROL_MEMBER, &[(Entry::file("./control", 3, 0o644, 0), &b"pkg"[..])]),
                (DATA_MEMBER, &[(Entry::file("./usr/bin/x", 2, 0o755, 0), &b"hi"[..])]),
            ],
        );

        let mut recorder = Recorder::default();
        let version = read_package(&bytes[..], &mut recorder).unwrap();

        assert_eq!(version.as_deref(), Some("2.0"));
        assert_eq!(
            recorder.events,
            vec![
                "outer ./debian-binary",
                "outer ./control.tar.gz",
                "begin Control",
                "Control ./control pkg",
                "end Control",
                "outer ./data.tar.gz",
                "begin Data",
                "Data ./usr/bin/x hi",
                "end Data",
            ]
        );
    }

    #[test]
    fn test_member_order_does_not_matter() {
        let bytes = package_bytes(
            b" 2.0 \n\n",
            &[
                (DATA_MEMBER, &[(Entry::file("./a", 1, 0o644, 0), &b"a"[..])]),
                (CONTROL_MEMBER, &[(Entry::file("./b", 1, 0o644, 0), &b"b"[..])]),
            ],
        );

        let mut recorder = Recorder::default();
        let version = read_package(&bytes[..], &mut recorder).unwrap();

        assert_eq!(version.as_deref(), Some("2.0"));
        assert!(recorder.events.contains(&"Data ./a a".to_string()));
        assert!(recorder.events.contains(&"Control ./b b".to_string()));
    }

    #[test]
    fn test_unknown_members_are_ignored() {
        let bytes = package_bytes(b"2.0\n", &[("./extra.tar.gz", &[])]);

        let mut recorder = Recorder::default();
        read_package(&bytes[..], &mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec!["outer ./debian-binary", "outer ./extra.tar.gz"]
        );
    }

    #[test]
    fn test_missing_version_member() {
        let mut outer = ArchiveWriter::new(Vec::new());
        outer
            .write_entry(&Entry::directory("./", 0o755, 0), io::empty())
            .unwrap();
        let bytes = outer.finish().unwrap();

        let version = read_package(&bytes[..], &mut Recorder::default()).unwrap();
        assert_eq!(version, None);
    }

    #[test]
    fn test_corrupt_member_is_decode_error() {
        let mut outer = ArchiveWriter::new(Vec::new());
        outer
            .write_bytes(&Entry::file(DATA_MEMBER, 7, 0o644, 0), b"garbage")
            .unwrap();
        let bytes = outer.finish().unwrap();

        let err = read_package(&bytes[..], &mut Recorder::default()).unwrap_err();
        assert!(err.is_decode());
    }
}
