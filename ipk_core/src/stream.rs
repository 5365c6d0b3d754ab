//! Gzip-compressed tar streams.
//!
//! [`ArchiveWriter`] appends entries to one `tar.gz` layer and [`ArchiveReader`]
//! walks one back. Entry names and link targets are stored byte-for-byte, so a
//! `./` prefix survives the round trip.

use crate::entry::Entry;
use crate::error::{Error, Result, decode_io};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};

/// Width of the ustar name and link name fields.
const NAME_FIELD_LEN: usize = 100;

/// Name used for GNU long-name records.
const LONG_LINK_NAME: &[u8] = b"././@LongLink";

/// Sequential writer for one gzip-compressed tar stream.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start a new stream on `sink`, compressing at the best level.
    pub fn new(sink: W) -> Self {
        let encoder = GzEncoder::new(sink, Compression::best());
        Self {
            builder: tar::Builder::new(encoder),
        }
    }

    /// Append one entry.
    ///
    /// For regular files exactly `entry.size` bytes are copied from
    /// `payload`; a shorter payload is an error. Other kinds ignore `payload`.
    pub fn write_entry<R: Read>(&mut self, entry: &Entry, payload: R) -> Result<()> {
        let mut header = entry.to_tar_header()?;

        self.write_long_record(b'L', entry.name.as_bytes())?;
        set_raw_field(&mut header.as_old_mut().name, entry.name.as_bytes());

        if let Some(target) = entry.link_target.as_deref().filter(|_| entry.kind.is_link()) {
            self.write_long_record(b'K', target.as_bytes())?;
            set_raw_field(&mut header.as_old_mut().linkname, target.as_bytes());
        }
        header.set_cksum();

        if entry.kind.has_payload() {
            let mut limited = payload.take(entry.size);
            self.builder.append(&header, &mut limited)?;
            if limited.limit() != 0 {
                return Err(Error::size_mismatch(
                    entry.name.clone(),
                    entry.size,
                    entry.size - limited.limit(),
                ));
            }
        } else {
            self.builder.append(&header, io::empty())?;
        }

        log::debug!("wrote {} ({:?}, {} bytes)", entry.name, entry.kind, entry.size);
        Ok(())
    }

    /// Append a regular-file entry whose payload is `data`.
    pub fn write_bytes(&mut self, entry: &Entry, data: &[u8]) -> Result<()> {
        if entry.size != data.len() as u64 {
            return Err(Error::size_mismatch(
                entry.name.clone(),
                entry.size,
                data.len() as u64,
            ));
        }
        self.write_entry(entry, data)
    }

    /// Finish the stream and return the sink.
    ///
    /// Writes the tar trailer, then the gzip trailer, then flushes the sink.
    pub fn finish(self) -> Result<W> {
        let encoder = self.builder.into_inner()?;
        let mut sink = encoder.finish()?;
        sink.flush()?;
        Ok(sink)
    }

    /// Emit a GNU long-name record ahead of a header whose field overflows.
    fn write_long_record(&mut self, kind: u8, value: &[u8]) -> Result<()> {
        if value.len() <= NAME_FIELD_LEN {
            return Ok(());
        }

        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..LONG_LINK_NAME.len()].copy_from_slice(LONG_LINK_NAME);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_size(value.len() as u64 + 1);
        header.set_entry_type(tar::EntryType::new(kind));
        header.set_cksum();

        self.builder.append(&header, value.chain(&[0u8][..]))?;
        Ok(())
    }
}

/// Copy `value` into a fixed-width header field, truncating if needed.
fn set_raw_field(field: &mut [u8; NAME_FIELD_LEN], value: &[u8]) {
    let len = value.len().min(NAME_FIELD_LEN);
    field.fill(0);
    field[..len].copy_from_slice(&value[..len]);
}

/// Sequential reader for one gzip-compressed tar stream.
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<GzDecoder<R>>,
}

impl<R: Read> ArchiveReader<R> {
    /// Start reading a stream from `source`.
    pub fn new(source: R) -> Self {
        Self {
            archive: tar::Archive::new(GzDecoder::new(source)),
        }
    }

    /// Iterate over the entries of the stream in order.
    ///
    /// Each item pairs the entry metadata with a reader bounded to that
    /// entry's payload. A payload left unread is skipped by the next call.
    pub fn entries(&mut self) -> Result<Entries<'_, R>> {
        let inner = self.archive.entries().map_err(decode_io)?;
        Ok(Entries { inner })
    }

    /// Visit every entry with `visit`, stopping at the first error.
    pub fn for_each<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&Entry, &mut Payload<'_, R>) -> Result<()>,
    {
        for item in self.entries()? {
            let (entry, mut payload) = item?;
            visit(&entry, &mut payload)?;
        }
        Ok(())
    }
}

/// Iterator over the entries of an [`ArchiveReader`].
pub struct Entries<'a, R: Read> {
    inner: tar::Entries<'a, GzDecoder<R>>,
}

impl<'a, R: Read> Iterator for Entries<'a, R> {
    type Item = Result<(Entry, Payload<'a, R>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.inner.next()? {
            Ok(raw) => raw,
            Err(e) => return Some(Err(decode_io(e).into())),
        };
        Some(Entry::from_tar(&raw).map(|entry| (entry, Payload { inner: raw })))
    }
}

/// Payload bytes of one entry.
///
/// Read errors come from the gzip or tar layer and surface as decode errors.
pub struct Payload<'a, R: Read> {
    inner: tar::Entry<'a, GzDecoder<R>>,
}

impl<R: Read> Read for Payload<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(decode_io)
    }
}
