//! Tar archive reader with transparent gzip/xz decompression
//!
//! The format is picked once from the file extension. Compressed inputs have
//! their magic bytes checked at open time, so a truncated or mislabeled file
//! fails before any record is written instead of halfway through the first
//! entry.
//!
//! Concatenated gzip members and xz streams are decoded as one tar stream.
//! A member cut short by a truncated archive fails with `UnexpectedEof`
//! instead of ending early.
//!
//! Archives are strictly sequential: each [`InputEntry`] must be drained or
//! dropped before the iterator advances.

use super::InputEntry;
use crate::error::ArchiveError;
use flate2::bufread::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use xz2::bufread::XzDecoder;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Archive container format, resolved from the file extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Plain tar
    Tar,
    /// Gzip-compressed tar (.gz, .tgz is not recognized)
    Gzip,
    /// Xz-compressed tar
    Xz,
    /// Anything else; carries the offending extension
    Unrecognized(String),
}

impl ArchiveFormat {
    /// Determine the format from the last extension of `path`
    ///
    /// `dump.tar.gz` is [`ArchiveFormat::Gzip`]; only the outermost extension
    /// is considered.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();

        match ext.as_str() {
            "tar" => ArchiveFormat::Tar,
            "gz" => ArchiveFormat::Gzip,
            "xz" => ArchiveFormat::Xz,
            _ => ArchiveFormat::Unrecognized(ext),
        }
    }

    /// True for formats the reader can open
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ArchiveFormat::Unrecognized(_))
    }

    fn label(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Unrecognized(_) => "unrecognized",
        }
    }

    /// Wrap `reader` in the decompression layer for this format
    fn decoder<R>(&self, mut reader: R, origin: &Path) -> Result<Box<dyn Read>, ArchiveError>
    where
        R: BufRead + 'static,
    {
        match self {
            ArchiveFormat::Tar => Ok(Box::new(reader)),
            ArchiveFormat::Gzip => {
                check_magic(&mut reader, GZIP_MAGIC, self.label(), origin)?;
                Ok(Box::new(MultiGzDecoder::new(reader)))
            }
            ArchiveFormat::Xz => {
                check_magic(&mut reader, XZ_MAGIC, self.label(), origin)?;
                Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
            }
            ArchiveFormat::Unrecognized(ext) => Err(ArchiveError::UnrecognizedExtension {
                path: origin.to_path_buf(),
                extension: ext.clone(),
            }),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Unrecognized(ext) => write!(f, "unrecognized (.{})", ext),
            other => f.write_str(other.label()),
        }
    }
}

/// Verify the stream starts with `magic` without consuming it
fn check_magic<R: BufRead>(
    reader: &mut R,
    magic: &[u8],
    format: &'static str,
    origin: &Path,
) -> Result<(), ArchiveError> {
    let head = reader.fill_buf().map_err(|e| ArchiveError::Decompress {
        path: origin.to_path_buf(),
        format,
        reason: e.to_string(),
    })?;

    if head.len() < magic.len() || &head[..magic.len()] != magic {
        return Err(ArchiveError::Decompress {
            path: origin.to_path_buf(),
            format,
            reason: if head.is_empty() {
                "file is empty".to_string()
            } else {
                "bad magic bytes".to_string()
            },
        });
    }

    Ok(())
}

/// Sequential reader over the members of a tar-based archive
pub struct ArchiveReader {
    path: PathBuf,
    format: ArchiveFormat,
    archive: tar::Archive<Box<dyn Read>>,
}

impl ArchiveReader {
    /// Open an archive file, choosing the decoder from its extension
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let format = ArchiveFormat::from_path(path);
        if let ArchiveFormat::Unrecognized(ext) = &format {
            return Err(ArchiveError::UnrecognizedExtension {
                path: path.to_path_buf(),
                extension: ext.clone(),
            });
        }

        let file = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::build(BufReader::new(file), format, path)
    }

    /// Read an archive from any byte stream in the given format
    pub fn from_reader<R>(reader: R, format: ArchiveFormat) -> Result<Self, ArchiveError>
    where
        R: Read + 'static,
    {
        Self::build(BufReader::new(reader), format, Path::new("<stream>"))
    }

    fn build<R>(reader: R, format: ArchiveFormat, origin: &Path) -> Result<Self, ArchiveError>
    where
        R: BufRead + 'static,
    {
        let decoded = format.decoder(reader, origin)?;
        Ok(Self {
            path: origin.to_path_buf(),
            format,
            archive: tar::Archive::new(decoded),
        })
    }

    /// Archive path (or `<stream>` for in-memory readers)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected format
    pub fn format(&self) -> &ArchiveFormat {
        &self.format
    }

    /// Iterate over non-directory members in archive order
    ///
    /// Can only be called once per reader.
    pub fn entries(&mut self) -> Result<ArchiveEntries<'_>, ArchiveError> {
        let inner = self
            .archive
            .entries()
            .map_err(|source| ArchiveError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(ArchiveEntries {
            path: &self.path,
            inner,
            failed: false,
        })
    }
}

/// Iterator over archive members; see [`ArchiveReader::entries`]
pub struct ArchiveEntries<'a> {
    path: &'a Path,
    inner: tar::Entries<'a, Box<dyn Read>>,
    failed: bool,
}

impl<'a> Iterator for ArchiveEntries<'a> {
    type Item = Result<InputEntry<'a>, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        // A corrupt header leaves the stream position undefined
        if self.failed {
            return None;
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(source) => return Some(Err(self.corrupt(source))),
            };

            if entry.header().entry_type().is_dir() {
                continue;
            }

            let name = match entry.path() {
                Ok(p) => p.display().to_string(),
                Err(source) => return Some(Err(self.corrupt(source))),
            };

            let size = entry.size();
            return Some(Ok(InputEntry::new(name, MemberReader::new(entry, size))));
        }
    }
}

impl ArchiveEntries<'_> {
    fn corrupt(&mut self, source: io::Error) -> ArchiveError {
        self.failed = true;
        ArchiveError::Corrupt {
            path: self.path.to_path_buf(),
            source,
        }
    }
}

/// Member data reader that fails when the data ends before `size` bytes
///
/// `tar` ends a member's data silently when the archive itself ends early.
struct MemberReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> MemberReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read> Read for MemberReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("archive member truncated, {} bytes missing", self.remaining),
            ));
        }
        self.remaining = self.remaining.saturating_sub(n as u64);
        Ok(n)
    }
}
