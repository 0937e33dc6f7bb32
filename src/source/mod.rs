//! Input sources: archives and directory trees
//!
//! Both sources produce the same thing, a sequence of [`InputEntry`] values
//! (a name plus a byte stream), so the writer never needs to know where its
//! lines came from.
//!
//! ```text
//!   dump.tar.xz ──► XzDecoder (multi-stream) ──► tar::Archive ──┐
//!   dump.tar.gz ──► MultiGzDecoder ───────────► tar::Archive ──┤
//!   dump.tar    ─────────────────────────────► tar::Archive ──┼──► InputEntry ──► lines()
//!   dumps/      ──► walkdir ──► File ──────────────────────────┘
//! ```

pub mod archive;
pub mod directory;

pub use archive::{ArchiveEntries, ArchiveFormat, ArchiveReader};
pub use directory::{DirectoryEntries, DirectoryWalker};

use crate::error::{ParseError, StreamError};
use std::io::{BufRead, BufReader, Read};

/// Read buffer for entry streams
const ENTRY_BUFFER_SIZE: usize = 64 * 1024;

/// One named byte stream (an archive member or a file on disk)
///
/// Consumed once: call [`InputEntry::lines`] and drain it, or drop the entry.
pub struct InputEntry<'a> {
    name: String,
    reader: Box<dyn BufRead + 'a>,
}

impl<'a> InputEntry<'a> {
    /// Wrap a reader in a buffered entry
    pub fn new(name: impl Into<String>, reader: impl Read + 'a) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(BufReader::with_capacity(ENTRY_BUFFER_SIZE, reader)),
        }
    }

    /// Entry name (archive member path or file path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split into the name and a line iterator over the content
    pub fn into_lines(self) -> (String, EntryLines<'a>) {
        (
            self.name,
            EntryLines {
                reader: self.reader,
                buf: Vec::new(),
            },
        )
    }

    /// Line iterator over the content
    pub fn lines(self) -> EntryLines<'a> {
        self.into_lines().1
    }
}

impl std::fmt::Debug for InputEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputEntry").field("name", &self.name).finish()
    }
}

/// Lines of an entry, terminators included
///
/// Unlike `BufRead::lines`, the trailing `\n` (and any `\r`) is kept so the
/// parser sees the raw line. A line that is not valid UTF-8 is reported as
/// [`ParseError::InvalidEncoding`] and never handed on with replaced bytes.
pub struct EntryLines<'a> {
    reader: Box<dyn BufRead + 'a>,
    buf: Vec<u8>,
}

impl Iterator for EntryLines<'_> {
    type Item = Result<String, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(decode_line(&self.buf)),
            Err(e) => Some(Err(StreamError::Read(e))),
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<String, StreamError> {
    match std::str::from_utf8(raw) {
        Ok(line) => Ok(line.to_owned()),
        Err(e) => Err(ParseError::InvalidEncoding {
            line: String::from_utf8_lossy(raw).into_owned(),
            offset: e.valid_up_to(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_lines_keep_terminators() {
        let entry = InputEntry::new("t", Cursor::new(b"a;1\nb;2\r\nc;3".to_vec()));
        assert_eq!(entry.name(), "t");
        let lines: Vec<String> = entry.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["a;1\n", "b;2\r\n", "c;3"]);
    }

    #[test]
    fn test_empty_entry_has_no_lines() {
        let entry = InputEntry::new("empty", Cursor::new(Vec::new()));
        assert_eq!(entry.lines().count(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let entry = InputEntry::new(
            "latin1",
            Cursor::new(b"ok;1\nj\xe9r\xf4me;pw\nnext;2\n".to_vec()),
        );
        let (name, mut lines) = entry.into_lines();
        assert_eq!(name, "latin1");
        assert_eq!(lines.next().unwrap().unwrap(), "ok;1\n");

        match lines.next().unwrap() {
            Err(StreamError::Parse(ParseError::InvalidEncoding { line, offset })) => {
                assert_eq!(offset, 1);
                assert!(line.starts_with('j'));
                assert!(line.ends_with(";pw\n"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // The iterator itself can continue; the writer decides to stop
        assert_eq!(lines.next().unwrap().unwrap(), "next;2\n");
    }
}
