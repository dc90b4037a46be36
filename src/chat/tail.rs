//! Offset-tracked reader over an append-only log file.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// One complete line and the byte offset just past its newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    pub text: String,
    pub end_offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailRead {
    pub lines: Vec<TailLine>,
    /// Offset to resume from next time
    pub next_offset: u64,
    /// File was shorter than the stored offset and was re-read from 0
    pub reset: bool,
    /// More complete lines are waiting beyond `max_lines`
    pub more: bool,
}

#[derive(Debug, Clone)]
pub struct LogTail {
    path: PathBuf,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `max_lines` complete lines starting at `offset`.
    ///
    /// `None` means nothing has been consumed yet: the cursor is placed at
    /// the current end of file and no lines are returned. A trailing line
    /// without a newline is left for the next call.
    pub fn read_from(&self, offset: Option<u64>, max_lines: usize) -> std::io::Result<TailRead> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TailRead {
                    next_offset: offset.unwrap_or(0),
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();

        let Some(mut cursor) = offset else {
            return Ok(TailRead {
                next_offset: len,
                ..Default::default()
            });
        };

        let mut read = TailRead::default();
        if cursor > len {
            tracing::info!("{} shrank below offset {}, rescanning from start", self.path.display(), cursor);
            cursor = 0;
            read.reset = true;
        }

        file.seek(SeekFrom::Start(cursor))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            if read.lines.len() >= max_lines {
                read.more = cursor < len;
                break;
            }
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            cursor += n as u64;
            let text = String::from_utf8_lossy(&buf);
            read.lines.push(TailLine {
                text: text.trim_end_matches(['\r', '\n']).to_string(),
                end_offset: cursor,
            });
        }
        read.next_offset = cursor;
        Ok(read)
    }
}
