//! Group boundaries and the byte-stuffing that keeps them unambiguous.
//!
//! Every marker or escape byte inside payload goes out as `escape, byte`, so
//! an unescaped marker on the wire can only belong to a telomere. A damaged
//! run that still looks mostly like a telomere is decoded as one; the
//! checksums inside each group confirm or reject whatever follows.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};

use crate::armor::block::Block;
use crate::config::{CHECKSUM_SIZE, TELOMERE_ESCAPE, TELOMERE_MARKER};

/// Escapes payload and writes boundaries onto a sink.
pub struct TelomereEncoder<W: Write> {
    sink: W,
    telomere_length: usize,
    written: u64,
}

impl<W: Write> TelomereEncoder<W> {
    pub fn new(sink: W, telomere_length: usize) -> Self {
        Self { sink, telomere_length, written: 0 }
    }

    /// Writes one boundary: `telomere_length` unescaped marker bytes.
    pub fn write_telomere(&mut self) -> io::Result<()> {
        let run = vec![TELOMERE_MARKER; self.telomere_length];
        self.emit(&run)
    }

    /// Raw bytes written to the sink so far.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

impl<W: Write> Write for TelomereEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;

        for (i, &byte) in buf.iter().enumerate() {
            if byte == TELOMERE_MARKER || byte == TELOMERE_ESCAPE {
                self.emit(&buf[start..i])?;
                self.emit(&[TELOMERE_ESCAPE, byte])?;
                start = i + 1;
            }
        }

        self.emit(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// What ended a [`Span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Boundary,
    Eof,
}

/// Unescaped bytes found between two boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub bytes: Vec<u8>,
    pub terminator: Terminator,
    /// Bytes beyond the caller's limit were discarded.
    pub overflowed: bool,
    /// Raw stream position where the span started.
    pub offset: u64,
}

enum Event {
    Byte(u8),
    Boundary,
}

struct PlainRun {
    copied: usize,
    overflowed: bool,
}

/// Undoes the byte-stuffing and reports boundaries.
pub struct TelomereDecoder<R: Read> {
    source: BufReader<R>,
    pending: VecDeque<u8>,
    telomere_length: usize,
    position: u64,
}

impl<R: Read> TelomereDecoder<R> {
    pub fn new(source: R, telomere_length: usize) -> Self {
        Self { source: BufReader::new(source), pending: VecDeque::new(), telomere_length, position: 0 }
    }

    /// Raw bytes consumed from the source so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Reads up to and including the next boundary, keeping at most `limit` bytes.
    pub fn read_span(&mut self, limit: usize) -> io::Result<Span> {
        let offset = self.position;
        let mut bytes = Vec::new();
        let mut overflowed = false;

        loop {
            if self.pending.is_empty() {
                let plain = self.copy_plain_run(&mut bytes, limit)?;
                if plain.overflowed {
                    overflowed = true;
                }
                if plain.copied > 0 {
                    continue;
                }
            }

            match self.next_event()? {
                Some(Event::Byte(byte)) => {
                    if bytes.len() < limit {
                        bytes.push(byte);
                    } else {
                        overflowed = true;
                    }
                }
                Some(Event::Boundary) => return Ok(Span { bytes, terminator: Terminator::Boundary, overflowed, offset }),
                None => return Ok(Span { bytes, terminator: Terminator::Eof, overflowed, offset }),
            }
        }
    }

    /// Moves bytes that are neither marker nor escape straight from the read buffer into `bytes`.
    fn copy_plain_run(&mut self, bytes: &mut Vec<u8>, limit: usize) -> io::Result<PlainRun> {
        let buf = match self.source.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(PlainRun { copied: 0, overflowed: false }),
            Err(e) => return Err(e),
        };

        let copied = buf.iter().position(|&byte| byte == TELOMERE_MARKER || byte == TELOMERE_ESCAPE).unwrap_or(buf.len());
        let kept = copied.min(limit.saturating_sub(bytes.len()));
        bytes.extend_from_slice(&buf[..kept]);

        self.source.consume(copied);
        self.position += copied as u64;
        Ok(PlainRun { copied, overflowed: kept < copied })
    }

    fn next_event(&mut self) -> io::Result<Option<Event>> {
        let Some(byte) = self.next_raw()? else {
            return Ok(None);
        };

        if byte == TELOMERE_ESCAPE {
            // A dangling escape at end of stream carries nothing.
            return Ok(self.next_raw()?.map(Event::Byte));
        }

        if byte != TELOMERE_MARKER {
            return Ok(Some(Event::Byte(byte)));
        }

        let mut run = 1;
        loop {
            match self.next_raw()? {
                Some(TELOMERE_MARKER) => run += 1,
                Some(other) => {
                    self.unread(&[other]);
                    break;
                }
                None => break,
            }
        }

        if run >= self.telomere_length {
            return Ok(Some(Event::Boundary));
        }

        self.classify_short_run(run).map(Some)
    }

    /// A run shorter than a telomere is either a damaged boundary or stray corruption.
    fn classify_short_run(&mut self, run: usize) -> io::Result<Event> {
        let span = self.telomere_length + CHECKSUM_SIZE;
        let mut window = vec![TELOMERE_MARKER; run];

        while window.len() < span {
            match self.next_raw()? {
                Some(byte) => window.push(byte),
                None => break,
            }
        }

        if Block::from_sealed(&window).is_boundary(self.telomere_length) {
            let end = last_unescaped_marker(&window, run);
            self.unread(&window[end + 1..]);
            return Ok(Event::Boundary);
        }

        self.unread(&window[1..]);
        Ok(Event::Byte(TELOMERE_MARKER))
    }

    fn next_raw(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pending.pop_front() {
            self.position += 1;
            return Ok(Some(byte));
        }

        let byte = loop {
            match self.source.fill_buf() {
                Ok(buf) => break buf.first().copied(),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        };

        if byte.is_some() {
            self.source.consume(1);
            self.position += 1;
        }

        Ok(byte)
    }

    fn unread(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().rev() {
            self.pending.push_front(byte);
        }
        self.position -= bytes.len() as u64;
    }
}

/// Index of the last marker in `window` that is not the target of an escape.
fn last_unescaped_marker(window: &[u8], run: usize) -> usize {
    let mut last = run - 1;
    let mut i = run;

    while i < window.len() {
        match window[i] {
            TELOMERE_ESCAPE => i += 2,
            TELOMERE_MARKER => {
                last = i;
                i += 1;
            }
            _ => i += 1,
        }
    }

    last
}
