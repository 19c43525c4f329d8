//! 📏 Line batching: a lazy conveyor belt from a decoder to fixed-size `EventBatch`es.
//!
//! 🧠 Knowledge graph:
//! - Pull-based all the way down. The supervisor pulls a batch, the batcher pulls lines,
//!   the `BufRead` pulls from the decoder, the decoder pulls compressed bytes. Nobody
//!   materializes the whole file. Memory stays flat whether the log is 4KB or 40GB.
//! - Same read loop as a file source reading NDJSON pages: read a line, strip `\n`/`\r\n`,
//!   stop when the batch is full or the well runs dry.
//! - Blank lines are lines too. They ride along and the enricher calls them malformed,
//!   because a log with holes in it is a log somebody should look at.
//! - Lines are kept as bytes. UTF-8 trouble is the enricher's problem, per line, not ours per file.
//!
//! "He who decompresses the entire file into one Vec, OOMs in production." (ancient proverb) 📜

use std::io::{self, BufRead};

use crate::common::EventBatch;

/// 📦 Default batch capacity. Two hundred events per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// 🏭 Turns a `BufRead` into batches of at most `capacity` lines.
///
/// Finite and non-restartable: it owns the reader and drains it.
/// After an I/O error it yields that error once and then fuses to `None`.
pub struct LineBatcher<R> {
    reader: R,
    capacity: usize,
    line_number: usize,
    // -- 🧽 reused between reads so we are not allocating a fresh Vec per line like animals
    scratch: Vec<u8>,
    done: bool,
}

impl<R: BufRead> LineBatcher<R> {
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            // -- ⚠️ a capacity of 0 would mean infinite empty batches. config validation rejects it,
            // -- and we clamp anyway because infinite loops are not a feature.
            capacity: capacity.max(1),
            line_number: 0,
            scratch: Vec::with_capacity(4096),
            done: false,
        }
    }

    /// 📖 Read one raw line into `scratch`. `Ok(false)` means EOF.
    fn read_line(&mut self) -> io::Result<bool> {
        self.scratch.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.scratch)?;
        if bytes_read == 0 {
            return Ok(false);
        }
        self.line_number += 1;
        Ok(true)
    }
}

impl<R: BufRead> Iterator for LineBatcher<R> {
    type Item = io::Result<EventBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = EventBatch {
            lines: Vec::with_capacity(self.capacity),
            line_numbers: Vec::with_capacity(self.capacity),
        };

        while batch.len() < self.capacity {
            match self.read_line() {
                Ok(true) => {
                    batch.lines.push(trim_line_ending(&self.scratch).to_vec());
                    batch.line_numbers.push(self.line_number);
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(err) => {
                    // 💀 a corrupt stream does not get a second chance
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

/// 🧹 Strip one trailing `\n` and then one trailing `\r`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
