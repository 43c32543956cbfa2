//! Shared in-process transport for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

use rusty_raman::link::Transport;

/// Serves a fixed byte stream in chunks once a command has been written.
/// When the stream runs dry a read blocks for its full wait, like a serial
/// port with nothing to say.
#[derive(Default)]
pub struct StubTransport {
    chunks: VecDeque<Vec<u8>>,
    pub writes: Vec<Vec<u8>>,
    pub clears: usize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `stream` cut into pieces whose sizes cycle through `sizes`.
    pub fn chunked(stream: &[u8], sizes: &[usize]) -> Self {
        let mut chunks = VecDeque::new();
        let mut rest = stream;
        for &size in sizes.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let (head, tail) = rest.split_at(size.max(1).min(rest.len()));
            chunks.push_back(head.to_vec());
            rest = tail;
        }
        StubTransport {
            chunks,
            ..Self::default()
        }
    }
}

impl Transport for StubTransport {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_available(&mut self, max: usize, wait: Duration) -> io::Result<Vec<u8>> {
        if self.writes.is_empty() {
            thread::sleep(wait);
            return Ok(Vec::new());
        }
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max {
                    self.chunks.push_front(chunk.split_off(max));
                }
                Ok(chunk)
            }
            None => {
                thread::sleep(wait);
                Ok(Vec::new())
            }
        }
    }
}
