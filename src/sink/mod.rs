//! Frame consumer used by the standalone binary
//! Logs each delivery and can dump delivered bytes to a diagnostic file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::pipeline::{Delivery, FrameSink};

/// Sink with a fixed-size receive buffer and an optional raw dump
pub struct DumpSink {
    name: String,
    buffer: Vec<u8>,
    dump: Option<BufWriter<File>>,
    frames: u64,
    truncated_bytes: u64,
}

impl DumpSink {
    /// Create a sink accepting frames of up to `max_buffer_size` bytes.
    ///
    /// A dump file that cannot be created is reported and skipped; the sink
    /// keeps working without it.
    pub fn new(name: impl Into<String>, max_buffer_size: usize, dump_path: Option<&Path>) -> Self {
        let name = name.into();
        let dump = dump_path.and_then(|path| match File::create(path) {
            Ok(file) => {
                info!("{} dumping delivered frames to {}", name, path.display());
                Some(BufWriter::new(file))
            }
            Err(e) => {
                warn!("{} cannot create dump {}: {}", name, path.display(), e);
                None
            }
        });

        Self {
            name,
            buffer: vec![0; max_buffer_size],
            dump,
            frames: 0,
            truncated_bytes: 0,
        }
    }

    /// Per-stream dump file derived from the configured base path
    pub fn dump_path_for(base: &Path, stream: &str) -> PathBuf {
        let mut path = base.as_os_str().to_owned();
        path.push(format!(".{stream}.raw"));
        PathBuf::from(path)
    }

    pub fn is_dumping(&self) -> bool {
        self.dump.is_some()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn truncated_bytes(&self) -> u64 {
        self.truncated_bytes
    }
}

impl FrameSink for DumpSink {
    fn buffer(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn after_getting(&mut self, delivery: Delivery) {
        self.frames += 1;
        self.truncated_bytes += delivery.truncated_bytes as u64;
        if delivery.truncated_bytes > 0 {
            debug!(
                "{} frame {} truncated by {} bytes",
                self.name, delivery.sequence, delivery.truncated_bytes
            );
        }

        if let Some(dump) = self.dump.as_mut() {
            if let Err(e) = dump.write_all(&self.buffer[..delivery.frame_size]) {
                warn!("{} dump write failed, disabling dump: {}", self.name, e);
                self.dump = None;
            }
        }
    }
}

impl Drop for DumpSink {
    fn drop(&mut self) {
        if let Some(dump) = self.dump.as_mut() {
            if let Err(e) = dump.flush() {
                warn!("{} dump flush failed: {}", self.name, e);
            }
        }
    }
}
