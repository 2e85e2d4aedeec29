#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;


/// In-memory log sink for asserting on emitted trace records.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines_matching(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install a capturing subscriber for this test binary and hand back the
/// capture.
pub fn init_capture() -> LogCapture {
    let capture = LogCapture::default();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();

    capture
}

/// Assert that every tracee's ENTRY/EXIT records alternate, allowing the
/// single gap that the suppressed post-exec record leaves behind.
pub fn assert_alternation(log: &str) {
    let mut last: HashMap<String, &str> = HashMap::new();
    let mut gaps: HashMap<String, usize> = HashMap::new();

    for line in log.lines() {
        let kind = if line.contains("SYSCALL_ENTRY [PID:") {
            "entry"
        } else if line.contains("SYSCALL_EXIT  [PID:") {
            "exit"
        } else {
            continue;
        };

        let Some(pid) = line
            .split("[PID:")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
        else {
            continue;
        };

        if last.insert(pid.to_owned(), kind) == Some(kind) {
            *gaps.entry(pid.to_owned()).or_default() += 1;
        }
    }

    for (pid, count) in gaps {
        assert!(count <= 1, "records for pid {pid} broke alternation {count} times");
    }
}
