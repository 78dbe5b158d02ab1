//! Kernel logger: a `log::Log` implementation backed by a single
//! lazily-initialized sink.
//!
//! The real boot build installs a sink that writes to whatever console the
//! platform glue has wired up (UART, framebuffer — external collaborator
//! territory); host unit tests install an in-memory ring buffer sink so
//! modules can assert on emitted records without a console at all.

use core::fmt::Write;
use conquer_once::spin::OnceCell;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Anything the logger can hand a formatted line to.
pub trait LogSink: Send {
    fn write_line(&mut self, line: &str);
}

static SINK: OnceCell<Mutex<alloc::boxed::Box<dyn LogSink>>> = OnceCell::uninit();

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || cfg!(feature = "verbose")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else { return };
        let mut buf = alloc::string::String::new();
        let _ = write!(
            buf,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
        sink.lock().write_line(&buf);
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install `sink` as the global log destination and register with the
/// `log` facade. Must be called exactly once, before the first scheduled
/// thread runs. Calling it twice is a programming error and panics, the
/// same way `log::set_logger` itself does.
pub fn init(sink: alloc::boxed::Box<dyn LogSink>, max_level: LevelFilter) {
    SINK.try_init_once(|| Mutex::new(sink))
        .expect("kernel::logger::init called more than once");
    log::set_logger(&LOGGER).expect("a logger is already registered");
    log::set_max_level(max_level);
}

/// A bounded in-memory sink, useful for host tests and for a headless
/// "last N lines" diagnostic buffer.
pub struct RingSink {
    lines: alloc::collections::VecDeque<alloc::string::String>,
    capacity: usize,
}

impl RingSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: alloc::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(alloc::string::String::as_str)
    }
}

impl LogSink for RingSink {
    fn write_line(&mut self, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(alloc::string::String::from(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_sink_drops_oldest_past_capacity() {
        let mut sink = RingSink::new(2);
        sink.write_line("a");
        sink.write_line("b");
        sink.write_line("c");
        let lines: alloc::vec::Vec<&str> = sink.lines().collect();
        assert_eq!(lines, alloc::vec!["b", "c"]);
    }
}
