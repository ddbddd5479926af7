//! Probe progress bar with tracing integration.
//!
//! While a bar is visible, log lines are printed through it so they do not
//! tear the display.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use indicatif::{ProgressBar, ProgressStyle};
use vigie_core::ProgressCallback;

/// Bar currently shown, if any.
static PROGRESS_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn active_bar() -> MutexGuard<'static, Option<ProgressBar>> {
    PROGRESS_BAR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_bar() -> Option<ProgressBar> {
    active_bar().clone()
}

/// Wipes the active bar, if any, before an early exit.
pub fn clear_progress() {
    if let Some(bar) = active_bar().take() {
        bar.finish_and_clear();
    }
}

/// Progress of a probing run, fed by the scheduler's callback.
pub struct ProbeProgress {
    bar: ProgressBar,
}

impl ProbeProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        bar.set_style(style);
        *active_bar() = Some(bar.clone());
        Self { bar }
    }

    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |done, total, name| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
            bar.set_message(name.to_string());
        })
    }

    pub fn finish(self) {
        *active_bar() = None;
        self.bar.finish_and_clear();
    }
}

impl Default for ProbeProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes output through the progress bar when one is active, stderr
/// otherwise.
pub struct ProgressWriter {
    buffer: Vec<u8>,
}

impl ProgressWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn emit(line: &str) -> std::io::Result<()> {
        match current_bar() {
            Some(bar) => bar.println(line),
            None => {
                let mut stderr = std::io::stderr();
                stderr.write_all(line.as_bytes())?;
                stderr.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

impl Default for ProgressWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            Self::emit(line.trim_end_matches('\n'))?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).trim_end().to_string();
            self.buffer.clear();
            if !rest.is_empty() {
                Self::emit(&rest)?;
            }
        }
        Ok(())
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// A MakeWriter for tracing-subscriber that creates ProgressWriters.
#[derive(Default)]
pub struct ProgressWriterFactory;

impl ProgressWriterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ProgressWriterFactory {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressWriter::new()
    }
}
