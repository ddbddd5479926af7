mod progress;

pub use progress::{clear_progress, ProbeProgress, ProgressWriterFactory};
