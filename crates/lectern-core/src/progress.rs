use std::cell::RefCell;

/// User-facing progress output. Diagnostics go through `tracing`; this is
/// what the operator reads.
pub trait Progress {
    fn step(&self, number: usize, total: usize, title: &str);
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn warn(&self, msg: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn step(&self, _number: usize, _total: usize, _title: &str) {}
    fn info(&self, _msg: &str) {}
    fn success(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
}

/// Captures every line with a kind prefix (`step:`, `info:`, `ok:`, `warn:`).
#[derive(Debug, Default)]
pub struct RecordingProgress {
    lines: RefCell<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|l| l.strip_prefix("warn: "))
            .map(str::to_owned)
            .collect()
    }

    fn push(&self, line: String) {
        self.lines.borrow_mut().push(line);
    }
}

impl Progress for RecordingProgress {
    fn step(&self, number: usize, total: usize, title: &str) {
        self.push(format!("step: [{number}/{total}] {title}"));
    }

    fn info(&self, msg: &str) {
        self.push(format!("info: {msg}"));
    }

    fn success(&self, msg: &str) {
        self.push(format!("ok: {msg}"));
    }

    fn warn(&self, msg: &str) {
        self.push(format!("warn: {msg}"));
    }
}
