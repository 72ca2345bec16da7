//! Folding the remote end-of-session messages into one process exit code.

/// Exit code when the channel closed without an exit status or EOF, so the
/// real remote status is unknown.
pub const EXIT_STATUS_MISSING: i32 = 255;

/// Offset added to a signal number when the remote process died by signal.
const SIGNAL_EXIT_BASE: i32 = 128;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExitReconciler {
    status: Option<i32>,
    saw_eof: bool,
}

impl ExitReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first reported status wins.
    pub fn on_status(&mut self, code: u32) {
        self.status.get_or_insert(i32::try_from(code).unwrap_or(EXIT_STATUS_MISSING));
    }

    pub fn on_signal(&mut self, signo: Option<i32>) {
        let code = signo.map_or(EXIT_STATUS_MISSING, |signo| SIGNAL_EXIT_BASE + signo);
        self.status.get_or_insert(code);
    }

    pub fn on_eof(&mut self) {
        self.saw_eof = true;
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    /// Explicit status, then clean EOF as success, then the missing-status
    /// sentinel. A graceful EOF and an abnormal disconnect that still sent
    /// EOF look the same here.
    pub fn finish(&self) -> i32 {
        match (self.status, self.saw_eof) {
            (Some(code), _) => code,
            (None, true) => 0,
            (None, false) => EXIT_STATUS_MISSING,
        }
    }
}
