use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};

/// The failure hook shared by the session and every API call.
///
/// Always logs through `tracing`. With debug enabled it also writes a
/// human-readable description to its sink (stderr unless redirected).
pub struct FailureReporter {
    debug: bool,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReporter")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl FailureReporter {
    pub fn new(debug: bool) -> Self {
        Self::with_sink(debug, Box::new(io::stderr()))
    }

    pub fn with_sink(debug: bool, sink: Box<dyn Write + Send>) -> Self {
        Self {
            debug,
            sink: Mutex::new(sink),
        }
    }

    /// Append failure descriptions to `path`, creating it if needed.
    pub fn to_file(debug: bool, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_sink(debug, Box::new(file)))
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Record a failure without converting it.
    pub fn report(&self, error: &Error, context: &str) {
        debug!(context, error = %error, "Operation failed");
        if !self.debug {
            return;
        }

        let mut text = format!("ERROR: failed to {}\n", context);
        match error.fault() {
            Some((code, message)) => {
                text.push_str(&format!("fault code: {}\nfault message: {}\n", code, message));
            }
            None => text.push_str(&format!("reason: {}\n", error)),
        }

        // a poisoned or failing sink must not turn a report into a panic
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(text.as_bytes());
            let _ = sink.flush();
        }
    }

    /// Report `error` and return it wrapped with `context`.
    pub fn fail<T>(&self, error: Error, context: &str) -> Result<T> {
        self.report(&error, context);
        Err(Error::Failed {
            context: context.to_string(),
            source: Box::new(error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuffer;

    #[test]
    fn test_fail_quiet_without_debug() {
        let buffer = SharedBuffer::default();
        let reporter = FailureReporter::with_sink(false, Box::new(buffer.clone()));

        let result: Result<()> = reporter.fail(Error::SessionClosed, "list systems");
        assert!(matches!(result, Err(Error::Failed { ref context, .. }) if context == "list systems"));
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_fail_describes_fault_with_debug() {
        let buffer = SharedBuffer::default();
        let reporter = FailureReporter::with_sink(true, Box::new(buffer.clone()));

        let fault = Error::Fault {
            code: -210,
            message: "No such channel".to_string(),
        };
        let result: Result<Vec<String>> = reporter.fail(fault, "list packages in rhel-x86_64");
        assert!(result.is_err());

        let output = buffer.contents();
        assert!(output.contains("ERROR: failed to list packages in rhel-x86_64"));
        assert!(output.contains("fault code: -210"));
        assert!(output.contains("fault message: No such channel"));
    }

    #[test]
    fn test_fail_describes_local_error_with_debug() {
        let buffer = SharedBuffer::default();
        let reporter = FailureReporter::with_sink(true, Box::new(buffer.clone()));

        let _: Result<()> = reporter.fail(Error::InvalidDate("tomorrow".to_string()), "schedule reboot");
        let output = buffer.contents();
        assert!(output.contains("failed to schedule reboot"));
        assert!(output.contains("reason: Invalid date \"tomorrow\""));
    }

    #[test]
    fn test_to_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhnapi.log");
        std::fs::write(&path, "earlier line\n").unwrap();

        let reporter = FailureReporter::to_file(true, &path).unwrap();
        let _: Result<()> = reporter.fail(Error::SessionClosed, "log out");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier line\n"));
        assert!(contents.contains("ERROR: failed to log out"));
    }
}
