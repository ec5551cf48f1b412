use crate::driver::{CallResult, Diagnostic, DiagnosticSource};
use crate::error::{OdbcError, Result};
use crate::observability::StructuredLogger;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Warning surfaced by a driver call that otherwise succeeded.
pub type SqlWarning = Diagnostic;

const NO_DESCRIPTION: &str = "No description available";

/// Turns driver call results into crate errors and keeps the warnings.
///
/// Warnings go into a bounded FIFO; once `capacity` is reached the oldest
/// entry is dropped.
#[derive(Debug)]
pub struct ErrorHandler {
    warnings: Mutex<VecDeque<SqlWarning>>,
    collect: bool,
    capacity: usize,
    logger: StructuredLogger,
}

impl ErrorHandler {
    pub fn new(collect: bool, capacity: usize, logger: StructuredLogger) -> Self {
        Self {
            warnings: Mutex::new(VecDeque::new()),
            collect,
            capacity: capacity.max(1),
            logger,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collect
    }

    pub fn post_warning(&self, warning: SqlWarning) {
        if !self.collect {
            return;
        }
        if let Ok(mut list) = self.warnings.lock() {
            list.push_back(warning);
            while list.len() > self.capacity {
                list.pop_front();
            }
        }
    }

    /// Hands the accumulated warnings to the caller and starts a new list.
    pub fn take_warnings(&self) -> Vec<SqlWarning> {
        self.warnings
            .lock()
            .map(|mut list| list.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn clear_warnings(&self) {
        if let Ok(mut list) = self.warnings.lock() {
            list.clear();
        }
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.lock().map(|list| list.len()).unwrap_or(0)
    }

    /// Checks `result` with `HY000` as the state used when the driver left
    /// no diagnostic record.
    pub fn check<T, S>(&self, source: &mut S, result: CallResult<T>, what: &str) -> Result<T>
    where
        S: DiagnosticSource + ?Sized,
    {
        self.check_with_state(source, result, what, "HY000")
    }

    pub fn check_with_state<T, S>(
        &self,
        source: &mut S,
        result: CallResult<T>,
        what: &str,
        fallback_state: &str,
    ) -> Result<T>
    where
        S: DiagnosticSource + ?Sized,
    {
        let records = source.diagnostics();
        match result {
            Ok(value) => {
                for record in records {
                    self.logger.log_warning(what, &record);
                    self.post_warning(record);
                }
                Ok(value)
            }
            Err(_) => {
                let err = error_from_records(records, what, fallback_state);
                self.logger.log_error(what, &err);
                Err(err)
            }
        }
    }
}

impl ErrorHandler {
    /// Checks the result of a call that leaves no diagnostic records, such
    /// as a cancellation request.
    pub fn check_detached<T>(&self, result: CallResult<T>, what: &str) -> Result<T> {
        result.map_err(|_| {
            let err = error_from_records(Vec::new(), what, "HY000");
            self.logger.log_error(what, &err);
            err
        })
    }
}

fn prefixed(what: &str, text: &str) -> String {
    if what.is_empty() {
        text.to_string()
    } else {
        format!("{}: {}", what, text)
    }
}

fn error_from_records(records: Vec<Diagnostic>, what: &str, fallback_state: &str) -> OdbcError {
    let mut records = records.into_iter();
    match records.next() {
        Some(first) => {
            for extra in records {
                log::debug!("{}: additional diagnostic {}", what, extra);
            }
            OdbcError::Structured {
                sqlstate: first.sqlstate,
                native_code: first.native_code,
                message: prefixed(what, &first.message),
            }
        }
        None => {
            let fallback = Diagnostic::new(fallback_state, 0, "");
            OdbcError::Structured {
                sqlstate: fallback.sqlstate,
                native_code: 0,
                message: prefixed(what, NO_DESCRIPTION),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::CallFailed;

    struct Records(Vec<Diagnostic>);

    impl DiagnosticSource for Records {
        fn diagnostics(&mut self) -> Vec<Diagnostic> {
            std::mem::take(&mut self.0)
        }
    }

    fn handler(capacity: usize) -> ErrorHandler {
        ErrorHandler::new(true, capacity, StructuredLogger::new(false))
    }

    #[test]
    fn test_error_takes_first_record_with_prefix() {
        let h = handler(64);
        let mut src = Records(vec![
            Diagnostic::new("42S02", 208, "Invalid object name 'x'"),
            Diagnostic::new("42000", 8180, "Statement could not be prepared"),
        ]);
        let err = h
            .check::<(), _>(&mut src, Err(CallFailed), "Error preparing SELECT")
            .unwrap_err();
        assert_eq!(&err.sqlstate(), b"42S02");
        assert_eq!(err.native_code(), 208);
        assert_eq!(err.to_string(), "Error preparing SELECT: Invalid object name 'x'");
        assert!(src.0.is_empty());
    }

    #[test]
    fn test_error_without_records_uses_fallback_state() {
        let h = handler(64);
        let mut src = Records(vec![]);
        let err = h
            .check_with_state::<(), _>(&mut src, Err(CallFailed), "SQLSetPos failed", "HY109")
            .unwrap_err();
        assert_eq!(&err.sqlstate(), b"HY109");
        assert_eq!(err.to_string(), "SQLSetPos failed: No description available");

        let err = h.check::<(), _>(&mut src, Err(CallFailed), "").unwrap_err();
        assert_eq!(&err.sqlstate(), b"HY000");
        assert_eq!(err.to_string(), "No description available");
    }

    #[test]
    fn test_success_records_become_warnings() {
        let h = handler(64);
        let mut src = Records(vec![
            Diagnostic::new("01004", 0, "String data, right truncated"),
            Diagnostic::new("01S02", 0, "Option value changed"),
        ]);
        assert_eq!(h.check(&mut src, Ok(5), "fetch").unwrap(), 5);
        assert_eq!(h.warning_count(), 2);
        let warnings = h.take_warnings();
        assert_eq!(warnings[0].sqlstate_str(), "01004");
        assert_eq!(h.warning_count(), 0);
    }

    #[test]
    fn test_warning_list_is_bounded_fifo() {
        let h = handler(3);
        for i in 0..5 {
            h.post_warning(Diagnostic::new("01000", i, format!("w{}", i)));
        }
        let warnings = h.take_warnings();
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].message, "w2");
        assert_eq!(warnings[2].message, "w4");
    }

    #[test]
    fn test_detached_failure_has_no_description() {
        let h = handler(64);
        assert_eq!(h.check_detached(Ok(3), "cancel").unwrap(), 3);
        let err = h
            .check_detached::<()>(Err(CallFailed), "Error canceling statement")
            .unwrap_err();
        assert_eq!(err.sqlstate_str(), "HY000");
        assert_eq!(
            err.to_string(),
            "Error canceling statement: No description available"
        );
    }

    #[test]
    fn test_collection_disabled_drops_warnings() {
        let h = ErrorHandler::new(false, 64, StructuredLogger::new(false));
        let mut src = Records(vec![Diagnostic::new("01000", 0, "general warning")]);
        h.check(&mut src, Ok(()), "").unwrap();
        assert_eq!(h.warning_count(), 0);
        assert!(src.0.is_empty());

        let h = handler(64);
        h.post_warning(Diagnostic::new("01000", 0, "x"));
        h.clear_warnings();
        assert!(h.take_warnings().is_empty());
    }
}
