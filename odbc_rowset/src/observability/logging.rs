use crate::driver::Diagnostic;
use crate::error::OdbcError;
use log::Level;
use std::collections::HashMap;

/// Thin formatting layer over the `log` facade, switchable per connection.
#[derive(Debug, Clone, Copy)]
pub struct StructuredLogger {
    enabled: bool,
}

impl StructuredLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_execute(&self, level: Level, sql: &str, metadata: &HashMap<String, String>) {
        if !self.enabled {
            return;
        }

        let mut message = format!("Execute: {}", sql);
        let mut keys: Vec<_> = metadata.keys().collect();
        keys.sort();
        for key in keys {
            message.push_str(&format!(", {}={}", key, metadata[key]));
        }

        log::log!(level, "{}", message);
    }

    pub fn log_fetch(&self, direction: &str, offset: i64, rows: usize, location: i64) {
        if !self.enabled {
            return;
        }

        log::debug!(
            "Fetch {}({}): rows={}, location={}",
            direction,
            offset,
            rows,
            location
        );
    }

    pub fn log_warning(&self, context: &str, diagnostic: &Diagnostic) {
        if !self.enabled {
            return;
        }

        log::warn!("{}: {}", context, diagnostic);
    }

    pub fn log_error(&self, context: &str, error: &OdbcError) {
        if !self.enabled {
            return;
        }

        log::error!("{}: {}", context, error.to_structured());
    }

    pub fn log_stream(&self, column: usize, bytes: u64) {
        if !self.enabled {
            return;
        }

        log::trace!("Data at execution: column={}, bytes={}", column, bytes);
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
