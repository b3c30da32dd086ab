use std::sync::Mutex;

/// Sink for the warnings and progress notes raised while resolving a campaign.
///
/// Every resolution step takes one of these explicitly instead of writing to a
/// process-wide logger, so callers decide where data-quality warnings end up.
pub trait Diagnostics: Send + Sync {
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn debug(&self, message: &str) {
        log::debug!("{message}");
    }
}

/// Keeps warnings and info messages in memory. Debug output is dropped.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    warnings: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().map(|i| i.clone()).unwrap_or_default()
    }

    /// Number of warnings whose text contains `needle`
    pub fn count_warnings(&self, needle: &str) -> usize {
        self.warnings()
            .iter()
            .filter(|w| w.contains(needle))
            .count()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn warn(&self, message: &str) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message.to_string());
        }
    }

    fn info(&self, message: &str) {
        if let Ok(mut infos) = self.infos.lock() {
            infos.push(message.to_string());
        }
    }

    fn debug(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_diagnostics() {
        let diag = CollectingDiagnostics::new();
        diag.warn("bad address: foo");
        diag.warn("bad address: bar");
        diag.info("scanned 3 rows");
        diag.debug("ignored");

        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(diag.count_warnings("bad address"), 2);
        assert_eq!(diag.infos(), vec!["scanned 3 rows".to_string()]);
    }
}
