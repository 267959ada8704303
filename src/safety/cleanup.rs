/// Teardown ledger for sandbox resources
///
/// Resources are recorded immediately after successful acquisition and
/// released in reverse order. Release is idempotent: a ledger that was
/// drained explicitly does nothing on drop, and one that was not (error
/// path, panic, early return) releases everything it still holds.
use crate::config::types::Result;
use log::{debug, info, warn};

/// A resource the ledger can release
pub trait Release: std::fmt::Debug {
    /// Short human-readable identifier for logs and reports
    fn describe(&self) -> String;

    /// Release the resource. Must be safe to call more than once.
    fn release(&mut self) -> Result<()>;
}

/// Outcome of draining a ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub released: Vec<String>,
    pub failures: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TeardownLedger {
    entries: Vec<Box<dyn Release>>,
}

impl TeardownLedger {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a freshly acquired resource
    pub fn record(&mut self, resource: Box<dyn Release>) {
        debug!("Recording resource: {}", resource.describe());
        self.entries.push(resource);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions in acquisition order
    pub fn describe_all(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.describe()).collect()
    }

    /// Release every resource in reverse acquisition order.
    ///
    /// A failing release does not stop the remaining ones.
    pub fn release_all(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.entries.is_empty() {
            return report;
        }

        info!("Starting teardown of {} resources", self.entries.len());
        while let Some(mut entry) = self.entries.pop() {
            let name = entry.describe();
            match entry.release() {
                Ok(()) => {
                    debug!("Released {}", name);
                    report.released.push(name);
                }
                Err(e) => {
                    let msg = format!("Failed to release {}: {}", name, e);
                    warn!("{}", msg);
                    report.failures.push(msg);
                }
            }
        }
        info!("Teardown complete");
        report
    }
}

impl Drop for TeardownLedger {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "Teardown ledger dropped with {} live resources; releasing",
                self.entries.len()
            );
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::PrivboxError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
        released: bool,
    }

    impl Tracked {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Box<Self> {
            Box::new(Self {
                name,
                log: Arc::clone(log),
                fail,
                released: false,
            })
        }
    }

    impl Release for Tracked {
        fn describe(&self) -> String {
            self.name.to_string()
        }

        fn release(&mut self) -> Result<()> {
            if self.released {
                return Ok(());
            }
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(PrivboxError::Mount(format!("{} is busy", self.name)));
            }
            self.released = true;
            Ok(())
        }
    }

    #[test]
    fn releases_in_reverse_acquisition_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = TeardownLedger::new();
        ledger.record(Tracked::boxed("overlay", &log, false));
        ledger.record(Tracked::boxed("bus", &log, false));

        let report = ledger.release_all();
        assert!(report.is_clean());
        assert_eq!(*log.lock().unwrap(), vec!["bus", "overlay"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn failure_does_not_stop_remaining_releases() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = TeardownLedger::new();
        ledger.record(Tracked::boxed("first", &log, false));
        ledger.record(Tracked::boxed("second", &log, true));

        let report = ledger.release_all();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.released, vec!["first".to_string()]);
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn second_drain_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = TeardownLedger::new();
        ledger.record(Tracked::boxed("overlay", &log, false));
        ledger.release_all();
        let report = ledger.release_all();
        assert!(report.released.is_empty());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn drop_releases_live_resources() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut ledger = TeardownLedger::new();
            ledger.record(Tracked::boxed("a", &log, false));
            ledger.record(Tracked::boxed("b", &log, false));
        }
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }
}
