//! Optional server features.
//!
//! Features are switched on before the listener opens and off after it
//! closes. They are resolved by name from a static registration table:
//!
//! - `uptime`: logs how long the server ran
//!
//! One feature failing, by error or by panic, never keeps the others
//! from starting or stopping.

mod uptime;

pub use uptime::Uptime;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Lifecycle contract for a feature.
pub trait Feature: Send + Sync {
    fn name(&self) -> &str;
    fn is_active(&self) -> bool;
    fn start(&self) -> Result<(), FeatureError>;
    fn stop(&self) -> Result<(), FeatureError>;
}

type Constructor = fn() -> Box<dyn Feature>;

/// Features that can be enabled by name.
const REGISTRY: &[(&str, Constructor)] = &[("uptime", uptime)];

fn uptime() -> Box<dyn Feature> {
    Box::new(Uptime::new())
}

/// Idempotent on/off flag.
///
/// `activate` and `deactivate` return whether the state actually
/// changed, logging when it did not.
pub struct Toggle {
    name: &'static str,
    active: AtomicBool,
}

impl Toggle {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn activate(&self) -> bool {
        if self.active.swap(true, Ordering::AcqRel) {
            info!(feature = self.name, "Feature already started");
            return false;
        }
        true
    }

    pub fn deactivate(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            info!(feature = self.name, "Feature already stopped");
            return false;
        }
        true
    }
}

/// The features enabled for this server.
#[derive(Default)]
pub struct FeatureSet {
    features: Vec<Box<dyn Feature>>,
}

impl FeatureSet {
    pub fn new(features: Vec<Box<dyn Feature>>) -> Self {
        Self { features }
    }

    /// Construct the named features from the built-in registry.
    ///
    /// Names match case-insensitively. Unknown names are logged and
    /// skipped; repeated names are enabled once.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::resolve(names, REGISTRY)
    }

    fn resolve<S: AsRef<str>>(names: &[S], registry: &[(&str, Constructor)]) -> Self {
        let mut features: Vec<Box<dyn Feature>> = Vec::new();

        for name in names.iter().map(AsRef::as_ref) {
            if features.iter().any(|f| f.name().eq_ignore_ascii_case(name)) {
                continue;
            }
            match registry.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some((_, construct)) => features.push(construct()),
                None => warn!(feature = name, "Unknown feature, skipping"),
            }
        }

        Self { features }
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of features currently running.
    pub fn active_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_active()).count()
    }

    /// Start every inactive feature. Returns how many started cleanly.
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for feature in self.features.iter().filter(|f| !f.is_active()) {
            if guarded(&**feature, "start", || feature.start()) {
                started += 1;
            }
        }
        started
    }

    /// Stop every active feature. Returns how many stopped cleanly.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for feature in self.features.iter().filter(|f| f.is_active()) {
            if guarded(&**feature, "stop", || feature.stop()) {
                stopped += 1;
            }
        }
        stopped
    }
}

/// Run one lifecycle call, containing errors and panics.
fn guarded(
    feature: &dyn Feature,
    action: &str,
    call: impl FnOnce() -> Result<(), FeatureError>,
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(feature = feature.name(), action, error = %e, "Feature failed");
            false
        }
        Err(_) => {
            error!(feature = feature.name(), action, "Feature panicked");
            false
        }
    }
}

/// Feature lifecycle errors
#[derive(Debug)]
pub struct FeatureError {
    feature: String,
    reason: String,
}

impl FeatureError {
    pub fn new(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Feature '{}' failed: {}", self.feature, self.reason)
    }
}

impl std::error::Error for FeatureError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Clone, Copy)]
    enum Fault {
        None,
        ErrOnStart,
        PanicOnStop,
    }

    struct Stub {
        toggle: Toggle,
        fault: Fault,
        calls: Arc<AtomicUsize>,
    }

    impl Stub {
        fn boxed(name: &'static str, fault: Fault, calls: &Arc<AtomicUsize>) -> Box<dyn Feature> {
            Box::new(Self {
                toggle: Toggle::new(name),
                fault,
                calls: Arc::clone(calls),
            })
        }
    }

    impl Feature for Stub {
        fn name(&self) -> &str {
            self.toggle.name()
        }

        fn is_active(&self) -> bool {
            self.toggle.is_active()
        }

        fn start(&self) -> Result<(), FeatureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Fault::ErrOnStart = self.fault {
                return Err(FeatureError::new(self.name(), "refused"));
            }
            self.toggle.activate();
            Ok(())
        }

        fn stop(&self) -> Result<(), FeatureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Fault::PanicOnStop = self.fault {
                panic!("stop exploded");
            }
            self.toggle.deactivate();
            Ok(())
        }
    }

    #[test]
    fn test_failure_does_not_stop_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = FeatureSet::new(vec![
            Stub::boxed("broken", Fault::ErrOnStart, &calls),
            Stub::boxed("healthy", Fault::None, &calls),
            Stub::boxed("fragile", Fault::PanicOnStop, &calls),
        ]);

        assert_eq!(set.start_all(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Only the two active features are asked to stop
        assert_eq!(set.stop_all(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_start_skips_active_features() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = FeatureSet::new(vec![Stub::boxed("once", Fault::None, &calls)]);

        assert_eq!(set.start_all(), 1);
        assert_eq!(set.start_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(set.stop_all(), 1);
        assert_eq!(set.stop_all(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_by_name() {
        let set = FeatureSet::from_names(&["Uptime", "nonexistent", "UPTIME"]);
        assert_eq!(set.names(), vec!["uptime"]);
        assert_eq!(set.len(), 1);

        assert!(FeatureSet::from_names::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_toggle() {
        let toggle = Toggle::new("switch");
        assert!(!toggle.is_active());
        assert!(toggle.activate());
        assert!(!toggle.activate());
        assert!(toggle.is_active());
        assert!(toggle.deactivate());
        assert!(!toggle.deactivate());
    }
}
