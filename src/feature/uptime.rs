//! Uptime feature: remembers when it was switched on and reports the
//! elapsed time when switched off.

use super::{Feature, FeatureError, Toggle};
use chrono::{DateTime, Local};
use std::sync::{Mutex, PoisonError};
use tracing::info;

pub struct Uptime {
    toggle: Toggle,
    since: Mutex<Option<DateTime<Local>>>,
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            toggle: Toggle::new("uptime"),
            since: Mutex::new(None),
        }
    }

    /// When the feature was last started, if it is running.
    pub fn since(&self) -> Option<DateTime<Local>> {
        *self.since.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for Uptime {
    fn name(&self) -> &str {
        self.toggle.name()
    }

    fn is_active(&self) -> bool {
        self.toggle.is_active()
    }

    fn start(&self) -> Result<(), FeatureError> {
        if self.toggle.activate() {
            let now = Local::now();
            *self.since.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
            info!(since = %now.format("%Y-%m-%d %H:%M:%S"), "Uptime tracking started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), FeatureError> {
        if self.toggle.deactivate() {
            let since = self
                .since
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(since) = since {
                let elapsed = Local::now() - since;
                info!(seconds = elapsed.num_seconds(), "Uptime tracking stopped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_lifecycle() {
        let uptime = Uptime::new();
        assert_eq!(uptime.name(), "uptime");
        assert!(uptime.since().is_none());

        uptime.start().unwrap();
        assert!(uptime.is_active());
        let since = uptime.since().unwrap();

        // Restarting an active feature keeps the original timestamp
        uptime.start().unwrap();
        assert_eq!(uptime.since(), Some(since));

        uptime.stop().unwrap();
        assert!(!uptime.is_active());
        assert!(uptime.since().is_none());
    }
}
