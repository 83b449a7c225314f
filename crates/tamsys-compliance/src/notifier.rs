//! Delivery seam for expiry alerts.
//!
//! Email delivery is not implemented; [`LogNotifier`] writes each alert to
//! the log at a severity matching its urgency.

use crate::expiry::{ExpiredRecord, ExpiryNotice};

/// An alert produced by a committed expiry run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryEvent {
    /// A certificate reached a notification threshold.
    Warning(ExpiryNotice),
    /// A certificate passed its expiry date.
    Expired(ExpiredRecord),
}

/// Receives expiry alerts after the run that produced them has committed.
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Delivery failures are the notifier's to log.
    fn deliver(&self, event: &ExpiryEvent);
}

/// Logs alerts instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, event: &ExpiryEvent) {
        match event {
            ExpiryEvent::Warning(notice) => tracing::warn!(
                record_id = %notice.record_id,
                tenant_id = %notice.tenant_id,
                device_id = %notice.device_id,
                country_id = %notice.country_id,
                certification_id = %notice.certification_id,
                expiry_date = %notice.expiry_date,
                severity = notice.severity.as_str(),
                "ALERT: certificate expiring in {} days",
                notice.days_before_expiry
            ),
            ExpiryEvent::Expired(expired) => tracing::error!(
                record_id = %expired.record_id,
                tenant_id = %expired.tenant_id,
                device_id = %expired.device_id,
                expiry_date = %expired.expiry_date,
                previous_status = %expired.previous_status,
                "CRITICAL: certificate expired"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! A notifier that keeps what it receives.

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<ExpiryEvent>>,
    }

    impl Notifier for RecordingNotifier {
        fn deliver(&self, event: &ExpiryEvent) {
            self.events.lock().push(event.clone());
        }
    }
}
