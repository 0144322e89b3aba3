//! Unsolicited event delivery.

use serde::Serialize;
use tokio::sync::mpsc;

/// Event raised by the device rather than in response to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "eventType")]
pub enum SessionEvent {
    /// The device reported a non-fatal error.
    #[serde(rename = "error")]
    Error {
        /// Driver-provided description.
        #[serde(rename = "errorDescription")]
        description: String,
    },
    /// The device was closed by someone other than the caller.
    #[serde(rename = "camera_closing")]
    CameraClosed,
}

/// Delivers [`SessionEvent`]s to at most one observer.
#[derive(Debug, Default)]
pub struct EventNotifier {
    observer: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventNotifier {
    /// Attaches a new observer, replacing any previous one.
    pub fn attach(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.observer.replace(tx).is_some() {
            tracing::debug!("previous event observer replaced");
        }
        rx
    }

    /// Detaches the observer. Its channel ends.
    pub fn detach(&mut self) {
        self.observer = None;
    }

    /// Sends `event` to the observer, if any. Returns true if delivered.
    pub fn notify(&mut self, event: SessionEvent) -> bool {
        let Some(observer) = self.observer.as_ref() else {
            tracing::debug!(?event, "no observer for session event");
            return false;
        };
        if observer.send(event).is_err() {
            tracing::debug!("event observer went away");
            self.observer = None;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let error = SessionEvent::Error {
            description: "overheated".into(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"eventType": "error", "errorDescription": "overheated"})
        );
        assert_eq!(
            serde_json::to_value(&SessionEvent::CameraClosed).unwrap(),
            serde_json::json!({"eventType": "camera_closing"})
        );
    }

    #[test]
    fn test_new_observer_replaces_old() {
        let mut notifier = EventNotifier::default();
        let mut first = notifier.attach();
        let mut second = notifier.attach();

        assert!(notifier.notify(SessionEvent::CameraClosed));
        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().unwrap(), SessionEvent::CameraClosed);
    }

    #[test]
    fn test_detach_ends_channel() {
        let mut notifier = EventNotifier::default();
        let mut rx = notifier.attach();
        notifier.detach();

        assert!(!notifier.notify(SessionEvent::CameraClosed));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
