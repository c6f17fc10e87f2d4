//! Events emitted by the engine towards its owner

use crate::error::StreamError;
use crate::state::RecorderState;
use tokio::sync::mpsc;
use tracing::Level;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Lifecycle message with a severity
    Message { message: String, level: Level },
    /// Transport, decode or capture failure
    Exception(StreamError),
    /// Output device fault of the session `session`, eligible for restart
    DeviceFailure { session: u64, message: String },
    StateChanged(RecorderState),
    /// The stream ended on its own and the session released itself
    EndOfStream,
}

/// Sending half of the engine event channel.
///
/// Without a receiver attached, events are only logged.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that only logs
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// New event channel with its sink
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: EngineEvent) {
        match &self.tx {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::trace!("Engine event dropped, no receiver");
                }
            }
            None => log_event(&event),
        }
    }

    pub fn message(&self, level: Level, message: impl Into<String>) {
        self.emit(EngineEvent::Message {
            message: message.into(),
            level,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.message(Level::INFO, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.message(Level::WARN, message);
    }

    pub fn exception(&self, error: StreamError) {
        self.emit(EngineEvent::Exception(error));
    }

    pub fn device_failure(&self, session: u64, message: impl Into<String>) {
        self.emit(EngineEvent::DeviceFailure {
            session,
            message: message.into(),
        });
    }
}

/// Logs an event at its severity
pub fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Message { message, level } => match *level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            _ => tracing::trace!("{}", message),
        },
        EngineEvent::Exception(err) => tracing::error!("{}", err),
        EngineEvent::DeviceFailure { session, message } => {
            tracing::error!(session = *session, "Output device failure: {}", message)
        }
        EngineEvent::StateChanged(state) => tracing::debug!("Recorder {}", state),
        EngineEvent::EndOfStream => tracing::info!("End of stream"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_forwards_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.info("Started recording");
        sink.device_failure(3, "NoDriver");
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Message {
                message: "Started recording".into(),
                level: Level::INFO
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::DeviceFailure {
                session: 3,
                message: "NoDriver".into()
            }
        );
    }

    #[test]
    fn test_detached_and_closed_sinks_do_not_panic() {
        EventSink::detached().info("nobody listens");
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.exception(StreamError::Cancelled);
    }
}
