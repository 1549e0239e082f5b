use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::ScanEvent;

/// Receiver of a session's serialized event stream.
///
/// Called from the single delivery task, one event at a time. A slow sink
/// slows delivery, which in turn back-pressures the workers.
#[async_trait]
pub trait ResultSink: Send + 'static {
    async fn on_event(&mut self, event: &ScanEvent);
}

#[async_trait]
impl ResultSink for mpsc::UnboundedSender<ScanEvent> {
    async fn on_event(&mut self, event: &ScanEvent) {
        // a dropped receiver just means nobody is listening any more
        let _ = self.send(event.clone());
    }
}

#[async_trait]
impl ResultSink for mpsc::Sender<ScanEvent> {
    async fn on_event(&mut self, event: &ScanEvent) {
        let _ = self.send(event.clone()).await;
    }
}
