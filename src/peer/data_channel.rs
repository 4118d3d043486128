//! The `remoteControl` data channel.
//!
//! The channel may be created by either side: the agent's arrives through a
//! data-channel event, ours is created right after applying a remote offer.
//! Both paths run through [`ControlChannel::attach`], which wires the same
//! observers. Outbound commands drain through one writer task per channel,
//! so commands are delivered in the order they were accepted.

use crate::input::{CommandSink, InputCommand};
use crate::peer::types::AgentMessage;
use crate::signals::EngineSignals;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

pub struct ControlChannel {
    signals: Arc<EngineSignals>,
    slot: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    open: Arc<AtomicBool>,
    queue: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl ControlChannel {
    pub fn new(signals: Arc<EngineSignals>) -> Self {
        Self {
            signals,
            slot: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            queue: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Adopts a channel (either side may have created it) and wires the
    /// open/close/error/message observers. Replaces any previous channel.
    pub fn attach(&self, dc: Arc<RTCDataChannel>) {
        debug!(label = %dc.label(), "attaching control channel");

        self.open.store(false, Ordering::SeqCst);
        self.queue.lock().take();
        if let Some(writer) = self.writer.lock().take() {
            writer.abort();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.queue.lock() = Some(tx);

        // Single writer preserves send order end to end.
        let writer_dc = dc.clone();
        *self.writer.lock() = Some(tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = writer_dc.send_text(text).await {
                    warn!(error = %e, "control channel send failed");
                }
            }
        }));

        let open = self.open.clone();
        let signals = self.signals.clone();
        dc.on_open(Box::new(move || {
            info!("control channel open");
            open.store(true, Ordering::SeqCst);
            signals.set_control_enabled(true);
            Box::pin(async {})
        }));

        let open = self.open.clone();
        let signals = self.signals.clone();
        let slot = self.slot.clone();
        dc.on_close(Box::new(move || {
            info!("control channel closed");
            open.store(false, Ordering::SeqCst);
            signals.set_control_enabled(false);
            slot.lock().take();
            Box::pin(async {})
        }));

        let open = self.open.clone();
        let signals = self.signals.clone();
        let slot = self.slot.clone();
        dc.on_error(Box::new(move |e| {
            warn!(error = %e, "control channel error");
            open.store(false, Ordering::SeqCst);
            signals.set_control_enabled(false);
            slot.lock().take();
            Box::pin(async {})
        }));

        let signals = self.signals.clone();
        dc.on_message(Box::new(move |message: DataChannelMessage| {
            handle_agent_message(&message.data, &signals);
            Box::pin(async {})
        }));

        *self.slot.lock() = Some(dc);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Closes the channel if one is attached. Idempotent; errors from an
    /// already-closed channel are swallowed.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.signals.set_control_enabled(false);
        self.queue.lock().take();
        if let Some(writer) = self.writer.lock().take() {
            writer.abort();
        }
        let dc = self.slot.lock().take();
        if let Some(dc) = dc {
            let _ = dc.close().await;
        }
    }
}

impl CommandSink for ControlChannel {
    /// Accepts a command only while the channel is open; otherwise it is
    /// dropped and `false` is returned. Nothing is ever buffered for later.
    fn try_send(&self, command: &InputCommand) -> bool {
        if !self.is_open() {
            return false;
        }
        let text = match serde_json::to_string(command) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to serialize input command");
                return false;
            }
        };
        match self.queue.lock().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }
}

fn handle_agent_message(data: &[u8], signals: &EngineSignals) {
    match serde_json::from_slice::<AgentMessage>(data) {
        Ok(AgentMessage::Resolution { width, height }) => {
            signals.set_resolution(crate::peer::types::ScreenResolution { width, height });
        }
        Err(e) => {
            trace!(error = %e, "ignoring unrecognized channel message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::ScreenResolution;

    #[tokio::test]
    async fn commands_are_dropped_while_no_channel_is_attached() {
        let signals = Arc::new(EngineSignals::new());
        let channel = ControlChannel::new(signals.clone());

        assert!(!channel.is_open());
        assert!(!channel.try_send(&InputCommand::MouseMove { x: 1, y: 2 }));
        // Nothing was queued for a future channel.
        assert!(channel.queue.lock().is_none());
        assert!(!signals.control_enabled());
    }

    #[tokio::test]
    async fn close_without_channel_is_a_no_op() {
        let signals = Arc::new(EngineSignals::new());
        let channel = ControlChannel::new(signals);
        channel.close().await;
        channel.close().await;
        assert!(!channel.is_open());
    }

    #[test]
    fn resolution_messages_update_the_signal() {
        let signals = EngineSignals::new();
        handle_agent_message(br#"{"type":"resolution","width":3440,"height":1440}"#, &signals);
        assert_eq!(
            signals.resolution(),
            ScreenResolution {
                width: 3440,
                height: 1440
            }
        );
    }

    #[test]
    fn malformed_channel_messages_are_ignored() {
        let signals = EngineSignals::new();
        let before = signals.resolution();
        handle_agent_message(b"\xff\xfe not json", &signals);
        handle_agent_message(br#"{"type":"clipboard","data":"x"}"#, &signals);
        assert_eq!(signals.resolution(), before);
    }
}
