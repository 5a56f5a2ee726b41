//! Peer transport contract and the in-process loopback used by the demo
//! and the service tests.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use handover_core::{decode_envelope, MsgType};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::launch::{LaunchPayload, LaunchSignal};

/// Inbound callback payloads from the handover framework: an
/// availability-change signal or a raw envelope.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Availability(bool),
    Data(String),
}

/// Abstract send/receive capability provided by the host framework.
/// Sends are fire and forget; delivery failure is logged, never retried.
pub trait PeerTransport: Send + Sync {
    /// Register the callback channel receiving availability and data events.
    fn register(&self, events: mpsc::UnboundedSender<TransportEvent>);
    /// Best-effort unregister; no events are delivered afterwards.
    fn unregister(&self);
    /// Submit an encoded envelope.
    fn send(&self, raw: String);
    /// Submit an encoded envelope together with a local file reference.
    fn send_with_file(&self, raw: String, file: &Path);
}

/// One side of an in-process device pair. Emulates the framework closely
/// enough for the demo: availability is reported on register, handover
/// payloads launch the receiving side, everything else arrives through the
/// data callback.
pub struct LoopbackEndpoint {
    node_id: String,
    inner: Mutex<Inner>,
}

struct Inner {
    callback: Option<mpsc::UnboundedSender<TransportEvent>>,
    launch_sink: Option<mpsc::UnboundedSender<LaunchSignal>>,
    peer: Weak<LoopbackEndpoint>,
    link_up: bool,
}

impl LoopbackEndpoint {
    /// Build two endpoints wired to each other.
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Arc<Self>, Arc<Self>) {
        let a = Arc::new(Self::new(a.into()));
        let b = Arc::new(Self::new(b.into()));
        a.inner().peer = Arc::downgrade(&b);
        b.inner().peer = Arc::downgrade(&a);
        (a, b)
    }

    fn new(node_id: String) -> Self {
        Self {
            node_id,
            inner: Mutex::new(Inner {
                callback: None,
                launch_sink: None,
                peer: Weak::new(),
                link_up: true,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Where this endpoint delivers launch signals (data handed over to the
    /// application running on this device).
    pub fn set_launch_sink(&self, sink: mpsc::UnboundedSender<LaunchSignal>) {
        self.inner().launch_sink = Some(sink);
    }

    /// Simulate the framework going down or coming back on this device.
    /// The registered callback observes the change.
    pub fn set_link(&self, up: bool) {
        let callback = {
            let mut inner = self.inner();
            inner.link_up = up;
            inner.callback.clone()
        };
        if let Some(cb) = callback {
            let _ = cb.send(TransportEvent::Availability(up));
        }
    }

    /// Inject a raw inbound envelope, as if a nearby device had sent it.
    pub fn inject(&self, raw: String) {
        self.push_data(raw);
    }

    fn push_data(&self, raw: String) {
        let (callback, up) = {
            let inner = self.inner();
            (inner.callback.clone(), inner.link_up)
        };
        if !up {
            warn!(node = %self.node_id, "link down, dropping inbound envelope");
            return;
        }
        match callback {
            Some(cb) => {
                if cb.send(TransportEvent::Data(raw)).is_err() {
                    warn!(node = %self.node_id, "callback gone, dropping inbound envelope");
                }
            }
            None => debug!(node = %self.node_id, "not registered, dropping inbound envelope"),
        }
    }

    fn push_launch(&self, signal: LaunchSignal) {
        let sink = self.inner().launch_sink.clone();
        match sink {
            Some(sink) => {
                if sink.send(signal).is_err() {
                    warn!(node = %self.node_id, "launch sink gone, dropping handover data");
                }
            }
            None => warn!(node = %self.node_id, "no launch sink, dropping handover data"),
        }
    }

    fn deliver(&self, raw: String, file: Option<&Path>) {
        let (peer, up) = {
            let inner = self.inner();
            (inner.peer.upgrade(), inner.link_up)
        };
        if !up {
            warn!(node = %self.node_id, "link down, dropping outbound envelope");
            return;
        }
        let Some(peer) = peer else {
            warn!(node = %self.node_id, "peer gone, dropping outbound envelope");
            return;
        };
        // Handover payloads launch the peer application; everything else
        // goes through its registered data callback.
        match decode_envelope(&raw) {
            Ok(env) if env.msg_type == MsgType::ContinuityMsg => {
                peer.push_launch(LaunchSignal::DataDelivery {
                    peer_node_id: Some(self.node_id.clone()),
                    payload: LaunchPayload::Content(env.data_content.unwrap_or_default()),
                });
            }
            Ok(env) if env.msg_type == MsgType::ContinuityFile => {
                let payload = match file {
                    Some(f) => LaunchPayload::FileRef(f.to_path_buf()),
                    None => LaunchPayload::Empty,
                };
                peer.push_launch(LaunchSignal::DataDelivery {
                    peer_node_id: Some(self.node_id.clone()),
                    payload,
                });
            }
            _ => peer.push_data(raw),
        }
    }
}

impl PeerTransport for LoopbackEndpoint {
    fn register(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        let up = {
            let mut inner = self.inner();
            inner.callback = Some(events.clone());
            inner.link_up
        };
        // The framework reports service state right after registration.
        let _ = events.send(TransportEvent::Availability(up));
    }

    fn unregister(&self) {
        self.inner().callback = None;
    }

    fn send(&self, raw: String) {
        self.deliver(raw, None);
    }

    fn send_with_file(&self, raw: String, file: &Path) {
        self.deliver(raw, Some(file));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_core::{encode_envelope, Envelope};

    fn recv_now<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        rx.try_recv().expect("expected a delivered event")
    }

    #[test]
    fn register_reports_availability() {
        let (a, _b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (tx, mut rx) = mpsc::unbounded_channel();
        a.register(tx);
        assert!(matches!(
            recv_now(&mut rx),
            TransportEvent::Availability(true)
        ));
    }

    #[test]
    fn plain_envelope_reaches_peer_callback() {
        let (a, b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.register(tx);
        recv_now(&mut rx); // availability

        let raw = encode_envelope(&Envelope::normal_msg("node-b", "hi")).unwrap();
        a.send(raw.clone());
        match recv_now(&mut rx) {
            TransportEvent::Data(got) => assert_eq!(got, raw),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn continuity_msg_launches_peer() {
        let (a, b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (launch_tx, mut launch_rx) = mpsc::unbounded_channel();
        b.set_launch_sink(launch_tx);

        let raw = encode_envelope(&Envelope::continuity_msg("node-b", "take this")).unwrap();
        a.send(raw);
        assert_eq!(
            recv_now(&mut launch_rx),
            LaunchSignal::DataDelivery {
                peer_node_id: Some("node-a".into()),
                payload: LaunchPayload::Content("take this".into()),
            }
        );
    }

    #[test]
    fn continuity_file_launches_peer_with_file_ref() {
        let (a, b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (launch_tx, mut launch_rx) = mpsc::unbounded_channel();
        b.set_launch_sink(launch_tx);

        let raw = encode_envelope(&Envelope::continuity_file("node-b")).unwrap();
        a.send_with_file(raw, Path::new("/tmp/preset.jpg"));
        assert_eq!(
            recv_now(&mut launch_rx),
            LaunchSignal::DataDelivery {
                peer_node_id: Some("node-a".into()),
                payload: LaunchPayload::FileRef("/tmp/preset.jpg".into()),
            }
        );
    }

    #[test]
    fn link_down_drops_sends_and_reports_unavailable() {
        let (a, b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        a.register(a_tx);
        recv_now(&mut a_rx); // availability true
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        b.register(b_tx);
        recv_now(&mut b_rx);

        a.set_link(false);
        assert!(matches!(
            recv_now(&mut a_rx),
            TransportEvent::Availability(false)
        ));
        let raw = encode_envelope(&Envelope::normal_msg("node-b", "hi")).unwrap();
        a.send(raw);
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn unregister_stops_delivery() {
        let (a, b) = LoopbackEndpoint::pair("node-a", "node-b");
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.register(tx);
        recv_now(&mut rx);
        b.unregister();
        a.send(encode_envelope(&Envelope::normal_msg("node-b", "hi")).unwrap());
        assert!(rx.try_recv().is_err());
    }
}
