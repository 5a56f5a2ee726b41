//! Worker context: one task owns the router, consumes every event through a
//! single queue, and applies the resulting effects in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use handover_core::{encode_envelope, Effect, HandoverCore, ProtocolError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::launch::{self, LaunchSignal};
use crate::transport::{PeerTransport, TransportEvent};

/// Operator actions from the presentation layer.
#[derive(Debug, Clone)]
pub enum UiCommand {
    MessageBroadcast,
    FileBroadcast,
    StopBroadcast,
    NormalMsg(String),
    SetInput(String),
}

/// Everything the worker consumes. Availability signals, data envelopes,
/// launches and operator actions are merged into one queue so they can
/// never interleave.
#[derive(Debug)]
pub enum ServiceEvent {
    Transport(TransportEvent),
    Launch(LaunchSignal),
    Command(UiCommand),
    /// Stop the worker after a best-effort unregister.
    Shutdown,
}

/// Updates posted to the presentation consumer. The worker never touches
/// shared presentation state directly.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationUpdate {
    Text(String),
    Image(PathBuf),
}

/// Run one device's worker until the event channel closes. `events_tx` is
/// kept for the transport callback: registration hands the transport a
/// dedicated channel forwarded into the main queue.
pub async fn run_service(
    mut core: HandoverCore,
    transport: Arc<dyn PeerTransport>,
    storage_dir: PathBuf,
    mut events: mpsc::UnboundedReceiver<ServiceEvent>,
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
    updates: mpsc::UnboundedSender<PresentationUpdate>,
) {
    let (callback_tx, mut callback_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = callback_rx.recv().await {
            if events_tx.send(ServiceEvent::Transport(event)).is_err() {
                break;
            }
        }
    });

    let effects = core.start();
    apply_effects(effects, &transport, &callback_tx, &updates);

    loop {
        let next_due = core.next_feedback_due();
        tokio::select! {
            event = events.recv() => {
                match event {
                    None | Some(ServiceEvent::Shutdown) => break,
                    Some(event) => {
                        let effects = handle_event(&mut core, event, &storage_dir, &updates);
                        apply_effects(effects, &transport, &callback_tx, &updates);
                    }
                }
            }
            _ = sleep_until(next_due), if next_due.is_some() => {
                let effects = core.poll_feedback(Instant::now());
                apply_effects(effects, &transport, &callback_tx, &updates);
            }
        }
    }

    let effects = core.shutdown();
    apply_effects(effects, &transport, &callback_tx, &updates);
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await,
        // Guarded out by the select; never polled.
        None => std::future::pending().await,
    }
}

fn handle_event(
    core: &mut HandoverCore,
    event: ServiceEvent,
    storage_dir: &std::path::Path,
    updates: &mpsc::UnboundedSender<PresentationUpdate>,
) -> Vec<Effect> {
    match event {
        ServiceEvent::Transport(TransportEvent::Availability(available)) => {
            core.on_availability_changed(available)
        }
        ServiceEvent::Transport(TransportEvent::Data(raw)) => core.on_data_event(&raw),
        ServiceEvent::Launch(LaunchSignal::Direct { peer_node_id }) => {
            info!(peer = ?peer_node_id, "waiting for continuity data");
            Vec::new()
        }
        ServiceEvent::Launch(LaunchSignal::DataDelivery {
            peer_node_id,
            payload,
        }) => {
            // Durable copy first; the framework may purge its staged file
            // as soon as it sees the acknowledgement.
            let data = launch::receive_data(&payload, storage_dir);
            core.on_handover_data(peer_node_id.as_deref(), data, Instant::now())
        }
        // Intercepted by the run loop; nothing to do here.
        ServiceEvent::Shutdown => Vec::new(),
        ServiceEvent::Command(command) => {
            let result = match command {
                UiCommand::SetInput(text) => {
                    core.set_input_text(text);
                    return Vec::new();
                }
                UiCommand::MessageBroadcast => core.send_message_broadcast(),
                UiCommand::FileBroadcast => core.send_file_broadcast(),
                UiCommand::StopBroadcast => core.stop_broadcast(),
                UiCommand::NormalMsg(text) => core.send_normal_msg(&text),
            };
            match result {
                Ok(effects) => effects,
                Err(ProtocolError::ServiceUnavailable { reinitialize }) => {
                    let _ = updates.send(PresentationUpdate::Text(
                        "Handover service is not available.".to_owned(),
                    ));
                    if reinitialize {
                        vec![Effect::Register]
                    } else {
                        Vec::new()
                    }
                }
                Err(err) => {
                    warn!(%err, "operator action rejected");
                    let _ = updates.send(PresentationUpdate::Text(format!("Cannot send: {err}")));
                    Vec::new()
                }
            }
        }
    }
}

fn apply_effects(
    effects: Vec<Effect>,
    transport: &Arc<dyn PeerTransport>,
    callback: &mpsc::UnboundedSender<TransportEvent>,
    updates: &mpsc::UnboundedSender<PresentationUpdate>,
) {
    for effect in effects {
        match effect {
            Effect::Register => transport.register(callback.clone()),
            Effect::Unregister => transport.unregister(),
            Effect::Send(env) => match encode_envelope(&env) {
                Ok(raw) => transport.send(raw),
                Err(err) => warn!(%err, "dropping unencodable envelope"),
            },
            Effect::SendFile(env, file) => match encode_envelope(&env) {
                Ok(raw) => transport.send_with_file(raw, &file),
                Err(err) => warn!(%err, "dropping unencodable envelope"),
            },
            Effect::Surface(text) => {
                let _ = updates.send(PresentationUpdate::Text(text));
            }
            Effect::ShowImage(path) => {
                let _ = updates.send(PresentationUpdate::Image(path));
            }
        }
    }
}
