// Continuity handover demo: two loopback-paired devices driven from stdin.

mod config;
mod launch;
mod service;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use handover_core::{encode_envelope, CoreOptions, Envelope, HandoverCore, MsgType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use crate::launch::{LaunchPayload, LaunchSignal};
use crate::service::{PresentationUpdate, ServiceEvent, UiCommand};
use crate::transport::{LoopbackEndpoint, PeerTransport};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "commands:
  msg-broadcast        announce a message handover
  file-broadcast       announce a file handover
  stop                 withdraw the broadcast
  input <text>         set the text offered on the next request
  normal <text>        send a plain message to the active peer
  request              peer taps the continuity affordance
  launch-msg <text>    platform delivers handover text to device a
  launch-file <path>   platform delivers a staged file to device a
  down / up            take the framework link on device a down or up
  help                 show this list
  quit                 exit";

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("handover-linux {VERSION}");
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let rt = tokio::runtime::Runtime::new().context("building runtime")?;
    rt.block_on(run(cfg))
}

struct Device {
    endpoint: Arc<LoopbackEndpoint>,
    events: mpsc::UnboundedSender<ServiceEvent>,
}

/// Wire one device: launch forwarder, presentation printer, service worker.
fn start_device(
    endpoint: Arc<LoopbackEndpoint>,
    label: &'static str,
    storage_dir: PathBuf,
    options: CoreOptions,
) -> Device {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

    let (launch_tx, mut launch_rx) = mpsc::unbounded_channel();
    endpoint.set_launch_sink(launch_tx);
    let forward = events_tx.clone();
    tokio::spawn(async move {
        while let Some(signal) = launch_rx.recv().await {
            if forward.send(ServiceEvent::Launch(signal)).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            match update {
                PresentationUpdate::Text(text) => println!("[{label}] {text}"),
                PresentationUpdate::Image(path) => {
                    println!("[{label}] showing image {}", path.display())
                }
            }
        }
    });

    tokio::spawn(service::run_service(
        HandoverCore::new(options),
        endpoint.clone() as Arc<dyn PeerTransport>,
        storage_dir,
        events_rx,
        events_tx.clone(),
        updates_tx,
    ));

    Device {
        endpoint,
        events: events_tx,
    }
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let eligibility = config::load_eligibility(&cfg.eligibility_file);
    let options = CoreOptions {
        preset_file: cfg.preset_file.clone(),
        eligibility,
        default_message: cfg.default_message.clone(),
    };

    let (a_ep, b_ep) = LoopbackEndpoint::pair("node-a", "node-b");
    let device_a = start_device(
        a_ep,
        "device-a",
        cfg.storage_dir.join("device-a"),
        options.clone(),
    );
    let device_b = start_device(
        b_ep,
        "device-b",
        cfg.storage_dir.join("device-b"),
        options,
    );

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        if !handle_line(line.trim(), &device_a, &device_b) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = shutdown_signal() => break,
        }
    }

    info!("shutting down");
    let _ = device_a.events.send(ServiceEvent::Shutdown);
    let _ = device_b.events.send(ServiceEvent::Shutdown);
    // Let the workers run their best-effort unregister before the runtime
    // is torn down.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    Ok(())
}

/// Apply one shell command. Returns false to exit.
fn handle_line(line: &str, device_a: &Device, device_b: &Device) -> bool {
    let (cmd, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    match cmd {
        "" => {}
        "msg-broadcast" => send_command(device_a, UiCommand::MessageBroadcast),
        "file-broadcast" => send_command(device_a, UiCommand::FileBroadcast),
        "stop" => send_command(device_a, UiCommand::StopBroadcast),
        "input" => send_command(device_a, UiCommand::SetInput(rest.to_owned())),
        "normal" => send_command(device_a, UiCommand::NormalMsg(rest.to_owned())),
        "request" => {
            // The user on device b taps the continuity affordance: the
            // framework sends device a a request carrying b's node id.
            let request = Envelope {
                msg_type: MsgType::ContinuityRequest,
                node_id: Some(device_b.endpoint.node_id().to_owned()),
                data_content: None,
                error_code: None,
                online_dev_num: None,
                eligibility: None,
            };
            match encode_envelope(&request) {
                Ok(raw) => device_b.endpoint.send(raw),
                Err(err) => println!("cannot build request: {err}"),
            }
        }
        "launch-msg" => {
            let _ = device_a.events.send(ServiceEvent::Launch(LaunchSignal::DataDelivery {
                peer_node_id: Some(device_b.endpoint.node_id().to_owned()),
                payload: LaunchPayload::Content(rest.to_owned()),
            }));
        }
        "launch-file" => {
            let _ = device_a.events.send(ServiceEvent::Launch(LaunchSignal::DataDelivery {
                peer_node_id: Some(device_b.endpoint.node_id().to_owned()),
                payload: LaunchPayload::FileRef(PathBuf::from(rest)),
            }));
        }
        "down" => device_a.endpoint.set_link(false),
        "up" => device_a.endpoint.set_link(true),
        "help" => println!("{HELP}"),
        "quit" | "exit" => return false,
        other => println!("unknown command: {other} (try help)"),
    }
    true
}

fn send_command(device: &Device, command: UiCommand) {
    let _ = device.events.send(ServiceEvent::Command(command));
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
