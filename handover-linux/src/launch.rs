//! Platform launch interface: classify handover data delivered outside the
//! live callback and durably copy any staged file into local storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use handover_core::ReceivedData;
use tracing::{info, warn};

/// Fixed local name a received continuity file is stored under.
pub const SAVED_FILE_NAME: &str = "ContinuityFile.jpg";

/// A launch or resume of the process by the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchSignal {
    /// The peer tapped the continuity affordance; data will follow.
    Direct { peer_node_id: Option<String> },
    /// Handover data delivery.
    DataDelivery {
        peer_node_id: Option<String>,
        payload: LaunchPayload,
    },
}

/// What a data-delivery launch carries.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchPayload {
    /// Literal handover content.
    Content(String),
    /// Reference to a file the framework staged. The framework may purge
    /// its copy once it sees our acknowledgement.
    FileRef(PathBuf),
    /// Nothing usable.
    Empty,
}

/// Turn a data-delivery payload into routable received data. The durable
/// copy happens here, before the router ever sees the file, so the
/// acknowledgement can never outrun it.
pub fn receive_data(payload: &LaunchPayload, storage_dir: &Path) -> ReceivedData {
    match payload {
        LaunchPayload::Content(text) => ReceivedData::Message(text.clone()),
        LaunchPayload::FileRef(source) => {
            let target = storage_dir.join(SAVED_FILE_NAME);
            match copy_to_storage(source, storage_dir, &target) {
                Ok(bytes) => {
                    info!(bytes, path = %target.display(), "continuity file stored");
                    ReceivedData::File(target)
                }
                Err(err) => {
                    warn!(source = %source.display(), %err, "continuity file copy failed");
                    ReceivedData::CopyFailed
                }
            }
        }
        LaunchPayload::Empty => {
            warn!("data delivery without any continuity data");
            ReceivedData::Empty
        }
    }
}

fn copy_to_storage(source: &Path, dir: &Path, target: &Path) -> io::Result<u64> {
    fs::create_dir_all(dir)?;
    let mut reader = io::BufReader::new(fs::File::open(source)?);
    let mut writer = fs::File::create(target)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(bytes)
}
