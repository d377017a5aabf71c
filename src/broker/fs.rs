//! Filesystem-backed message channels
//!
//! Each channel is a directory under a shared root; each message is one
//! file named `<epoch_ms>_<sanitized_request_id>.json`. Writers create a
//! `.tmp` file and atomically rename it, readers ignore `.tmp`, take files
//! in filename order and delete after reading. That rename/delete pair is
//! the whole consistency story; there are no locks.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{BrokerError, BrokerMessage, Channel, MessageBus};

/// Normalize a request id for use inside a filename.
///
/// Lowercase, non-alphanumerics become `_`, truncated to 128 characters.
/// Writer and reader apply the identical rule so their filenames match.
pub fn sanitize_request_id(request_id: &str) -> String {
    request_id
        .chars()
        .take(128)
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() { c } else { '_' }
        })
        .collect()
}

/// Directory-tree message broker
pub struct FsBroker {
    root: PathBuf,
    poll_interval: Duration,
}

impl FsBroker {
    /// Open a broker rooted at `root`, creating every channel directory
    pub fn new(root: impl Into<PathBuf>, poll_interval_ms: u64) -> Result<Self, BrokerError> {
        let root = root.into();
        for channel in Channel::ALL {
            fs::create_dir_all(root.join(channel.dir_name()))?;
        }
        debug!(?root, poll_interval_ms, "FsBroker: opened");
        Ok(Self {
            root,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }

    /// The broker root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn channel_dir(&self, channel: Channel) -> PathBuf {
        self.root.join(channel.dir_name())
    }

    /// List `.json` message files in FIFO order (filename sort: timestamp
    /// first, request id as the tie-break).
    fn list_messages(&self, dir: &Path, request_id: Option<&str>) -> Result<Vec<PathBuf>, BrokerError> {
        let suffix = request_id.map(|id| format!("_{}.json", sanitize_request_id(id)));

        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                // `.tmp` files are writes in flight; never touch them
                continue;
            }
            if let Some(suffix) = &suffix {
                if !name.ends_with(suffix.as_str()) {
                    continue;
                }
            }
            names.push(name);
        }
        names.sort();
        Ok(names.into_iter().map(|n| dir.join(n)).collect())
    }

    /// Read, delete and parse one message file
    fn take_message(&self, path: &Path) -> Result<Option<BrokerMessage>, BrokerError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            // Raced with another consumer or the sender's cleanup
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Delete first: at-most-once even if parsing fails below
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        match serde_json::from_str::<BrokerMessage>(&content) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(?path, error = %e, "FsBroker: dropping unparseable message");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl MessageBus for FsBroker {
    async fn send(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let channel = Channel::for_type(message.message_type);
        let dir = self.channel_dir(channel);
        let sanitized = sanitize_request_id(&message.request_id);

        // Bump the timestamp on filename collision so rapid sends with the
        // same request id keep their arrival order.
        let mut ts = message.timestamp;
        let mut target = dir.join(format!("{}_{}.json", ts, sanitized));
        while target.exists() {
            ts += 1;
            target = dir.join(format!("{}_{}.json", ts, sanitized));
        }

        let tmp = dir.join(format!("{}_{}.tmp", ts, sanitized));
        let body = serde_json::to_string(&message)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &target)?;

        debug!(%channel, request_id = %message.request_id, file = ?target.file_name(), "FsBroker: sent");
        Ok(())
    }

    async fn receive(
        &self,
        channel: Channel,
        timeout: Duration,
        request_id: Option<&str>,
    ) -> Result<Option<BrokerMessage>, BrokerError> {
        let dir = self.channel_dir(channel);
        let deadline = Instant::now() + timeout;

        loop {
            for path in self.list_messages(&dir, request_id)? {
                if let Some(message) = self.take_message(&path)? {
                    debug!(%channel, request_id = %message.request_id, "FsBroker: received");
                    return Ok(Some(message));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
