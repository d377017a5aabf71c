//! In-memory message bus for tests
//!
//! Same delivery semantics as [`FsBroker`](super::FsBroker) - FIFO per
//! channel, at-most-once, request-id filtering - without touching disk.
//! Clone handles share the same queues.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{BrokerError, BrokerMessage, Channel, MessageBus};

/// Shared-queue message bus
#[derive(Clone)]
pub struct MemoryBus {
    queues: Arc<Mutex<HashMap<Channel, VecDeque<BrokerMessage>>>>,
    poll_interval: Duration,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            poll_interval: Duration::from_millis(5),
        }
    }

    /// Number of undelivered messages on a channel
    pub fn pending(&self, channel: Channel) -> usize {
        self.queues.lock().unwrap().get(&channel).map_or(0, VecDeque::len)
    }

    fn pop_matching(&self, channel: Channel, request_id: Option<&str>) -> Option<BrokerMessage> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(&channel)?;
        match request_id {
            None => queue.pop_front(),
            Some(id) => {
                let pos = queue.iter().position(|m| m.request_id == id)?;
                queue.remove(pos)
            }
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn send(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let channel = Channel::for_type(message.message_type);
        self.queues
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn receive(
        &self,
        channel: Channel,
        timeout: Duration,
        request_id: Option<&str>,
    ) -> Result<Option<BrokerMessage>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.pop_matching(channel, request_id) {
                return Ok(Some(message));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
