//! In-process broker for tests and local dry runs.
//!
//! Topics have a single partition (0). Offsets start at 0 and grow by one per
//! record. Faults can be queued so the next produce or fetch fails with a chosen
//! error, and the broker can be made unreachable to simulate a dropped
//! connection.

use crate::{
    error::{ClientError, Result},
    message::{Delivery, FetchedRecord, Message, StartPosition},
    session::{Connector, Session},
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};
use tracing::debug;

/// Cloneable handle to a shared in-memory broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<BrokerState>,
    new_data: Notify,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
}

struct BrokerState {
    topics: HashMap<String, Vec<FetchedRecord>>,
    auto_create_topics: bool,
    reachable: bool,
    produce_faults: VecDeque<ClientError>,
    fetch_faults: VecDeque<ClientError>,
    produce_delay: Option<Duration>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            auto_create_topics: true,
            reachable: true,
            produce_faults: VecDeque::new(),
            fetch_faults: VecDeque::new(),
            produce_delay: None,
        }
    }
}

impl BrokerState {
    fn topic_mut(&mut self, topic: &str, partition: i32) -> Result<&mut Vec<FetchedRecord>> {
        if partition != 0 {
            return Err(ClientError::BrokerRejected(format!(
                "UnknownTopicOrPartition: {}/{}",
                topic, partition
            )));
        }
        if !self.topics.contains_key(topic) {
            if !self.auto_create_topics {
                return Err(ClientError::BrokerRejected(format!(
                    "UnknownTopicOrPartition: {}",
                    topic
                )));
            }
            self.topics.insert(topic.to_string(), Vec::new());
        }
        self.topics
            .get_mut(topic)
            .ok_or_else(|| ClientError::unknown("memory topic lookup", topic))
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(ClientError::Connection("memory broker unreachable".to_string()))
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker that rejects writes to topics that were never created
    pub fn without_auto_create() -> Self {
        let broker = Self::new();
        broker.inner.state.lock().auto_create_topics = false;
        broker
    }

    pub fn create_topic(&self, topic: &str) {
        self.inner
            .state
            .lock()
            .topics
            .entry(topic.to_string())
            .or_default();
    }

    /// Append a raw record, bypassing the session layer. `value: None` stores
    /// a record the receiver will reject as malformed.
    pub fn inject_record(&self, topic: &str, key: Option<Bytes>, value: Option<Bytes>) -> i64 {
        let offset = {
            let mut state = self.inner.state.lock();
            let records = state.topics.entry(topic.to_string()).or_default();
            let offset = records.len() as i64;
            records.push(FetchedRecord { offset, key, value });
            offset
        };
        self.inner.new_data.notify_waiters();
        offset
    }

    /// Snapshot of everything stored on a topic
    pub fn records(&self, topic: &str) -> Vec<FetchedRecord> {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the broker (un)reachable for new and existing sessions
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.state.lock().reachable = reachable;
        self.inner.new_data.notify_waiters();
    }

    pub fn fail_next_produce(&self, error: ClientError) {
        self.inner.state.lock().produce_faults.push_back(error);
    }

    pub fn fail_next_fetch(&self, error: ClientError) {
        self.inner.state.lock().fetch_faults.push_back(error);
    }

    /// Delay every acknowledgement by `delay`
    pub fn set_produce_delay(&self, delay: Option<Duration>) {
        self.inner.state.lock().produce_delay = delay;
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions ever opened
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        self.inner.state.lock().check_reachable()?;

        let n = self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);

        let session = MemorySession {
            id: format!("memory-session-{}", n),
            broker: self.clone(),
            closed: false,
        };
        debug!("Opened {}", session.id);
        Ok(Box::new(session))
    }
}

/// Session against a [`MemoryBroker`]
pub struct MemorySession {
    id: String,
    broker: MemoryBroker,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ClientError::session_closed(&self.id));
        }
        self.broker.inner.state.lock().check_reachable()
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
            debug!("Released {}", self.id);
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&mut self, topic: &str, partition: i32, message: &Message) -> Result<Delivery> {
        self.ensure_open()?;

        let delay = self.broker.inner.state.lock().produce_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let offset = {
            let mut state = self.broker.inner.state.lock();
            state.check_reachable()?;
            if let Some(fault) = state.produce_faults.pop_front() {
                return Err(fault);
            }
            let records = state.topic_mut(topic, partition)?;
            let offset = records.len() as i64;
            records.push(FetchedRecord {
                offset,
                key: message.key().map(|k| Bytes::copy_from_slice(k.as_bytes())),
                value: Some(message.payload().clone()),
            });
            offset
        };

        self.broker.inner.new_data.notify_waiters();
        Ok(Delivery { partition, offset })
    }

    async fn resolve_offset(&mut self, topic: &str, partition: i32, position: StartPosition) -> Result<i64> {
        self.ensure_open()?;

        let mut state = self.broker.inner.state.lock();
        let records = state.topic_mut(topic, partition)?;
        Ok(match position {
            StartPosition::Earliest => 0,
            StartPosition::Latest => records.len() as i64,
        })
    }

    async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_wait: Duration,
        max_bytes: i32,
    ) -> Result<Vec<FetchedRecord>> {
        let deadline = Instant::now() + max_wait;

        loop {
            // Register for wake-ups before looking, so a write in between is not missed
            let notified = self.broker.inner.new_data.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            {
                let mut state = self.broker.inner.state.lock();
                if let Some(fault) = state.fetch_faults.pop_front() {
                    return Err(fault);
                }

                let records = state.topic_mut(topic, partition)?;
                let start = offset.max(0) as usize;
                if start < records.len() {
                    let mut budget = max_bytes.max(1) as usize;
                    let mut batch = Vec::new();
                    for record in &records[start..] {
                        let size = record.value.as_ref().map_or(0, |v| v.len());
                        // Always hand out at least one record
                        if !batch.is_empty() && size > budget {
                            break;
                        }
                        budget = budget.saturating_sub(size);
                        batch.push(record.clone());
                    }
                    return Ok(batch);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}
