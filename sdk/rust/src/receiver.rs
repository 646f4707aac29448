use crate::{
    config::ReceiverConfig,
    error::{ClientError, ErrorKind, Result},
    message::{FetchedRecord, ReceivedMessage},
    session::{Connector, Session},
};
use chrono::Utc;
use futures::Stream;
use std::collections::VecDeque;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a receiver
///
/// `Created -> Subscribed -> {Draining <-> IdleWait} -> Closed`. `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Created,
    Subscribed,
    /// Handing out buffered messages
    Draining,
    /// Blocked on the broker, with the idle countdown running
    IdleWait,
    Closed,
}

/// Why a receiver reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    IdleTimeout,
    MaxMessages,
    Cancelled,
    ClosedByCaller,
    Failed(ErrorKind),
}

/// Timeout-bounded subscription to one topic partition
///
/// Each call to [`Receiver::next`] hands out one message, waiting for the
/// broker at most until the idle deadline. The sequence ends with `None`
/// when the idle timeout expires, `max_messages` is reached or the
/// cancellation token fires. A failure is yielded once as `Some(Err(_))` and
/// the sequence ends after it. The session is closed whenever the receiver
/// closes. A receiver cannot be rewound; build a new one on a fresh session
/// to read again.
pub struct Receiver {
    session: Box<dyn Session>,
    topic: String,
    config: ReceiverConfig,
    cancel: CancellationToken,
    state: ReceiverState,
    close_reason: Option<CloseReason>,
    next_offset: i64,
    buffer: VecDeque<FetchedRecord>,
    received: usize,
    idle_deadline: Option<Instant>,
}

impl Receiver {
    pub fn new<T: Into<String>>(session: Box<dyn Session>, topic: T, config: ReceiverConfig) -> Self {
        Self {
            session,
            topic: topic.into(),
            config,
            cancel: CancellationToken::new(),
            state: ReceiverState::Created,
            close_reason: None,
            next_offset: 0,
            buffer: VecDeque::new(),
            received: 0,
            idle_deadline: None,
        }
    }

    /// Open a fresh session from `connector` for this receiver
    pub async fn connect<T: Into<String>>(
        connector: &dyn Connector,
        topic: T,
        config: ReceiverConfig,
    ) -> Result<Self> {
        let session = connector.connect().await?;
        Ok(Self::new(session, topic, config))
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages handed out so far
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_session_released(&self) -> bool {
        self.session.is_closed()
    }

    /// Pull the next message
    pub async fn next(&mut self) -> Option<Result<ReceivedMessage>> {
        loop {
            if self.state == ReceiverState::Closed {
                return None;
            }

            if self.cancel.is_cancelled() {
                self.shutdown(CloseReason::Cancelled).await;
                return None;
            }

            if self.state == ReceiverState::Created {
                match self.subscribe().await {
                    Ok(()) => {}
                    Err(ClientError::Cancelled) => {
                        self.shutdown(CloseReason::Cancelled).await;
                        return None;
                    }
                    Err(e) => return Some(Err(self.fail(e).await)),
                }
            }

            if self.limit_reached() {
                self.shutdown(CloseReason::MaxMessages).await;
                return None;
            }

            if let Some(record) = self.buffer.pop_front() {
                self.state = ReceiverState::Draining;
                return match self.decode(record) {
                    Ok(message) => {
                        self.received += 1;
                        self.idle_deadline = Some(Instant::now() + self.config.idle_timeout);
                        if self.limit_reached() {
                            self.shutdown(CloseReason::MaxMessages).await;
                        }
                        Some(Ok(message))
                    }
                    Err(e) => Some(Err(self.fail(e).await)),
                };
            }

            self.state = ReceiverState::IdleWait;
            match self.wait_for_records().await {
                Ok(true) => continue,
                Ok(false) => {
                    self.shutdown(CloseReason::IdleTimeout).await;
                    return None;
                }
                Err(ClientError::Cancelled) => {
                    self.shutdown(CloseReason::Cancelled).await;
                    return None;
                }
                Err(e) => return Some(Err(self.fail(e).await)),
            }
        }
    }

    /// Turn the receiver into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<ReceivedMessage>> {
        futures::stream::unfold(self, |mut receiver| async move {
            receiver.next().await.map(|item| (item, receiver))
        })
    }

    /// Pull until the sequence ends. Returns every message received and the
    /// terminal error, if the sequence ended with one.
    pub async fn collect_all(&mut self) -> (Vec<ReceivedMessage>, Option<ClientError>) {
        let mut messages = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(message) => messages.push(message),
                Err(e) => return (messages, Some(e)),
            }
        }
        (messages, None)
    }

    /// Stop receiving and release the session
    pub async fn close(&mut self) {
        self.shutdown(CloseReason::ClosedByCaller).await;
    }

    async fn subscribe(&mut self) -> Result<()> {
        self.config.validate()?;
        if self.topic.is_empty() {
            return Err(ClientError::BrokerRejected("topic name must not be empty".to_string()));
        }

        let position = self.config.start_position();
        let bound = self.config.idle_timeout;
        let resolve = self.session.resolve_offset(&self.topic, self.config.partition, position);

        let offset = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            resolved = timeout(bound, resolve) => match resolved {
                Ok(offset) => offset?,
                Err(_) => return Err(ClientError::timeout(bound)),
            },
        };

        self.next_offset = offset;
        self.idle_deadline = Some(Instant::now() + self.config.idle_timeout);
        self.state = ReceiverState::Subscribed;

        info!(
            "Subscribed to {}/{} at offset {} ({:?}) on session {}",
            self.topic,
            self.config.partition,
            offset,
            position,
            self.session.id()
        );
        Ok(())
    }

    /// Wait for the next batch. `Ok(false)` means the idle deadline passed.
    async fn wait_for_records(&mut self) -> Result<bool> {
        let deadline = self
            .idle_deadline
            .unwrap_or_else(|| Instant::now() + self.config.idle_timeout);

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let max_wait = (deadline - now).min(self.config.max_wait);

            let fetch = self.session.fetch(
                &self.topic,
                self.config.partition,
                self.next_offset,
                max_wait,
                self.config.fetch_max_bytes,
            );

            let records = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                fetched = timeout_at(deadline, fetch) => match fetched {
                    Ok(records) => records?,
                    Err(_) => return Ok(false),
                },
            };

            if let Some(last) = records.last() {
                self.next_offset = last.offset + 1;
                debug!(
                    "Buffered {} record(s) from {}, next offset {}",
                    records.len(),
                    self.topic,
                    self.next_offset
                );
                self.buffer.extend(records);
                return Ok(true);
            }
        }
    }

    fn decode(&self, record: FetchedRecord) -> Result<ReceivedMessage> {
        let payload = record.value.ok_or_else(|| ClientError::MalformedMessage {
            offset: record.offset,
            reason: "record has no value".to_string(),
        })?;

        if self.config.require_utf8 && std::str::from_utf8(&payload).is_err() {
            return Err(ClientError::MalformedMessage {
                offset: record.offset,
                reason: "payload is not valid UTF-8".to_string(),
            });
        }

        Ok(ReceivedMessage {
            payload,
            topic: self.topic.clone(),
            partition: self.config.partition,
            offset: record.offset,
            key: record.key,
            received_at: Utc::now(),
        })
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_messages
            .map_or(false, |max| self.received >= max)
    }

    async fn fail(&mut self, error: ClientError) -> ClientError {
        error!(
            "Receiver on '{}' stopped after {} message(s) [{}]: {}",
            self.topic,
            self.received,
            error.kind(),
            error
        );
        self.shutdown(CloseReason::Failed(error.kind())).await;
        error
    }

    async fn shutdown(&mut self, reason: CloseReason) {
        if self.state == ReceiverState::Closed {
            return;
        }
        self.state = ReceiverState::Closed;
        self.close_reason = Some(reason);
        self.buffer.clear();

        if let Err(e) = self.session.close().await {
            warn!("Failed to close session {}: {}", self.session.id(), e);
        }
        info!(
            "Receiver on '{}' closed ({:?}) after {} message(s)",
            self.topic, reason, self.received
        );
    }
}

/// Build a receiver on `session` and return its message sequence
pub fn receive<T: Into<String>>(
    session: Box<dyn Session>,
    topic: T,
    config: ReceiverConfig,
) -> impl Stream<Item = Result<ReceivedMessage>> {
    Receiver::new(session, topic, config).into_stream()
}
