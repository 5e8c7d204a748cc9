// SPDX-License-Identifier: Apache-2.0

use amiquip::{
    Channel, Connection, ConsumerMessage, ConsumerOptions, ExchangeDeclareOptions, ExchangeType,
    FieldTable, QueueDeclareOptions,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Exchange and queue name for request notifications.
pub const REQUEST_EXCHANGE: &str = "requests";
pub const REQUEST_QUEUE: &str = "requests";
pub const REQUEST_ROUTING_KEY: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("broker closed the consumer: {0}")]
    Closed(String),
    #[error("broker operation failed: {0}")]
    Operation(String),
}

/// One message taken off the queue. `tag` is only meaningful to the
/// [`MessageSource`] that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// An open consumer on the request queue.
pub trait MessageSource {
    /// Waits up to `wait` for the next message.
    fn next_delivery(&mut self, wait: Duration) -> Result<Option<Delivery>, BrokerError>;
    fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;
}

pub type Session<'a> = dyn FnMut(&mut dyn MessageSource) -> Result<(), BrokerError> + 'a;

/// Opens one broker connection per `consume` call and runs `session` on
/// it. The connection is closed when the session returns.
pub trait BrokerConnector: Send + Sync {
    fn consume(&self, session: &mut Session<'_>) -> Result<(), BrokerError>;
}

/// AMQP 0-9-1 connector.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    url: String,
    prefetch: u16,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefetch: 1,
        }
    }
}

fn operation(err: amiquip::Error) -> BrokerError {
    BrokerError::Operation(err.to_string())
}

struct AmqpSource<'a> {
    channel: &'a Channel,
    consumer: &'a amiquip::Consumer<'a>,
    next_tag: u64,
    unacked: HashMap<u64, amiquip::Delivery>,
}

impl MessageSource for AmqpSource<'_> {
    fn next_delivery(&mut self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        let message = match self.consumer.receiver().recv_timeout(wait) {
            Ok(message) => message,
            Err(err) if err.is_timeout() => return Ok(None),
            Err(_) => {
                return Err(BrokerError::Closed(
                    "consumer channel disconnected".to_string(),
                ))
            }
        };
        match message {
            ConsumerMessage::Delivery(delivery) => {
                self.next_tag += 1;
                let out = Delivery {
                    tag: self.next_tag,
                    body: delivery.body.clone(),
                    redelivered: delivery.redelivered,
                };
                self.unacked.insert(self.next_tag, delivery);
                Ok(Some(out))
            }
            _ => Err(BrokerError::Closed(
                "consumer cancelled or channel closed".to_string(),
            )),
        }
    }

    fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        let delivery = self
            .unacked
            .remove(&tag)
            .ok_or_else(|| BrokerError::Operation(format!("unknown delivery tag {tag}")))?;
        delivery.ack(self.channel).map_err(operation)
    }
}

impl BrokerConnector for AmqpConnector {
    fn consume(&self, session: &mut Session<'_>) -> Result<(), BrokerError> {
        let mut connection = Connection::insecure_open(&self.url)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection.open_channel(None).map_err(operation)?;
        let exchange = channel
            .exchange_declare(
                ExchangeType::Fanout,
                REQUEST_EXCHANGE,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
            )
            .map_err(operation)?;
        let queue = channel
            .queue_declare(
                REQUEST_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
            )
            .map_err(operation)?;
        queue
            .bind(&exchange, REQUEST_ROUTING_KEY, FieldTable::default())
            .map_err(operation)?;
        channel.qos(0, self.prefetch, false).map_err(operation)?;
        let consumer = queue
            .consume(ConsumerOptions {
                no_ack: false,
                ..ConsumerOptions::default()
            })
            .map_err(operation)?;
        info!(queue = REQUEST_QUEUE, "consuming request notifications");

        let outcome = {
            let mut source = AmqpSource {
                channel: &channel,
                consumer: &consumer,
                next_tag: 0,
                unacked: HashMap::new(),
            };
            session(&mut source)
        };
        drop(consumer);
        if let Err(err) = connection.close() {
            debug!(error = %err, "broker connection did not close cleanly");
        }
        outcome
    }
}

#[derive(Debug)]
struct Queued {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct InMemoryState {
    sender: Sender<Queued>,
    receiver: Receiver<Queued>,
    acked: Mutex<Vec<Vec<u8>>>,
    connections: AtomicUsize,
    refuse_connections: AtomicUsize,
    next_tag: AtomicU64,
}

/// In-process queue shared by any number of consumers. Deliveries left
/// unacknowledged when a session ends are requeued as redelivered.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<InMemoryState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            state: Arc::new(InMemoryState {
                sender,
                receiver,
                acked: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
                refuse_connections: AtomicUsize::new(0),
                next_tag: AtomicU64::new(0),
            }),
        }
    }
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, body: Vec<u8>) {
        let _ = self.state.sender.send(Queued {
            body,
            redelivered: false,
        });
    }

    /// Messages waiting for a consumer.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.receiver.len()
    }

    /// Bodies of acknowledged deliveries, in acknowledgement order.
    #[must_use]
    pub fn acked(&self) -> Vec<Vec<u8>> {
        self.state
            .acked
            .lock()
            .map(|acked| acked.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn acked_count(&self) -> usize {
        self.state.acked.lock().map(|acked| acked.len()).unwrap_or(0)
    }

    /// Successful `consume` calls so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Makes the next `count` connection attempts fail.
    pub fn refuse_next_connections(&self, count: usize) {
        self.state.refuse_connections.store(count, Ordering::SeqCst);
    }
}

struct InMemorySource<'a> {
    state: &'a InMemoryState,
    unacked: HashMap<u64, Vec<u8>>,
}

impl MessageSource for InMemorySource<'_> {
    fn next_delivery(&mut self, wait: Duration) -> Result<Option<Delivery>, BrokerError> {
        match self.state.receiver.recv_timeout(wait) {
            Ok(queued) => {
                let tag = self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
                self.unacked.insert(tag, queued.body.clone());
                Ok(Some(Delivery {
                    tag,
                    body: queued.body,
                    redelivered: queued.redelivered,
                }))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BrokerError::Closed("in-memory queue disconnected".to_string()))
            }
        }
    }

    fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        let body = self
            .unacked
            .remove(&tag)
            .ok_or_else(|| BrokerError::Operation(format!("unknown delivery tag {tag}")))?;
        self.state
            .acked
            .lock()
            .map_err(|_| BrokerError::Operation("ack log poisoned".to_string()))?
            .push(body);
        Ok(())
    }
}

impl Drop for InMemorySource<'_> {
    fn drop(&mut self) {
        for (_, body) in self.unacked.drain() {
            let _ = self.state.sender.send(Queued {
                body,
                redelivered: true,
            });
        }
    }
}

impl BrokerConnector for InMemoryBroker {
    fn consume(&self, session: &mut Session<'_>) -> Result<(), BrokerError> {
        let refused = self
            .state
            .refuse_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BrokerError::Connection("connection refused".to_string()));
        }
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        let mut source = InMemorySource {
            state: &self.state,
            unacked: HashMap::new(),
        };
        session(&mut source)
    }
}
