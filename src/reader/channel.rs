// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background record producer feeding a bounded channel.
//!
//! A spawned task drives a [`ResultStream`] and sends each record, paired
//! with the compressed byte count at the time it was decoded, through a
//! bounded `mpsc` channel. The channel capacity is the backpressure: the
//! producer stops pulling fragments while the consumer is behind.
//!
//! The producer exits when:
//! - the stream ends (channel closes, `recv` returns `None`)
//! - the stream fails (the error is sent as the last item)
//! - the receiver is cancelled or dropped

use crate::error::{Error, Result};
use crate::reader::source::FragmentSource;
use crate::reader::stream::ResultStream;
use crate::types::{ProgressRecord, Record};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Receiving end of a record channel.
///
/// Dropping the receiver cancels the producer.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<Result<ProgressRecord>>,
    cancel_token: CancellationToken,
    producer: Option<JoinHandle<ProducerExit>>,
}

/// Why a producer task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProducerExit {
    /// The stream ended and every record was sent.
    Finished,
    /// The stream failed and the error was sent.
    Failed,
    Cancelled,
    ReceiverDropped,
}

impl RecordReceiver {
    /// Next record with its progress count, `Some(Err(_))` if the stream
    /// failed, or `None` once the producer has finished.
    pub async fn recv(&mut self) -> Option<Result<ProgressRecord>> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv). Must not be called from
    /// within an async context.
    pub fn blocking_recv(&mut self) -> Option<Result<ProgressRecord>> {
        self.rx.blocking_recv()
    }

    /// Stop the producer. Records already buffered can still be received.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Cancel and wait for the producer task to exit.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        let _ = self.producer_exit().await;
    }

    /// Wait for the producer task and report why it stopped. `None` if it
    /// was already awaited.
    async fn producer_exit(&mut self) -> Result<Option<ProducerExit>> {
        let Some(producer) = self.producer.take() else {
            return Ok(None);
        };
        producer
            .await
            .map(Some)
            .map_err(|e| Error::Transport(format!("Record producer task failed: {}", e)))
    }
}

impl Drop for RecordReceiver {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Spawn a producer for `stream` on `handle` and return the receiver.
///
/// `capacity` is clamped to at least 1.
pub fn spawn_record_channel<S>(
    stream: ResultStream<S>,
    capacity: usize,
    handle: &Handle,
) -> RecordReceiver
where
    S: FragmentSource + 'static,
{
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel::<Result<ProgressRecord>>(capacity);
    let cancel_token = CancellationToken::new();

    debug!("Spawning record producer with capacity={}", capacity);

    let producer = handle.spawn(producer_task(stream, tx, cancel_token.clone()));

    RecordReceiver {
        rx,
        cancel_token,
        producer: Some(producer),
    }
}

async fn producer_task<S: FragmentSource>(
    mut stream: ResultStream<S>,
    tx: mpsc::Sender<Result<ProgressRecord>>,
    cancel_token: CancellationToken,
) -> ProducerExit {
    let mut sent: u64 = 0;

    loop {
        if cancel_token.is_cancelled() {
            debug!("Record producer cancelled after {} records", sent);
            return ProducerExit::Cancelled;
        }

        let next = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Record producer cancelled after {} records", sent);
                return ProducerExit::Cancelled;
            }
            next = stream.next_record_with_progress() => next,
        };

        let item = match next {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                debug!("Record producer finished: {} records", sent);
                return ProducerExit::Finished;
            }
            Err(e) => Err(e),
        };
        let failed = item.is_err();

        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Record producer cancelled after {} records", sent);
                return ProducerExit::Cancelled;
            }
            res = tx.send(item) => {
                if res.is_err() {
                    trace!("Record receiver dropped, stopping producer");
                    return ProducerExit::ReceiverDropped;
                }
            }
        }

        if failed {
            return ProducerExit::Failed;
        }
        sent += 1;
    }
}

/// Drain a receiver into memory, stopping at the first error.
///
/// Fails with [`Error::Cancelled`] only if the producer stopped because of
/// cancellation; a cancel that arrives after the last record was sent does
/// not discard the result.
pub async fn collect_channel(mut receiver: RecordReceiver) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(item) = receiver.recv().await {
        records.push(item?.record);
    }
    match receiver.producer_exit().await? {
        Some(ProducerExit::Cancelled) => Err(Error::Cancelled),
        _ => Ok(records),
    }
}
