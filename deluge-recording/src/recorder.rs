use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Aggregate state owned by a [`Recorder`]'s consumer task.
pub trait Aggregator: Send + 'static {
    type Entry: Send + 'static;
    type Snapshot: Send + 'static;

    fn apply(&mut self, entry: Self::Entry);

    /// Deep, independent copy of the current state.
    fn snapshot(&self) -> Self::Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RecorderState {
    Ready,
    Recording,
    Terminating,
    Terminated,
}

type SnapshotRequest<A> = oneshot::Sender<<A as Aggregator>::Snapshot>;

enum Inner<A: Aggregator> {
    Ready(A),
    Recording {
        entries: mpsc::Sender<A::Entry>,
        snapshots: mpsc::Sender<SnapshotRequest<A>>,
        consumer: JoinHandle<A>,
    },
    Terminating,
    Terminated(A),
}

impl<A: Aggregator> Inner<A> {
    fn state(&self) -> RecorderState {
        match self {
            Self::Ready(_) => RecorderState::Ready,
            Self::Recording { .. } => RecorderState::Recording,
            Self::Terminating => RecorderState::Terminating,
            Self::Terminated(_) => RecorderState::Terminated,
        }
    }
}

/// Single-consumer asynchronous aggregator.
///
/// Producers hand entries over a bounded channel; one task owns the aggregate and
/// applies entries and snapshot requests in arrival order. `record` never waits on
/// that task: when the channel is full the send is moved to its own task, which
/// keeps a sender alive so `close` still drains it before the consumer exits.
pub struct Recorder<A: Aggregator> {
    capacity: usize,
    inner: Mutex<Inner<A>>,
}

impl<A: Aggregator> Recorder<A> {
    pub fn new(aggregator: A, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::Ready(aggregator)),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state()
    }

    /// Spawns the consumer task. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let aggregator = match std::mem::replace(&mut *inner, Inner::Terminating) {
            Inner::Ready(aggregator) => aggregator,
            other => {
                let state = other.state();
                *inner = other;
                return Err(Error::InvalidState { op: "start", state });
            }
        };

        let (entries, entries_rx) = mpsc::channel(self.capacity);
        let (snapshots, snapshots_rx) = mpsc::channel(1);
        let consumer = tokio::spawn(consume(aggregator, entries_rx, snapshots_rx));

        *inner = Inner::Recording {
            entries,
            snapshots,
            consumer,
        };
        Ok(())
    }

    pub fn record(&self, entry: A::Entry) -> Result<()> {
        let sender = {
            let inner = self.inner.lock();
            match &*inner {
                Inner::Recording { entries, .. } => entries.clone(),
                other => {
                    return Err(Error::InvalidState {
                        op: "record",
                        state: other.state(),
                    });
                }
            }
        };

        match sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tokio::spawn(async move {
                    if sender.send(entry).await.is_err() {
                        tracing::error!("recorder consumer exited before a pending entry");
                    }
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Closed),
        }
    }

    /// Current aggregate, taken between two applied entries.
    pub async fn snapshot(&self) -> Result<A::Snapshot> {
        let requests = {
            let inner = self.inner.lock();
            match &*inner {
                Inner::Recording { snapshots, .. } => snapshots.clone(),
                other => {
                    return Err(Error::InvalidState {
                        op: "snapshot",
                        state: other.state(),
                    });
                }
            }
        };

        let (tx, rx) = oneshot::channel();
        requests.send(tx).await.map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Waits until every accepted entry is applied and the consumer has exited.
    ///
    /// Closing a recorder that never started terminates it with its initial state;
    /// closing a terminated recorder is a no-op.
    pub async fn close(&self) -> Result<()> {
        let consumer = {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut *inner, Inner::Terminating) {
                Inner::Recording { consumer, .. } => consumer,
                Inner::Ready(aggregator) => {
                    *inner = Inner::Terminated(aggregator);
                    return Ok(());
                }
                Inner::Terminated(aggregator) => {
                    *inner = Inner::Terminated(aggregator);
                    return Ok(());
                }
                Inner::Terminating => {
                    return Err(Error::InvalidState {
                        op: "close",
                        state: RecorderState::Terminating,
                    });
                }
            }
        };

        let aggregator = consumer.await?;
        *self.inner.lock() = Inner::Terminated(aggregator);
        Ok(())
    }

    pub fn final_records(&self) -> Result<A::Snapshot> {
        let inner = self.inner.lock();
        match &*inner {
            Inner::Terminated(aggregator) => Ok(aggregator.snapshot()),
            other => Err(Error::NotReady {
                state: other.state(),
            }),
        }
    }
}

async fn consume<A: Aggregator>(
    mut aggregator: A,
    mut entries: mpsc::Receiver<A::Entry>,
    mut snapshots: mpsc::Receiver<SnapshotRequest<A>>,
) -> A {
    loop {
        tokio::select! {
            entry = entries.recv() => match entry {
                Some(entry) => aggregator.apply(entry),
                None => break,
            },
            Some(reply) = snapshots.recv() => {
                let _ = reply.send(aggregator.snapshot());
            }
        }
    }
    aggregator
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Sum {
        count: u64,
        total: u64,
    }

    impl Aggregator for Sum {
        type Entry = u64;
        type Snapshot = (u64, u64);

        fn apply(&mut self, entry: u64) {
            self.count += 1;
            self.total += entry;
        }

        fn snapshot(&self) -> (u64, u64) {
            (self.count, self.total)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_lose_nothing() -> Result<()> {
        let recorder = Arc::new(Recorder::new(Sum::default(), 4));
        recorder.start()?;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let recorder = recorder.clone();
            tasks.push(tokio::spawn(async move {
                for v in 0..500_u64 {
                    recorder.record(v).unwrap();
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        recorder.close().await?;
        let (count, total) = recorder.final_records()?;
        assert_eq!(count, 8 * 500);
        assert_eq!(total, 8 * (499 * 500 / 2));
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_only_while_recording() -> Result<()> {
        let recorder = Recorder::new(Sum::default(), 2);
        assert!(matches!(
            recorder.snapshot().await,
            Err(Error::InvalidState {
                state: RecorderState::Ready,
                ..
            })
        ));

        recorder.start()?;
        recorder.record(3)?;
        recorder.record(4)?;
        let (count, _) = recorder.snapshot().await?;
        assert!(count <= 2);

        recorder.close().await?;
        assert!(matches!(
            recorder.snapshot().await,
            Err(Error::InvalidState {
                state: RecorderState::Terminated,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn final_records_are_not_ready_before_close() -> Result<()> {
        let recorder = Recorder::new(Sum::default(), 1);
        recorder.start()?;
        recorder.record(1)?;
        assert!(matches!(
            recorder.final_records(),
            Err(Error::NotReady {
                state: RecorderState::Recording
            })
        ));

        recorder.close().await?;
        assert_eq!(recorder.final_records()?, (1, 1));
        assert_eq!(recorder.state(), RecorderState::Terminated);
        Ok(())
    }

    #[tokio::test]
    async fn record_after_close_is_rejected() -> Result<()> {
        let recorder = Recorder::new(Sum::default(), 1);
        recorder.start()?;
        recorder.close().await?;
        recorder.close().await?;

        let err = recorder.record(1).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                op: "record",
                state: RecorderState::Terminated
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() -> Result<()> {
        let recorder = Recorder::new(Sum::default(), 1);
        recorder.start()?;
        assert!(recorder.start().is_err());
        assert_eq!(recorder.state(), RecorderState::Recording);
        recorder.close().await
    }
}
