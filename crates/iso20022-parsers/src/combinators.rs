//! Pipeline combinators over entry sequences
//!
//! All combinators are single-pass, lazy, and cancellation-aware: an
//! upstream cancellation error passes straight through and ends the
//! sequence. Composition behaves as ordinary function composition, e.g.
//! `seq.skip(a).take(b).batch(c)`.

use std::future::Future;
use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use iso20022_core::error::{Error, Result};

use crate::streaming::EntrySequence;

impl<E: Send + 'static> EntrySequence<E> {
    /// Group entries into slices of at most `size`
    ///
    /// The final slice may be shorter. An upstream error ends the
    /// batched sequence; a partial batch in flight at that point is
    /// dropped.
    pub fn batch(self, size: usize) -> Result<EntrySequence<Vec<E>>> {
        if size == 0 {
            return Err(Error::invalid_argument("size", "batch size must be positive"));
        }

        let (mut inner, errors, cancel) = self.parts();
        let token = cancel.clone();
        let batched = try_stream! {
            let mut pending: Vec<E> = Vec::new();
            while let Some(item) = inner.next().await {
                if token.is_cancelled() {
                    Err(Error::Cancelled)?;
                }
                let entry = item?;
                pending.push(entry);
                if pending.len() == size {
                    yield std::mem::take(&mut pending);
                }
            }
            if !pending.is_empty() {
                yield pending;
            }
        };

        Ok(EntrySequence::new(batched.boxed(), errors, cancel))
    }

    /// Emit at most `count` entries, then end; ending drops (cancels)
    /// the upstream
    pub fn take(self, count: u64) -> EntrySequence<E> {
        let (mut inner, errors, cancel) = self.parts();
        let token = cancel.clone();
        let taken = try_stream! {
            if count > 0 {
                let mut emitted: u64 = 0;
                while let Some(item) = inner.next().await {
                    if token.is_cancelled() {
                        Err(Error::Cancelled)?;
                    }
                    let entry = item?;
                    yield entry;
                    emitted += 1;
                    if emitted >= count {
                        break;
                    }
                }
            }
        };

        EntrySequence::new(taken.boxed(), errors, cancel)
    }

    /// Discard the first `count` entries; `0` is the identity
    pub fn skip(self, count: u64) -> EntrySequence<E> {
        let (mut inner, errors, cancel) = self.parts();
        let token = cancel.clone();
        let skipped = try_stream! {
            let mut dropped: u64 = 0;
            while let Some(item) = inner.next().await {
                if token.is_cancelled() {
                    Err(Error::Cancelled)?;
                }
                let entry = item?;
                if dropped < count {
                    dropped += 1;
                    continue;
                }
                yield entry;
            }
        };

        EntrySequence::new(skipped.boxed(), errors, cancel)
    }

    /// Decouple producer and consumer through a bounded queue
    ///
    /// The upstream is driven by a background task and runs up to
    /// `capacity` entries ahead of the consumer, oldest-first. Must be
    /// called within a tokio runtime.
    pub fn buffer(self, capacity: usize) -> Result<EntrySequence<E>> {
        if capacity == 0 {
            return Err(Error::invalid_argument(
                "capacity",
                "buffer capacity must be positive",
            ));
        }

        let (mut inner, errors, cancel) = self.parts();
        let token = cancel.clone();
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<E>>(capacity);

        tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    let _ = tx.send(Err(Error::Cancelled)).await;
                    break;
                }
                match inner.next().await {
                    Some(item) => {
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() {
                            // Consumer dropped the sequence.
                            break;
                        }
                        if failed {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        Ok(EntrySequence::new(
            ReceiverStream::new(rx).boxed(),
            errors,
            cancel,
        ))
    }

    /// Run `f` over up to `max_parallelism` entries concurrently
    ///
    /// Delivery order is unordered for throughput; callers who need
    /// document order must serialize downstream. A failure in any worker
    /// ends the sequence, which drops (cancels) the remaining workers.
    pub fn parallel_map<U, F, Fut>(
        self,
        f: F,
        max_parallelism: usize,
    ) -> Result<EntrySequence<U>>
    where
        U: Send + 'static,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        if max_parallelism == 0 {
            return Err(Error::invalid_argument(
                "max_parallelism",
                "parallelism must be positive",
            ));
        }

        let (inner, errors, cancel) = self.parts();
        let token = cancel.clone();
        let f = Arc::new(f);

        let mut workers = inner
            .map(move |item| {
                let f = Arc::clone(&f);
                async move {
                    match item {
                        Ok(entry) => f(entry).await,
                        Err(err) => Err(err),
                    }
                }
            })
            .buffer_unordered(max_parallelism);

        let mapped = try_stream! {
            while let Some(item) = workers.next().await {
                if token.is_cancelled() {
                    Err(Error::Cancelled)?;
                }
                let value = item?;
                yield value;
            }
        };

        Ok(EntrySequence::new(mapped.boxed(), errors, cancel))
    }
}
