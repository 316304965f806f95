// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Subjects are broadcast primitives which accept sent elements and a final
//! termination signal, fanning both out to every subscribed consumer.
//!
//! A subject is the write side. Each call to [Subject::subscribe] produces an
//! independent, pull-based [SubjectReceiver] which observes every element
//! sent after the subscription was registered, in send order, followed by the
//! subject's termination. Consumers which no longer care simply drop their
//! receiver; the subject forgets them.
//!
//! The only implementation provided is the [passthrough::PassthroughSubject]:
//! no replay and no current-value semantics, so a subscriber sees exactly
//! the elements sent while it is live.

use std::fmt;

pub mod passthrough;

// Re-exports
pub use passthrough::PassthroughReceiver;
pub use passthrough::PassthroughSubject;

/// How a subject's stream of elements ends: either cleanly, or carrying the
/// failure value supplied by the terminating producer.
///
/// A subject stores the first termination it is given and ignores every later
/// one, so all subscribers (including late ones) observe the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination<F> {
    /// The subject completed cleanly; each subscriber sees its sequence end
    /// once its buffer drains.
    Finished,
    /// The subject failed; each subscriber receives the failure after
    /// draining its buffered elements.
    Failure(F),
}

impl<F> fmt::Display for Termination<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Failure(_) => write!(f, "failure"),
        }
    }
}

/// The capability contract of a broadcast subject: many producers may send
/// elements and eventually one termination, and many consumers may subscribe
/// for their own pull-based view of the traffic.
///
/// The suspending operations acquire the subject's internal lock and may
/// suspend the calling task while doing so. The `_nonblocking` variants never
/// present a suspension point to the caller: their critical section is
/// serialized on the subject's own execution context instead, so delivery
/// atomicity and global send order are preserved either way.
#[async_trait::async_trait]
pub trait Subject: Send + Sync {
    /// The element type fanned out to subscribers. Cloned once per live
    /// subscription on every send.
    type Element: Clone + Send;
    /// The failure type carried by [Termination::Failure].
    type Failure: Clone + Send;
    /// The pull handle returned by [Subject::subscribe].
    type Receiver: SubjectReceiver<Element = Self::Element, Failure = Self::Failure>;

    /// Send an element to every live subscription. A no-op once the subject
    /// is terminated.
    async fn send(&self, element: Self::Element);

    /// Same delivery semantics as [Subject::send], without suspending the
    /// caller.
    fn send_nonblocking(&self, element: Self::Element);

    /// Terminate the subject. The first termination wins; later calls of
    /// either kind are ignored.
    async fn terminate(&self, termination: Termination<Self::Failure>);

    /// Same as [Subject::terminate], without suspending the caller.
    fn terminate_nonblocking(&self, termination: Termination<Self::Failure>);

    /// Register a new subscription and return its pull handle. Elements sent
    /// before this call completes are never replayed to the new subscriber.
    async fn subscribe(&self) -> Self::Receiver;
}

/// The pull side of one subscription to a [Subject].
#[async_trait::async_trait]
pub trait SubjectReceiver: Send {
    /// The element type pulled from the subject.
    type Element: Send;
    /// The failure type surfaced when the subject terminates with
    /// [Termination::Failure].
    type Failure: Send;

    /// Pull the next element.
    ///
    /// Returns `Ok(Some(element))` while elements are available, suspending
    /// the caller whenever the buffer is empty and the subject is not yet
    /// terminated. Once the buffer drains, a [Termination::Finished] yields
    /// `Ok(None)` and a [Termination::Failure] yields `Err` exactly once;
    /// every call after that returns `Ok(None)`.
    async fn recv(&mut self) -> Result<Option<Self::Element>, Self::Failure>;

    /// Whether this subscription currently holds undelivered elements.
    /// Advisory only: the answer may be stale as soon as it is produced.
    fn has_buffered_elements(&self) -> bool;
}

/// Iteration glue over [SubjectReceiver]: consume a subscription by applying
/// a callback to each element.
#[async_trait::async_trait]
pub trait SubjectReceiverExt: SubjectReceiver {
    /// Drain the subscription, applying `op` to every element, until the
    /// subject terminates. A clean termination resolves to `Ok(())`; a
    /// failure termination is propagated once the buffer has drained.
    ///
    /// ```rust
    /// use async_subjects::subject::{PassthroughSubject, SubjectReceiverExt, Termination};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let subject = PassthroughSubject::<u32, ()>::new();
    /// let mut subscription = subject.subscribe().await;
    ///
    /// subject.send(1).await;
    /// subject.send(2).await;
    /// subject.terminate(Termination::Finished).await;
    ///
    /// let mut seen = vec![];
    /// subscription.for_each(|element| seen.push(element)).await.unwrap();
    /// assert_eq!(seen, vec![1, 2]);
    /// # }
    /// ```
    async fn for_each<Op>(&mut self, op: Op) -> Result<(), Self::Failure>
    where
        Op: FnMut(Self::Element) + Send;
}

#[async_trait::async_trait]
impl<R> SubjectReceiverExt for R
where
    R: SubjectReceiver,
{
    async fn for_each<Op>(&mut self, mut op: Op) -> Result<(), Self::Failure>
    where
        Op: FnMut(Self::Element) + Send,
    {
        while let Some(element) = self.recv().await? {
            op(element);
        }
        Ok(())
    }
}
