// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! ## The passthrough subject
//!
//! [PassthroughSubject] fans every sent element out to the subscriptions
//! which are live at the moment the send's critical section runs. There is
//! no replay: a subscriber only ever observes elements sent after its own
//! registration.
//!
//! Every subscription owns an unbounded FIFO buffer inside the subject, so a
//! slow consumer never blocks producers or its sibling consumers, it only
//! grows its own buffer. A termination signal, clean or failing, is stamped
//! onto every subscription and surfaced to each consumer after that
//! consumer's buffer has drained.
//!
//! All shared state sits behind a single suspend-aware lock. A consumer
//! which finds its buffer empty parks on a one-shot wake handle *outside*
//! that lock, so cancelling the consuming task (dropping its `recv` future,
//! or the whole receiver) can never strand the subject's lock or wedge the
//! other subscriptions.
//!
//! ```rust
//! use async_subjects::subject::{PassthroughSubject, Termination};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let subject = PassthroughSubject::<u32, ()>::new();
//! let mut subscription = subject.subscribe().await;
//!
//! subject.send(1).await;
//! subject.terminate(Termination::Finished).await;
//!
//! assert_eq!(subscription.recv().await, Ok(Some(1)));
//! assert_eq!(subscription.recv().await, Ok(None));
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

use super::{Subject, SubjectReceiver, Termination};


/// Operations deferred onto the subject's own execution context: the
/// non-suspending send/terminate variants and drop-time deregistrations.
enum Op<T, F> {
    Send(T),
    Terminate(Termination<F>),
    Deregister(u64),
}

/// Per-subscription state, exclusively owned by the subject while the
/// subscription is live.
struct Registration<T, F> {
    /// Undelivered elements, in send order.
    buffer: VecDeque<T>,
    /// Stamped at most once, by the first termination the subject accepts.
    termination: Option<Termination<F>>,
    /// At most one pending "wake me" request from a parked receiver.
    waiter: Option<oneshot::Sender<()>>,
    /// Mirror of `buffer.len()`, readable without the lock.
    buffered: Arc<AtomicUsize>,
}

impl<T, F> Registration<T, F> {
    fn push(&mut self, element: T) {
        self.buffer.push_back(element);
        self.buffered.store(self.buffer.len(), Ordering::Release);
        self.wake();
    }

    fn terminate(&mut self, termination: Termination<F>) {
        if self.termination.is_none() {
            self.termination = Some(termination);
        }
        self.wake();
    }

    fn wake(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            // the receiver may have abandoned the wait in the meantime
            let _ = waiter.send(());
        }
    }
}

/// All mutable subject state, guarded by the one lock in [Shared].
struct SubjectState<T, F> {
    registrations: HashMap<u64, Registration<T, F>>,
    termination: Option<Termination<F>>,
    next_registration: u64,
}

impl<T, F> SubjectState<T, F>
where
    T: Clone,
    F: Clone,
{
    fn deliver(&mut self, element: T) {
        if self.termination.is_some() {
            // sends after termination vanish silently
            return;
        }
        tracing::trace!(
            "Delivering element to {} subscriptions",
            self.registrations.len()
        );
        for registration in self.registrations.values_mut() {
            registration.push(element.clone());
        }
    }

    fn terminate_all(&mut self, termination: Termination<F>) {
        if self.termination.is_some() {
            // first termination wins
            return;
        }
        tracing::debug!("Subject terminated ({termination})");
        self.termination = Some(termination.clone());
        for registration in self.registrations.values_mut() {
            registration.terminate(termination.clone());
        }
    }
}

struct Shared<T, F> {
    /// The single lock serializing every mutation of the subject.
    state: Mutex<SubjectState<T, F>>,
    /// Feed for the dispatch task applying deferred operations.
    ops: mpsc::UnboundedSender<Op<T, F>>,
    /// Advisory mirror of the registration count.
    subscribers: AtomicUsize,
}

/// A broadcast subject with passthrough semantics: elements are multicast to
/// the subscriptions live at send time, and a single termination signal ends
/// every subscription once its buffer drains.
///
/// The subject is a cheap handle over shared state; clone it freely to hand
/// it to producer tasks.
pub struct PassthroughSubject<T, F> {
    shared: Arc<Shared<T, F>>,
}

impl<T, F> Clone for PassthroughSubject<T, F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, F> Default for PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, F> PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    /// Create a new subject with no subscriptions and no termination.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime: the subject spawns its
    /// internal dispatch task on creation.
    pub fn new() -> Self {
        let (ops, queue) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(SubjectState {
                registrations: HashMap::new(),
                termination: None,
                next_registration: 0,
            }),
            ops,
            subscribers: AtomicUsize::new(0),
        });
        tokio::spawn(dispatch(Arc::downgrade(&shared), queue));
        Self { shared }
    }

    /// Register a new subscription and return its pull handle.
    ///
    /// The new subscription observes every element sent after this call's
    /// critical section and nothing sent before it. If the subject already
    /// terminated, the handle yields an empty, immediately terminated
    /// sequence carrying the stored termination value.
    pub async fn subscribe(&self) -> PassthroughReceiver<T, F> {
        let buffered = Arc::new(AtomicUsize::new(0));
        let mut state = self.shared.state.lock().await;
        let id = state.next_registration;
        state.next_registration += 1;
        let termination = state.termination.clone();
        state.registrations.insert(
            id,
            Registration {
                buffer: VecDeque::new(),
                termination,
                waiter: None,
                buffered: buffered.clone(),
            },
        );
        self.shared
            .subscribers
            .store(state.registrations.len(), Ordering::Release);
        drop(state);

        tracing::debug!("Subscription {id} registered");
        PassthroughReceiver {
            id,
            shared: self.shared.clone(),
            buffered,
            detached: false,
        }
    }

    /// Send an element to every live subscription, suspending the caller
    /// while the subject's lock is contended. A no-op once the subject is
    /// terminated.
    ///
    /// Delivery is atomic with respect to the subscription set: the element
    /// reaches exactly the subscriptions registered at the moment the lock
    /// was acquired, each in the same relative send order.
    pub async fn send(&self, element: T) {
        self.shared.state.lock().await.deliver(element);
    }

    /// Same delivery semantics as [PassthroughSubject::send], but the caller
    /// observes no suspension point: the critical section runs on the
    /// subject's own execution context. Operations submitted this way are
    /// applied in submission order.
    pub fn send_nonblocking(&self, element: T) {
        let _ = self.shared.ops.send(Op::Send(element));
    }

    /// Terminate the subject. The first termination wins: later calls of
    /// either kind are ignored. Live subscriptions still drain their
    /// buffered elements before observing the termination; registrations
    /// are removed lazily as each consumer finishes.
    pub async fn terminate(&self, termination: Termination<F>) {
        self.shared.state.lock().await.terminate_all(termination);
    }

    /// Same as [PassthroughSubject::terminate], without suspending the
    /// caller.
    pub fn terminate_nonblocking(&self, termination: Termination<F>) {
        let _ = self.shared.ops.send(Op::Terminate(termination));
    }

    /// The number of live subscriptions. Advisory only under concurrency.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.load(Ordering::Acquire)
    }

    /// Check if there are no live subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }
}

#[async_trait::async_trait]
impl<T, F> Subject for PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Element = T;
    type Failure = F;
    type Receiver = PassthroughReceiver<T, F>;

    async fn send(&self, element: T) {
        PassthroughSubject::send(self, element).await
    }

    fn send_nonblocking(&self, element: T) {
        PassthroughSubject::send_nonblocking(self, element)
    }

    async fn terminate(&self, termination: Termination<F>) {
        PassthroughSubject::terminate(self, termination).await
    }

    fn terminate_nonblocking(&self, termination: Termination<F>) {
        PassthroughSubject::terminate_nonblocking(self, termination)
    }

    async fn subscribe(&self) -> PassthroughReceiver<T, F> {
        PassthroughSubject::subscribe(self).await
    }
}

/// The pull side of one subscription to a [PassthroughSubject].
///
/// Dropping the receiver cancels the subscription: its registration is
/// removed from the subject, buffered-but-undelivered elements are
/// discarded, and a pending failure is never surfaced. Aborting the task
/// which owns the receiver has the same effect.
pub struct PassthroughReceiver<T, F> {
    id: u64,
    shared: Arc<Shared<T, F>>,
    buffered: Arc<AtomicUsize>,
    /// Set once termination has been observed and the registration is
    /// already gone, so `Drop` has nothing left to clean up.
    detached: bool,
}

impl<T, F> PassthroughReceiver<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    /// Pull the next element, suspending the caller while the buffer is
    /// empty and the subject is unterminated.
    ///
    /// Returns `Ok(Some(element))` while elements are available. Once the
    /// buffer drains, a clean termination yields `Ok(None)` and a failure
    /// termination yields `Err` exactly once; every later call returns
    /// `Ok(None)`.
    ///
    /// The wait parks outside the subject's lock, so dropping an in-flight
    /// `recv` future (a lost `select!` arm, an aborted task) never leaves
    /// the lock held and never blocks the other subscriptions.
    pub async fn recv(&mut self) -> Result<Option<T>, F> {
        loop {
            let waiter = {
                let mut state = self.shared.state.lock().await;
                let registration = match state.registrations.get_mut(&self.id) {
                    Some(registration) => registration,
                    // already cancelled or fully consumed
                    None => return Ok(None),
                };
                if let Some(element) = registration.buffer.pop_front() {
                    registration
                        .buffered
                        .store(registration.buffer.len(), Ordering::Release);
                    return Ok(Some(element));
                }
                if let Some(termination) = registration.termination.clone() {
                    state.registrations.remove(&self.id);
                    self.shared
                        .subscribers
                        .store(state.registrations.len(), Ordering::Release);
                    self.detached = true;
                    tracing::debug!("Subscription {} drained ({termination})", self.id);
                    return match termination {
                        Termination::Finished => Ok(None),
                        Termination::Failure(failure) => Err(failure),
                    };
                }
                let (tx, waiter) = oneshot::channel();
                registration.waiter = Some(tx);
                waiter
            };
            // Park outside the critical section. A send, a termination, or
            // the dispatch task firing the waiter resumes the loop; the
            // result itself is irrelevant, the retry re-reads the state.
            let _ = waiter.await;
        }
    }

    /// Whether this subscription currently holds undelivered elements.
    /// Advisory only: the answer may be stale as soon as it is produced.
    pub fn has_buffered_elements(&self) -> bool {
        self.buffered.load(Ordering::Acquire) > 0
    }
}

#[async_trait::async_trait]
impl<T, F> SubjectReceiver for PassthroughReceiver<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Element = T;
    type Failure = F;

    async fn recv(&mut self) -> Result<Option<T>, F> {
        PassthroughReceiver::recv(self).await
    }

    fn has_buffered_elements(&self) -> bool {
        PassthroughReceiver::has_buffered_elements(self)
    }
}

impl<T, F> Drop for PassthroughReceiver<T, F> {
    fn drop(&mut self) {
        if !self.detached {
            // Cancellation path. Deregistration must not suspend or take
            // the lock here, so it is deferred to the dispatch task.
            let _ = self.shared.ops.send(Op::Deregister(self.id));
        }
    }
}

/// The subject's own execution context: applies deferred operations, in
/// submission order, under the same lock as the suspending entry points.
///
/// Holds only a weak reference so an idle dispatch task never keeps a dead
/// subject alive; the loop ends once every subject and receiver handle is
/// gone.
async fn dispatch<T, F>(shared: Weak<Shared<T, F>>, mut queue: mpsc::UnboundedReceiver<Op<T, F>>)
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    while let Some(op) = queue.recv().await {
        let strong = match shared.upgrade() {
            Some(strong) => strong,
            None => break,
        };
        let mut state = strong.state.lock().await;
        match op {
            Op::Send(element) => state.deliver(element),
            Op::Terminate(termination) => state.terminate_all(termination),
            Op::Deregister(id) => {
                if state.registrations.remove(&id).is_some() {
                    strong
                        .subscribers
                        .store(state.registrations.len(), Ordering::Release);
                    tracing::debug!("Subscription {id} deregistered");
                }
            }
        }
    }
    tracing::trace!("Subject dispatch loop ended");
}
