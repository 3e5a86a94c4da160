//! Ordered producer/consumer handoff.
//!
//! A requester pushes a [`Gate`] and blocks until it is ready. The first gate
//! in an empty queue is ready at once; every later gate becomes ready when
//! the gate ahead of it is popped. A pop never removes the sole queued gate,
//! it waits until a successor is queued.
//!
//! Pushes and pops are served by two dedicated threads fed over bounded
//! channels. Lock order: the queue lock is taken before any gate lock.

use crate::compat::{Arc, AtomicU64, Condvar, Mutex, Ordering};
use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thread_priority::ThreadPriority;

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity of the push and pop request channels.
pub const GATE_CHANNEL_CAPACITY: usize = 2;

#[derive(Debug, Default)]
struct GateState {
    active: bool,
    ready: bool,
    popped: bool,
    released: bool,
}

pub struct Gate {
    id: u64,
    state: Mutex<GateState>,
    /// Signalled when the gate becomes ready.
    wait_cond: Condvar,
    /// Signalled when the gate leaves the queue.
    state_cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(GateState::default()),
            wait_cond: Condvar::new(),
            state_cond: Condvar::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Whether a shutdown woke this gate's waiters.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn activate(&self) {
        self.state.lock().active = true;
    }

    fn mark_ready(&self) {
        let mut state = self.state.lock();
        state.ready = true;
        self.wait_cond.notify_all();
    }

    fn deactivate(&self) {
        let mut state = self.state.lock();
        state.active = false;
        state.popped = true;
        self.state_cond.notify_all();
    }

    /// Wakes every waiter without making the gate ready.
    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        self.wait_cond.notify_all();
        self.state_cond.notify_all();
    }

    /// Blocks until the gate is ready. Returns `false` if it was released
    /// by a shutdown instead.
    pub fn wait_ready(&self) -> bool {
        let mut state = self.state.lock();
        while !state.ready && !state.released {
            self.wait_cond.wait(&mut state);
        }
        state.ready
    }

    /// Like [`wait_ready`](Self::wait_ready) with a timeout.
    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.ready && !state.released {
            self.wait_cond
                .wait_while_for(&mut state, |s| !s.ready && !s.released, timeout);
        }
        state.ready
    }

    /// Blocks until the gate has been popped. Returns `false` on shutdown.
    pub fn wait_popped(&self) -> bool {
        let mut state = self.state.lock();
        while !state.popped && !state.released {
            self.state_cond.wait(&mut state);
        }
        state.popped
    }
}

impl core::fmt::Debug for Gate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Gate")
            .field("id", &self.id)
            .field("active", &state.active)
            .field("ready", &state.ready)
            .finish()
    }
}

/// FIFO of gates.
#[derive(Default)]
pub struct GateQueue {
    queue: Mutex<VecDeque<Arc<Gate>>>,
    queued: Condvar,
    shutdown: AtomicFlag,
}

impl GateQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn head(&self) -> Option<Arc<Gate>> {
        self.queue.lock().front().cloned()
    }

    /// Appends `gate`. It is ready at once if the queue was empty.
    ///
    /// After shutdown the gate is released instead of queued.
    pub fn push(&self, gate: Arc<Gate>) {
        let mut queue = self.queue.lock();
        if self.shutdown.get() {
            tracing::trace!(gate = gate.id(), "push after shutdown");
            gate.release();
            return;
        }
        gate.activate();
        queue.push_back(gate);
        if queue.len() == 1 {
            if let Some(head) = queue.front() {
                head.mark_ready();
            }
        }
        self.queued.notify_all();
    }

    fn pop_locked(queue: &mut VecDeque<Arc<Gate>>) -> Option<Arc<Gate>> {
        let head = queue.pop_front()?;
        if let Some(next) = queue.front() {
            next.mark_ready();
        }
        head.deactivate();
        Some(head)
    }

    /// Waits until a successor is queued behind the head, then pops the
    /// head and readies the successor.
    pub fn pop_blocking(&self) -> Result<Arc<Gate>> {
        let mut queue = self.queue.lock();
        loop {
            if self.shutdown.get() {
                return Err(Error::Shutdown);
            }
            if queue.len() >= 2 {
                break;
            }
            self.queued.wait(&mut queue);
        }
        Self::pop_locked(&mut queue).ok_or(Error::EmptyGate)
    }

    /// Pops the head if a successor is queued.
    pub fn try_pop(&self) -> Result<Arc<Gate>> {
        let mut queue = self.queue.lock();
        if queue.len() < 2 {
            return Err(Error::EmptyGate);
        }
        Self::pop_locked(&mut queue).ok_or(Error::EmptyGate)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.get()
    }

    /// Fails pending pops and releases every queued gate.
    pub fn shutdown(&self) {
        let queue = self.queue.lock();
        self.shutdown.set(true);
        for gate in queue.iter() {
            gate.release();
        }
        self.queued.notify_all();
    }
}

/// Request served by a gate worker thread.
#[derive(Debug)]
pub enum GateRequest {
    Push(Arc<Gate>),
    Pop,
    Shutdown,
}

/// The push and pop threads.
pub struct GateWorkers {
    queue: Arc<GateQueue>,
    push_tx: Sender<GateRequest>,
    pop_tx: Sender<GateRequest>,
    push_thread: Mutex<Option<JoinHandle<()>>>,
    pop_thread: Mutex<Option<JoinHandle<()>>>,
}

impl GateWorkers {
    pub fn spawn(queue: Arc<GateQueue>) -> Result<Self> {
        let (push_tx, push_rx) = bounded(GATE_CHANNEL_CAPACITY);
        let (pop_tx, pop_rx) = bounded(GATE_CHANNEL_CAPACITY);

        let push_thread = spawn_worker("ostinato-gate-push", Arc::clone(&queue), push_rx)?;
        let pop_thread = match spawn_worker("ostinato-gate-pop", Arc::clone(&queue), pop_rx) {
            Ok(handle) => handle,
            Err(e) => {
                queue.shutdown();
                let _ = push_tx.send(GateRequest::Shutdown);
                let _ = push_thread.join();
                return Err(e);
            }
        };

        Ok(Self {
            queue,
            push_tx,
            pop_tx,
            push_thread: Mutex::new(Some(push_thread)),
            pop_thread: Mutex::new(Some(pop_thread)),
        })
    }

    pub fn queue(&self) -> &Arc<GateQueue> {
        &self.queue
    }

    pub fn submit_push(&self, gate: Arc<Gate>) -> Result<()> {
        submit(&self.push_tx, GateRequest::Push(Arc::clone(&gate)))?;
        // The push worker may have exited before taking the request.
        if self.queue.is_shutdown() {
            gate.release();
        }
        Ok(())
    }

    pub fn submit_pop(&self) -> Result<()> {
        submit(&self.pop_tx, GateRequest::Pop)
    }

    /// Submits the pop first, then the push, then waits for the pushed gate
    /// to become ready.
    pub fn gate_control(
        &self,
        gate: Option<Arc<Gate>>,
        want_push: bool,
        want_pop: bool,
    ) -> Result<()> {
        if want_pop {
            self.submit_pop()?;
        }

        if want_push {
            let gate = gate.unwrap_or_else(Gate::new);
            self.submit_push(Arc::clone(&gate))?;
            if !gate.wait_ready() {
                return Err(Error::Shutdown);
            }
        }
        Ok(())
    }

    /// Shuts the queue down and joins both threads.
    pub fn stop(&self) {
        self.queue.shutdown();
        // Fails once the worker has exited and dropped its receiver.
        let _ = self.push_tx.send(GateRequest::Shutdown);
        let _ = self.pop_tx.send(GateRequest::Shutdown);

        if let Some(handle) = self.push_thread.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pop_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GateWorkers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn submit(tx: &Sender<GateRequest>, request: GateRequest) -> Result<()> {
    tx.send(request).map_err(|_| Error::Shutdown)
}

fn spawn_worker(
    name: &'static str,
    queue: Arc<GateQueue>,
    rx: Receiver<GateRequest>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
            worker_loop(name, &queue, rx);
        })
        .map_err(|source| Error::ThreadSpawn { name, source })
}

fn worker_loop(name: &'static str, queue: &GateQueue, rx: Receiver<GateRequest>) {
    while let Ok(request) = rx.recv() {
        match request {
            GateRequest::Push(gate) => {
                tracing::trace!(worker = name, gate = gate.id(), "push");
                queue.push(gate);
            }
            GateRequest::Pop => match queue.pop_blocking() {
                Ok(gate) => tracing::trace!(worker = name, gate = gate.id(), "pop"),
                Err(_) => break,
            },
            GateRequest::Shutdown => break,
        }
    }

    for request in rx.try_iter() {
        if let GateRequest::Push(gate) = request {
            gate.release();
        }
    }
    tracing::debug!(worker = name, "gate worker stopped");
}
