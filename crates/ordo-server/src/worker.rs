//! The transaction worker: one thread, one FIFO queue, one transaction.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use ordo_types::OpCode;
use tracing::{error, trace};

use crate::dispatcher::RpcDispatcher;

/// One-shot rendezvous between the connection thread and a worker.
///
/// The worker publishes exactly once; the connection thread waits exactly
/// once. Poisoning cannot corrupt a slot (the state is a flag and a byte
/// buffer), so a poisoned lock is recovered rather than propagated.
#[derive(Debug, Default)]
pub(crate) struct ResponseSlot {
    state: Mutex<SlotState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct SlotState {
    ready: bool,
    bytes: Vec<u8>,
}

impl ResponseSlot {
    fn publish(&self, bytes: Vec<u8>) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.bytes = bytes;
        state.ready = true;
        drop(state);
        self.cv.notify_all();
    }

    fn wait(&self) -> Vec<u8> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !state.ready {
            state = self
                .cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        std::mem::take(&mut state.bytes)
    }
}

/// A queued RPC, owned by the queue and moved into the worker thread on pop.
#[derive(Debug)]
struct Task {
    sender_id: u64,
    opcode: OpCode,
    payload: Vec<u8>,
    slot: Arc<ResponseSlot>,
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    stopping: bool,
}

#[derive(Debug, Default)]
struct WorkerShared {
    queue: Mutex<QueueState>,
    cv: Condvar,
}

/// A dedicated thread serializing every operation of one transaction.
///
/// Insertion into the queue is thread-safe; draining happens only on the
/// worker's own thread, which is what confines the engine transaction to a
/// single thread for its whole life. After servicing END the worker fails
/// any tasks the client wrongly pipelined past it and stops.
#[derive(Debug)]
pub struct TransactionWorker {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl TransactionWorker {
    /// Spawn the worker thread with its own dispatcher handle.
    #[must_use]
    pub fn spawn(dispatcher: RpcDispatcher) -> Self {
        let shared = Arc::new(WorkerShared::default());
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::spawn(move || run(&thread_shared, &dispatcher));
        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Enqueue one RPC and block until the worker publishes its response.
    ///
    /// Called from the connection thread. A worker that is already stopping
    /// answers with an empty (failure) response instead of accepting work it
    /// would never drain.
    pub fn enqueue_and_wait(&self, sender_id: u64, opcode: OpCode, payload: Vec<u8>) -> Vec<u8> {
        let slot = Arc::new(ResponseSlot::default());
        {
            let mut queue = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if queue.stopping {
                return Vec::new();
            }
            queue.tasks.push_back(Task {
                sender_id,
                opcode,
                payload,
                slot: Arc::clone(&slot),
            });
        }
        self.shared.cv.notify_one();
        slot.wait()
    }

    /// Ask the worker to exit once its queue is drained.
    pub fn shutdown(&self) {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.stopping = true;
        drop(queue);
        self.shared.cv.notify_one();
    }
}

impl Drop for TransactionWorker {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("transaction worker thread panicked");
            }
        }
    }
}

fn run(shared: &WorkerShared, dispatcher: &RpcDispatcher) {
    loop {
        let task = {
            let mut queue = shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            while !queue.stopping && queue.tasks.is_empty() {
                queue = shared
                    .cv
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match queue.tasks.pop_front() {
                Some(task) => task,
                None => break, // stopping with a drained queue
            }
        };

        // A panicking engine call must still unblock the connection thread;
        // an empty response reads as failure on the client.
        let bytes = catch_unwind(AssertUnwindSafe(|| {
            dispatcher.dispatch(task.sender_id, task.opcode, &task.payload)
        }))
        .unwrap_or_else(|_| {
            error!(opcode = %task.opcode, "dispatch panicked; publishing empty response");
            Vec::new()
        });

        let was_end = task.opcode == OpCode::End;
        task.slot.publish(bytes);

        if was_end {
            // The client should not have pipelined past END; fail anything
            // still queued and stop.
            let mut queue = shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            while let Some(extra) = queue.tasks.pop_front() {
                trace!(opcode = %extra.opcode, "draining task queued past END");
                extra.slot.publish(Vec::new());
            }
            queue.stopping = true;
        }
    }
}
