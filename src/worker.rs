//! Worker threads and one-shot result slots.
//!
//! The landmark stage runs over a pool of inference engine handles. Each handle lives on its own
//! [`Worker`] thread, which serializes all inference calls made through it: messages queue up in
//! the worker's channel in FIFO order and are processed one at a time. Results travel back through
//! [`Promise`]s, so the dispatching thread can fan out several crops and then collect the results
//! in submission order.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` never blocks.
    let (sender, recv) = crossbeam::channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// If a thread is currently waiting at [`PromiseHandle::block`], it will be woken up. If the
    /// connected [`PromiseHandle`] was dropped, `value` is dropped and nothing happens.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Blocks the calling thread until the [`Promise`] is fulfilled.
    ///
    /// Returns an error if the [`Promise`] was dropped without being fulfilled, which indicates
    /// that the worker thread owning it has panicked.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }
}

/// An error returned by [`PromiseHandle::block`] indicating that the connected [`Promise`] object
/// was dropped without being fulfilled.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

/// A handle to a worker thread that processes messages of type `I`.
///
/// When dropped, the channel to the thread is closed and the thread is joined. If the thread has
/// panicked, the panic is forwarded to the thread dropping the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Worker<I> {
    /// Spawns a worker thread that invokes `handler` for every incoming message.
    ///
    /// The channel is unbuffered-plus-queue semantics via an unbounded channel: sends never block,
    /// messages are processed strictly in FIFO order.
    pub fn spawn<N, F>(name: N, mut handler: F) -> io::Result<Self>
    where
        N: Into<String>,
        F: FnMut(I) + Send + 'static,
    {
        let name = name.into();
        let (sender, recv) = crossbeam::channel::unbounded::<I>();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Sends a message to the worker thread.
    ///
    /// If the worker has panicked, this will propagate the panic to the calling thread.
    pub fn send(&mut self, msg: I) {
        if self.sender.as_ref().unwrap().send(msg).is_err() {
            // The worker exited early, which only happens when its handler panicked.
            self.wait_for_exit();
        }
    }

    fn wait_for_exit(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // Close the channel to signal the thread to exit.
        drop(self.sender.take());
        self.wait_for_exit();
    }
}
