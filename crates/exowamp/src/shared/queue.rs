//! # Queue
//!
//! An unbounded async FIFO of results. `pop` hands out buffered items first;
//! when the buffer is empty the caller parks until the next `put`. Failures
//! travel through the queue in order with the values, which lets transports
//! surface faults to whoever is reading.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::sync::oneshot;

type Item<T, E> = std::result::Result<T, E>;

struct State<T, E> {
    items: VecDeque<Item<T, E>>,
    waiters: VecDeque<oneshot::Sender<Item<T, E>>>,
}

pub struct Queue<T, E = std::convert::Infallible> {
    state: Mutex<State<T, E>>,
}

impl<T, E> Default for Queue<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Queue<T, E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, value: T) {
        self.deliver(Ok(value));
    }

    pub fn put_error(&self, error: E) {
        self.deliver(Err(error));
    }

    fn deliver(&self, mut item: Item<T, E>) {
        let mut state = self.state();
        // Skip waiters whose pop was dropped mid-wait.
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return,
                Err(returned) => item = returned,
            }
        }
        state.items.push_back(item);
    }

    pub async fn pop(&self) -> Item<T, E> {
        loop {
            let rx = {
                let mut state = self.state();
                if let Some(item) = state.items.pop_front() {
                    return item;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };
            if let Ok(item) = rx.await {
                return item;
            }
        }
    }

    /// Number of buffered items nobody has popped yet.
    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
