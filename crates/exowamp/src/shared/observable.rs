//! # Observable
//!
//! A multicast callback hub: every `next` reaches every observer registered so
//! far, and `complete` fires each observer's completion hook once, then
//! forgets all of them. Registration after completion is ignored.
//!
//! Callbacks run synchronously on the emitting task and outside the internal
//! lock, so an observer may register further observers without deadlocking.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

type NextFn<T> = Arc<dyn Fn(T) + Send + Sync>;
type CompleteFn = Box<dyn FnOnce() + Send>;

struct Observer<T> {
    next: NextFn<T>,
    complete: Option<CompleteFn>,
}

struct State<T> {
    observers: Vec<Observer<T>>,
    closed: bool,
}

pub struct Observable<T> {
    state: Mutex<State<T>>,
}

impl<T: Clone> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Observable<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                observers: Vec::new(),
                closed: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn observe(&self, on_next: impl Fn(T) + Send + Sync + 'static) {
        self.attach(Observer {
            next: Arc::new(on_next),
            complete: None,
        });
    }

    pub fn observe_with_complete(
        &self,
        on_next: impl Fn(T) + Send + Sync + 'static,
        on_complete: impl FnOnce() + Send + 'static,
    ) {
        self.attach(Observer {
            next: Arc::new(on_next),
            complete: Some(Box::new(on_complete)),
        });
    }

    fn attach(&self, observer: Observer<T>) {
        let mut state = self.state();
        if !state.closed {
            state.observers.push(observer);
        }
    }

    /// Delivers `value` to every current observer.
    pub fn next(&self, value: T) {
        let observers: Vec<NextFn<T>> = {
            let state = self.state();
            state.observers.iter().map(|o| o.next.clone()).collect()
        };
        for on_next in observers {
            on_next(value.clone());
        }
    }

    /// Closes the observable. Returns `false` if it was already closed.
    pub fn complete(&self) -> bool {
        let observers = {
            let mut state = self.state();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.observers)
        };
        for observer in observers {
            if let Some(on_complete) = observer.complete {
                on_complete();
            }
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn test_next_reaches_every_observer() {
        let observable = Observable::<u32>::new();
        let sum = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let sum = sum.clone();
            observable.observe(move |v| {
                sum.fetch_add(v as usize, Ordering::SeqCst);
            });
        }
        observable.next(2);
        assert_eq!(sum.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_complete_fires_once_and_drops_observers() {
        let observable = Observable::<u32>::new();
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        observable.observe_with_complete(|_| {}, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(observable.complete());
        assert!(!observable.complete());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(observable.observer_count(), 0);
        assert!(observable.is_closed());
    }

    #[test]
    fn test_observe_after_complete_is_ignored() {
        let observable = Observable::<u32>::new();
        observable.complete();
        observable.observe(|_| panic!("must not be called"));
        observable.next(1);
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn test_observer_may_register_observer() {
        let observable = Arc::new(Observable::<u32>::new());
        let inner = observable.clone();
        observable.observe(move |_| inner.observe(|_| {}));
        observable.next(1);
        assert_eq!(observable.observer_count(), 2);
    }
}
