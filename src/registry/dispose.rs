//! One-shot disposal notification

use parking_lot::Mutex;
use std::mem;

/// Listener invoked when the owner disposes a manager
pub type DisposeListener<S> = Box<dyn FnOnce(&S) + Send + 'static>;

/// Observer list that fires at most once.
///
/// `notify` swaps the list for an empty one under the lock and invokes the
/// swapped-out listeners after releasing it, so a listener may subscribe or
/// dispose again without deadlocking and concurrent callers cannot both
/// observe the same listener.
pub(crate) struct DisposeSignal<S> {
    state: Mutex<SignalState<S>>,
}

struct SignalState<S> {
    fired: bool,
    listeners: Vec<DisposeListener<S>>,
}

impl<S> DisposeSignal<S> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState {
                fired: false,
                listeners: Vec::new(),
            }),
        }
    }

    /// Add a listener. Returns false, dropping the listener uncalled, once
    /// the signal has fired.
    pub fn subscribe(&self, listener: DisposeListener<S>) -> bool {
        let mut state = self.state.lock();
        if state.fired {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Fire the signal. Returns the number of listeners notified, or `None`
    /// if the signal had already fired.
    pub fn notify(&self, sender: &S) -> Option<usize> {
        let listeners = {
            let mut state = self.state.lock();
            if mem::replace(&mut state.fired, true) {
                return None;
            }
            mem::take(&mut state.listeners)
        };

        let count = listeners.len();
        for listener in listeners {
            listener(sender);
        }
        Some(count)
    }

    pub fn has_fired(&self) -> bool {
        self.state.lock().fired
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}
