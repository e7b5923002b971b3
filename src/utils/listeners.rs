use std::sync::{Arc, Mutex, PoisonError};

/// Ordered callback list.
///
/// Listeners are compared by the address of their shared allocation, so the
/// same `Arc` passed to `add` must be passed to `remove`. Emission always
/// works on a snapshot so a callback may add or remove listeners (itself
/// included) while being notified.
pub struct Listeners<F: ?Sized> {
    inner: Mutex<Vec<Arc<F>>>,
}

impl<F: ?Sized> Listeners<F> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<F>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove the first registration of `listener`. Returns false if absent.
    pub fn remove(&self, listener: &Arc<F>) -> bool {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match list.iter().position(|l| same_listener(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Registration-ordered copy of the current list
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Address equality that ignores vtable pointers
pub fn same_listener<F: ?Sized>(a: &Arc<F>, b: &Arc<F>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Callback = dyn Fn(u32) + Send + Sync;

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners: Listeners<Callback> = Listeners::new();
        for tag in 0..3u32 {
            let seen = seen.clone();
            listeners.add(Arc::new(move |v: u32| seen.lock().unwrap().push((tag, v))));
        }

        for l in listeners.snapshot() {
            l(7);
        }
        assert_eq!(*seen.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_remove_by_reference() {
        let listeners: Listeners<Callback> = Listeners::new();
        let a: Arc<Callback> = Arc::new(|_: u32| {});
        let b: Arc<Callback> = Arc::new(|_: u32| {});
        listeners.add(a.clone());
        listeners.add(b.clone());

        assert!(listeners.remove(&a));
        assert!(!listeners.remove(&a));
        assert_eq!(listeners.len(), 1);
        assert!(same_listener(&listeners.snapshot()[0], &b));
    }

    #[test]
    fn test_listener_can_remove_itself_during_emit() {
        let listeners: Arc<Listeners<Callback>> = Arc::new(Listeners::new());
        let calls = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<Arc<Callback>>>> = Arc::new(Mutex::new(None));

        let me: Arc<Callback> = {
            let listeners = listeners.clone();
            let calls = calls.clone();
            let slot = slot.clone();
            Arc::new(move |_: u32| {
                *calls.lock().unwrap() += 1;
                if let Some(me) = slot.lock().unwrap().as_ref() {
                    listeners.remove(me);
                }
            })
        };
        *slot.lock().unwrap() = Some(me.clone());
        listeners.add(me);
        listeners.add(Arc::new(|_: u32| {}));

        for l in listeners.snapshot() {
            l(1);
        }
        for l in listeners.snapshot() {
            l(2);
        }
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(listeners.len(), 1);
    }
}
