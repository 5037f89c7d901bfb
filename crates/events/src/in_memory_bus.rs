//! In-process notification bus.

use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError, mpsc};

use crate::bus::{NotificationBus, Subscription};

/// Fan-out over std channels. Disconnected subscribers are pruned on publish.
///
/// The subscriber list stays consistent even if a holder of the lock
/// panicked, so a poisoned lock is recovered rather than surfaced.
#[derive(Debug)]
pub struct InMemoryNotificationBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryNotificationBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<M>>> {
        self.subscribers.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("notification bus lock poisoned; recovering subscriber list");
            poisoned.into_inner()
        })
    }
}

impl<M> Default for InMemoryNotificationBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> NotificationBus<M> for InMemoryNotificationBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers();
        let before = subs.len();
        subs.retain(|tx| tx.send(message.clone()).is_ok());
        if subs.len() < before {
            tracing::debug!(dropped = before - subs.len(), "pruned disconnected subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.subscribers().push(tx);
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationEnvelope;
    use worklane_core::{ContextSnapshot, TenantId};

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = InMemoryNotificationBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        let tenant = TenantId::new();

        bus.publish(NotificationEnvelope::new(
            tenant,
            "tenant.created",
            ContextSnapshot::system(Some(tenant)),
            42u32,
        ))
        .unwrap();

        assert_eq!(*a.try_recv().unwrap().payload(), 42);
        assert_eq!(b.try_recv().unwrap().tenant_id(), tenant);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryNotificationBus::<u8>::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(1).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.recv().unwrap(), 1);
    }

    #[test]
    fn poisoned_lock_still_delivers() {
        use std::sync::Arc;

        let bus = Arc::new(InMemoryNotificationBus::<u8>::new());
        let poisoner = Arc::clone(&bus);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.subscribers.lock().unwrap();
            panic!("poison the subscriber lock");
        })
        .join();
        assert!(bus.subscribers.is_poisoned());

        let late = bus.subscribe();
        bus.publish(7).unwrap();
        assert_eq!(late.recv().unwrap(), 7);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
