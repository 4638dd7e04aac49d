use std::hash::Hash;
use std::pin::pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;
use tokio::sync::Notify;

/// Run jobs once per key and share the results between concurrent callers.
///
/// The first caller for a key receives a [`Registration`] and runs the job; later callers
/// [`OnceMap::wait`] for it. Dropping a registration without calling [`Registration::done`]
/// (the job failed, or its future was cancelled) removes the placeholder and wakes the waiters,
/// which then observe `None` and may start the job themselves.
pub(crate) struct OnceMap<K, V> {
    items: DashMap<K, Value<V>, FxBuildHasher>,
}

enum Value<V> {
    Waiting(Arc<Notify>),
    Filled(V),
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    /// Claim the job for `key`, unless it is running or finished.
    pub(crate) fn register(&self, key: K) -> Option<Registration<'_, K, V>> {
        match self.items.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(Value::Waiting(Arc::new(Notify::new())));
                Some(Registration {
                    map: self,
                    key: Some(key),
                })
            }
        }
    }

    /// Wait for the job for `key` to finish.
    ///
    /// Returns `None` if no job is registered, or if the job was abandoned.
    pub(crate) async fn wait(&self, key: &K) -> Option<V> {
        let notify = {
            let entry = self.items.get(key)?;
            match entry.value() {
                Value::Filled(value) => return Some(value.clone()),
                Value::Waiting(notify) => notify.clone(),
            }
        };

        let notification = pin!(notify.notified());

        // The job may have finished between the lookup and the registration of the waiter.
        match self.items.get(key).as_deref() {
            None => return None,
            Some(Value::Filled(value)) => return Some(value.clone()),
            Some(Value::Waiting(_)) => {}
        }

        notification.await;

        match self.items.get(key).as_deref() {
            Some(Value::Filled(value)) => Some(value.clone()),
            Some(Value::Waiting(_)) | None => None,
        }
    }

    /// Return the result of the job for `key`, running `init` if no other caller is.
    ///
    /// Failures are not stored: the next caller runs the job again.
    pub(crate) async fn get_or_try_init<E, Fut>(
        &self,
        key: K,
        init: impl FnOnce() -> Fut,
    ) -> Result<V, E>
    where
        Fut: Future<Output = Result<V, E>>,
    {
        let registration = loop {
            if let Some(value) = self.get(&key) {
                return Ok(value);
            }
            if let Some(registration) = self.register(key.clone()) {
                break registration;
            }
            if let Some(value) = self.wait(&key).await {
                return Ok(value);
            }
        };
        let value = init().await?;
        registration.done(value.clone());
        Ok(value)
    }

    /// The result of a finished job, if any.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        match self.items.get(key).as_deref() {
            Some(Value::Filled(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn done(&self, key: K, value: V) {
        if let Some(Value::Waiting(notify)) = self.items.insert(key, Value::Filled(value)) {
            notify.notify_waiters();
        }
    }

    fn abandon(&self, key: &K) {
        if let Some((_, Value::Waiting(notify))) = self
            .items
            .remove_if(key, |_, value| matches!(value, Value::Waiting(_)))
        {
            notify.notify_waiters();
        }
    }
}

impl<K: Eq + Hash, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            items: DashMap::with_hasher(FxBuildHasher),
        }
    }
}

/// The claim on a job in a [`OnceMap`].
#[must_use]
pub(crate) struct Registration<'a, K: Eq + Hash + Clone, V: Clone> {
    map: &'a OnceMap<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> Registration<'_, K, V> {
    /// Publish the result of the job.
    pub(crate) fn done(mut self, value: V) {
        if let Some(key) = self.key.take() {
            self.map.done(key, value);
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Drop for Registration<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.map.abandon(&key);
        }
    }
}
