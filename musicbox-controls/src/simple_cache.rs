use time::Duration;
use tokio::{sync::RwLock, time::Instant};

/// A single value that goes stale `ttl` after it was stored.
#[derive(Debug)]
pub(crate) struct SimpleCache<T> {
    entry: RwLock<Option<(Instant, T)>>,
    ttl: Duration,
}

impl<T: Clone> SimpleCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    pub async fn get(&self) -> Option<T> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn set(&self, value: T) {
        *self.entry.write().await = Some((Instant::now(), value));
    }

    pub async fn clear(&self) {
        *self.entry.write().await = None;
    }
}
