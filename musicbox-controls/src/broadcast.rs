use tokio::sync::broadcast::{self, Receiver, Sender};

/// Fan-out of complete values. Receivers that fall behind skip to newer ones.
#[derive(Debug)]
pub struct Broadcast<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T: Clone> Broadcast<T> {
    pub fn new() -> Self {
        let (tx, rx) = broadcast::channel(32);
        Self { tx, rx }
    }

    pub fn send(&self, value: T) {
        // The retained receiver keeps the channel open, so sending cannot fail.
        let _ = self.tx.send(value);
    }

    pub fn subscribe(&self) -> Receiver<T> {
        self.rx.resubscribe()
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}
