//! The process-wide spinner: a single-threaded-semantics, per-client
//! throttled delivery queue. Endpoints register as clients and `ping` units
//! of work (already-bound futures); a background tick loop drains each
//! client's queue once its throttle deadline has passed, with drains for
//! different clients running concurrently but a single client's own drains
//! never overlapping or reordering.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type SpinnerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

const TICK_INTERVAL: Duration = Duration::from_millis(5);

struct Client {
    capacity: usize,
    throttle_ms: i64,
    pending: VecDeque<SpinnerFuture>,
    draining: bool,
    next_deadline: Option<Instant>,
}

type Clients = Arc<Mutex<HashMap<u64, Client>>>;

/// A single registered client's id within a `Spinner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

pub struct Spinner {
    clients: Clients,
    next_id: AtomicU64,
    tick_task: tokio::task::JoinHandle<()>,
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.tick_task.abort();
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spinner {
    pub fn new() -> Self {
        let clients: Clients = Arc::new(Mutex::new(HashMap::new()));
        let weak = Arc::downgrade(&clients);

        let tick_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK_INTERVAL).await;
                let Some(clients) = weak.upgrade() else { break };
                tick(&clients);
            }
        });

        Self { clients, next_id: AtomicU64::new(0), tick_task }
    }

    /// Registers a client with its queue capacity and throttle interval.
    /// `throttle_ms < 0` bypasses the spinner entirely: `ping` then runs
    /// the work synchronously on the caller's path instead of queuing it.
    pub fn add_client(&self, capacity: usize, throttle_ms: i64) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(
            id,
            Client { capacity, throttle_ms, pending: VecDeque::new(), draining: false, next_deadline: None },
        );
        ClientId(id)
    }

    /// Enqueues one unit of work for `id`. If the client's queue is at
    /// capacity, the oldest pending item is dropped to make room. A client
    /// that no longer exists (already disconnected) silently drops the
    /// work.
    pub async fn ping(&self, id: ClientId, work: SpinnerFuture) {
        let bypass = {
            let clients = self.clients.lock();
            match clients.get(&id.0) {
                Some(client) => client.throttle_ms < 0,
                None => return,
            }
        };

        if bypass {
            work.await;
            return;
        }

        let mut clients = self.clients.lock();
        if let Some(client) = clients.get_mut(&id.0) {
            if client.capacity > 0 && client.pending.len() >= client.capacity {
                client.pending.pop_front();
            }
            client.pending.push_back(work);
        }
    }

    /// Removes a client. Idempotent — disconnecting an unknown or
    /// already-disconnected id is a no-op.
    pub fn disconnect(&self, id: ClientId) {
        self.clients.lock().remove(&id.0);
    }

    #[cfg(test)]
    fn pending_len(&self, id: ClientId) -> usize {
        self.clients.lock().get(&id.0).map(|c| c.pending.len()).unwrap_or(0)
    }
}

fn tick(clients: &Clients) {
    let now = Instant::now();

    let ready: Vec<u64> = {
        let guard = clients.lock();
        guard
            .iter()
            .filter(|(_, client)| {
                !client.draining && !client.pending.is_empty() && client.next_deadline.is_none_or(|deadline| now >= deadline)
            })
            .map(|(id, _)| *id)
            .collect()
    };

    for id in ready {
        let items = {
            let mut guard = clients.lock();
            let Some(client) = guard.get_mut(&id) else { continue };
            if client.draining || client.pending.is_empty() {
                continue;
            }
            client.draining = true;
            std::mem::take(&mut client.pending)
        };

        if items.is_empty() {
            continue;
        }

        let clients = clients.clone();
        tokio::spawn(async move {
            for item in items {
                item.await;
            }

            let mut guard = clients.lock();
            if let Some(client) = guard.get_mut(&id) {
                client.draining = false;
                client.next_deadline =
                    (client.throttle_ms > 0).then(|| Instant::now() + Duration::from_millis(client.throttle_ms as u64));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn overflow_evicts_oldest_item() {
        let spinner = Spinner::new();
        let id = spinner.add_client(2, 1_000_000); // throttle never fires during the test
        let (tx, _rx) = mpsc::unbounded_channel::<u32>();

        for value in [1, 2, 3] {
            let tx = tx.clone();
            spinner.ping(id, Box::pin(async move { let _ = tx.send(value); })).await;
        }

        assert_eq!(spinner.pending_len(id), 2);
    }

    #[tokio::test]
    async fn delivers_all_queued_items_in_order_once_deadline_passes() {
        let spinner = Spinner::new();
        let id = spinner.add_client(10, 0);
        let delivered = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=3 {
            let delivered = delivered.clone();
            spinner.ping(id, Box::pin(async move { delivered.lock().push(value); })).await;
        }

        tokio::time::sleep(TICK_INTERVAL * 4).await;
        assert_eq!(*delivered.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn negative_throttle_bypasses_queue_and_runs_synchronously() {
        let spinner = Spinner::new();
        let id = spinner.add_client(10, -1);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();

        spinner.ping(id, Box::pin(async move { ran2.fetch_add(1, Ordering::SeqCst); })).await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(spinner.pending_len(id), 0);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let spinner = Spinner::new();
        let id = spinner.add_client(1, 0);
        spinner.disconnect(id);
        spinner.disconnect(id);
    }
}
