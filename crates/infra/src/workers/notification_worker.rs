use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use worklane_core::TenantId;
use worklane_events::{NotificationBus, Subscription, TenantScoped};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Fire-and-forget consumer of published notifications.
///
/// Runs on its own thread, detached from any request: handlers get the
/// envelope (with its context snapshot) and nothing else. There is no live
/// `IdentityContext` on this thread.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Spawn a worker thread over a fresh bus subscription.
    ///
    /// - `tenant_id`: when provided, notifications for other tenants are skipped
    /// - `handler`: must tolerate duplicates (at-least-once delivery)
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: NotificationBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "notification handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
