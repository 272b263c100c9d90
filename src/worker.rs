use std::{future::Future, time::Duration};

use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle},
    time::{Interval, MissedTickBehavior},
};

/// Halt request observed by a worker loop.
#[derive(Debug)]
pub struct Halt(oneshot::Receiver<()>);

impl Halt {
    /// Resolves once halt is requested or the owning [`Worker`] is dropped.
    pub async fn requested(&mut self) {
        let _ = (&mut self.0).await;
    }
}

/// A background task stopped by a two-phase handshake: request halt, then
/// wait for the task to return.
#[derive(Debug)]
pub struct Worker<T> {
    name: &'static str,
    halt: oneshot::Sender<()>,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(Halt) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (halt, halted) = oneshot::channel();
        let handle = tokio::spawn(body(Halt(halted)));
        log::debug!("Started {name}");

        Self { name, halt, handle }
    }

    /// Requests halt and waits until the in-flight iteration, if any, has
    /// finished and the task has returned.
    pub async fn stop(self) -> Result<T, JoinError> {
        if self.halt.send(()).is_err() {
            log::debug!("{} exited before halt was requested", self.name);
        }

        let output = self.handle.await;
        log::debug!("Stopped {}", self.name);
        output
    }
}

/// Ticker firing immediately and then every `period`. Zero periods are
/// raised to one second.
pub fn ticker(name: &str, period: Duration) -> Interval {
    let period = if period.is_zero() {
        log::warn!("{name} interval must be positive, using 1s");
        Duration::from_secs(1)
    } else {
        period
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
