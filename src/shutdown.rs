//! Shutdown signalling.
//!
//! A background task waits for SIGINT/SIGTERM and publishes the signal on a
//! `watch` channel; the poll loop races its work against `Shutdown::recv`.

use std::fmt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Sending half, held by the signal task (or a test).
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownTrigger {
    /// Request shutdown. Later calls are ignored.
    pub fn fire(&self, signal: ShutdownSignal) {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });
    }
}

/// Receiving half, owned by the poll loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl Shutdown {
    /// A connected trigger/listener pair.
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (sender, receiver) = watch::channel(None);
        (ShutdownTrigger { sender }, Shutdown { receiver })
    }

    /// The signal, if one has already arrived.
    pub fn triggered(&self) -> Option<ShutdownSignal> {
        *self.receiver.borrow()
    }

    /// Wait for a shutdown request. Never resolves if the trigger is dropped
    /// without firing.
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.receiver.borrow_and_update() {
                return signal;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Install SIGINT/SIGTERM handlers and spawn the listener task.
///
/// Must be called from inside a tokio runtime.
pub fn listen_for_signals() -> std::io::Result<Shutdown> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (trigger, shutdown) = Shutdown::channel();

    tokio::spawn(async move {
        let received = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        info!(signal = %received, "Received shutdown signal");
        trigger.fire(received);
    });

    Ok(shutdown)
}
