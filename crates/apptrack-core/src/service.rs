//! Serialized owner of a [`LiveRegistry`].
//!
//! One task receives process events, behavior changes and commands and applies
//! them one at a time. Readers only ever see immutable snapshots.

use crate::behavior::{Behavior, BehaviorStore};
use crate::config::RegistryConfig;
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::notifier::{BehaviorSubscription, ChangeNotifier, Delivery, OriginTag};
use crate::process::{ProcessEvent, ProcessEventSource};
use crate::registry::LiveRegistry;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Read-only view handed to presentation code
pub type RegistrySnapshot = Arc<[Entry]>;

enum Command {
    SetShowAll {
        show_all: bool,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },
    Reload {
        respond_to: oneshot::Sender<()>,
    },
    AssignBehavior {
        app_id: String,
        behavior: Behavior,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },
}

pub struct RegistryService<S> {
    registry: LiveRegistry,
    source: S,
    commands: mpsc::Receiver<Command>,
    subscription: Option<BehaviorSubscription>,
    snapshots: watch::Sender<RegistrySnapshot>,
    cancellation_token: CancellationToken,
}

impl<S: ProcessEventSource + 'static> RegistryService<S> {
    /// Load the registry, subscribe to behavior changes and start the service task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &RegistryConfig,
        store: Arc<dyn BehaviorStore>,
        notifier: &ChangeNotifier,
        source: S,
    ) -> Result<RegistryHandle, RegistryError> {
        config.validate()?;

        let mut registry = LiveRegistry::new(store, OriginTag::new(config.origin.clone()));
        // Subscribe before loading so no change slips in between
        let subscription = notifier.subscribe();

        match config.show_all {
            Some(show_all) => registry.set_show_all(show_all, &source)?,
            None => registry.reload(&source),
        }

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(registry.snapshot());
        let cancellation_token = CancellationToken::new();

        let service = RegistryService {
            registry,
            source,
            commands: command_rx,
            subscription: Some(subscription),
            snapshots: snapshot_tx,
            cancellation_token: cancellation_token.clone(),
        };
        let task = tokio::spawn(service.run());

        Ok(RegistryHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            cancellation_token,
            task: Some(task),
        })
    }

    async fn run(mut self) {
        info!(
            origin = %self.registry.origin(),
            entries = self.registry.len(),
            "Registry service started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                delivery = next_delivery(&mut self.subscription) => self.handle_delivery(delivery),
                events = self.source.next_events() => self.handle_process_events(events),
            }
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        info!(entries = self.registry.len(), "Registry service stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetShowAll {
                show_all,
                respond_to,
            } => {
                let result = self.registry.set_show_all(show_all, &self.source);
                match &result {
                    Ok(()) => self.publish(),
                    Err(e) => warn!(
                        show_all,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Failed to change process visibility"
                    ),
                }
                // Caller may have given up waiting
                let _ = respond_to.send(result);
            }
            Command::Reload { respond_to } => {
                self.registry.reload(&self.source);
                self.publish();
                let _ = respond_to.send(());
            }
            Command::AssignBehavior {
                app_id,
                behavior,
                respond_to,
            } => {
                let result = self.registry.assign_behavior(&app_id, behavior);
                match &result {
                    Ok(true) => self.publish(),
                    Ok(false) => {}
                    Err(e) => warn!(
                        app_id = %app_id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Failed to assign behavior"
                    ),
                }
                let _ = respond_to.send(result.map(|_| ()));
            }
        }
    }

    fn handle_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Change(change) => {
                if self.registry.on_behavior_changed(&change) {
                    self.publish();
                }
            }
            Delivery::Lagged(skipped) => {
                warn!(skipped, "Missed behavior changes, reloading from store");
                self.registry.reload(&self.source);
                self.publish();
            }
            Delivery::Closed => {
                warn!("Change notifier closed, no further behavior updates");
                self.subscription = None;
            }
        }
    }

    fn handle_process_events(&mut self, events: Vec<ProcessEvent>) {
        let mut changed = false;
        for event in events {
            changed |= self.registry.apply(&event.into());
        }
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.registry.snapshot());
    }
}

async fn next_delivery(subscription: &mut Option<BehaviorSubscription>) -> Delivery {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a running [`RegistryService`]
pub struct RegistryHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<RegistrySnapshot>,
    cancellation_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RegistryHandle {
    /// Latest published entry set
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified every time a new snapshot is published
    pub fn watch_snapshots(&self) -> watch::Receiver<RegistrySnapshot> {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Toggle background process visibility; rebuilds the whole entry set
    pub async fn set_show_all(&self, show_all: bool) -> Result<(), RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Command::SetShowAll {
            show_all,
            respond_to,
        })
        .await?;
        response.await.map_err(|_| RegistryError::ServiceStopped)?
    }

    pub async fn reload(&self) -> Result<(), RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Command::Reload { respond_to }).await?;
        response.await.map_err(|_| RegistryError::ServiceStopped)
    }

    /// Assign a behavior from this registry's own user interface
    pub async fn assign_behavior(
        &self,
        app_id: impl Into<String>,
        behavior: Behavior,
    ) -> Result<(), RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Command::AssignBehavior {
            app_id: app_id.into(),
            behavior,
            respond_to,
        })
        .await?;
        response.await.map_err(|_| RegistryError::ServiceStopped)?
    }

    /// Stop the service task and wait for it to unsubscribe and exit
    pub async fn shutdown(&mut self) -> Result<(), RegistryError> {
        info!("Shutting down registry service");
        self.cancellation_token.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Registry service task failed");
                return Err(RegistryError::Other(e.into()));
            }
        }
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<(), RegistryError> {
        if self.cancellation_token.is_cancelled() {
            return Err(RegistryError::ServiceStopped);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| RegistryError::ServiceStopped)
    }
}

impl Drop for RegistryHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
