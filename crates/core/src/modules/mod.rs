use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::status::{ModuleName, ModuleStatusEvent, StatusLevel};

/// Trait every periodic subsystem implements.
///
/// `run` owns the module for its whole lifetime: it loops on its own timer,
/// catches its per-tick faults internally (reporting them as `moduleStatus`
/// events), and only returns `Err` for a fatal condition such as a failed
/// socket bind.
#[async_trait]
pub trait DeviceModule: Send {
    fn name(&self) -> ModuleName;

    async fn run(self: Box<Self>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()>;
}

/// Spawns registered modules onto the runtime and supervises their handles.
pub struct ModuleManager {
    bus: EventBus,
    shutdown: watch::Sender<bool>,
    handles: Vec<(ModuleName, JoinHandle<anyhow::Result<()>>)>,
}

impl ModuleManager {
    pub fn new(bus: EventBus) -> Self {
        let (shutdown, _) = watch::channel(false);
        ModuleManager {
            bus,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a module in its own task. A module that returns an error (or
    /// panics) is reported as `errored`; the rest of the device keeps running.
    pub fn spawn(&mut self, module: Box<dyn DeviceModule>) {
        let name = module.name();
        let bus = self.bus.clone();
        let shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let result = module.run(shutdown).await;
            if let Err(ref error) = result {
                log::error!("module {} exited with error: {error:#}", name);
                bus.publish_module_status(ModuleStatusEvent::new(
                    name,
                    StatusLevel::Errored,
                    format!("{error:#}"),
                ));
            }
            result
        });

        self.handles.push((name, handle));
        log::info!("module {} started", name);
    }

    pub fn module_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for every module to drain.
    pub async fn shutdown(mut self) {
        log::info!("stopping {} modules", self.handles.len());
        let _ = self.shutdown.send(true);

        for (name, handle) in self.handles.drain(..) {
            match handle.await {
                Ok(Ok(())) => log::info!("module {} stopped", name),
                Ok(Err(_)) => {} // already reported by the spawn wrapper
                Err(join_error) => {
                    log::error!("module {} task failed: {join_error}", name);
                    self.bus.publish_module_status(ModuleStatusEvent::new(
                        name,
                        StatusLevel::Errored,
                        format!("task failure: {join_error}"),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TickOnce {
        name: ModuleName,
        reporter: crate::status::StatusReporter,
    }

    #[async_trait]
    impl DeviceModule for TickOnce {
        fn name(&self) -> ModuleName {
            self.name
        }

        async fn run(self: Box<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
            self.reporter.operational();
            let _ = shutdown.changed().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl DeviceModule for Failing {
        fn name(&self) -> ModuleName {
            ModuleName::SacnOutput
        }

        async fn run(self: Box<Self>, _shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
            anyhow::bail!("socket bind refused")
        }
    }

    #[tokio::test]
    async fn test_spawned_module_runs_until_shutdown() {
        let bus = EventBus::new();
        let mut status_rx = bus.subscribe_module_status();
        let mut manager = ModuleManager::new(bus.clone());

        manager.spawn(Box::new(TickOnce {
            name: ModuleName::Scheduler,
            reporter: crate::status::StatusReporter::new(bus.clone(), ModuleName::Scheduler),
        }));

        let event = status_rx.recv().await.unwrap();
        assert_eq!(event.level, StatusLevel::Operational);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_module_reports_errored() {
        let bus = EventBus::new();
        let mut status_rx = bus.subscribe_module_status();
        let mut manager = ModuleManager::new(bus.clone());

        manager.spawn(Box::new(Failing));

        let event = status_rx.recv().await.unwrap();
        assert_eq!(event.module, ModuleName::SacnOutput);
        assert_eq!(event.level, StatusLevel::Errored);
        manager.shutdown().await;
    }
}
