//! Simulator process lifecycle: terminate, regenerate the world, relaunch.
//!
//! Changing the number of simulated actors requires the simulator to reload
//! its world description, so the curriculum controller restarts it through
//! [`SimulatorControl`]. [`ProcessSimulatorControl`] owns the launched
//! simulator as a child process and polls the spawn service until the new
//! instance answers.

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::traits::Simulator;
use crate::config::{CommandSpec, SimulatorConfig};
use crate::error::TaskError;

/// Restart operations, called in order: terminate, regenerate, relaunch, wait.
pub trait SimulatorControl: Send {
    fn terminate(&mut self) -> Result<(), TaskError>;

    /// Rewrite the world description for `actors` dynamic actors.
    fn regenerate_world(&mut self, actors: usize) -> Result<(), TaskError>;

    fn relaunch(&mut self) -> Result<(), TaskError>;

    /// Block until the spawn service answers or the readiness budget runs out.
    fn wait_until_ready(&mut self) -> Result<(), TaskError>;
}

/// Restarts the simulator by running external commands.
pub struct ProcessSimulatorControl {
    config: SimulatorConfig,
    sim: Arc<dyn Simulator>,
    child: Option<Child>,
    actors: usize,
}

impl ProcessSimulatorControl {
    /// `sim` is only used to probe the spawn service after a relaunch.
    pub fn new(config: SimulatorConfig, sim: Arc<dyn Simulator>) -> Self {
        Self {
            config,
            sim,
            child: None,
            actors: 0,
        }
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(spec.render_args(self.actors, &self.config.world, &self.config.model))
            .env("ARENA_ACTORS", self.actors.to_string());
        cmd
    }

    /// Run a command to completion. A non-zero exit is only logged; `killall`
    /// exits non-zero when nothing was running.
    fn run(&self, spec: &CommandSpec) -> Result<bool, TaskError> {
        debug!(command = %spec, "running simulator command");
        let status = self
            .command(spec)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| TaskError::process(format!("run `{spec}`"), e))?;
        if !status.success() {
            debug!(command = %spec, ?status, "command exited unsuccessfully");
        }
        Ok(status.success())
    }

    /// Whether the owned simulator child is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn reap_child(&mut self) -> Result<(), TaskError> {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                child
                    .kill()
                    .map_err(|e| TaskError::process("kill simulator", e))?;
            }
            child
                .wait()
                .map_err(|e| TaskError::process("reap simulator", e))?;
        }
        Ok(())
    }
}

impl SimulatorControl for ProcessSimulatorControl {
    fn terminate(&mut self) -> Result<(), TaskError> {
        self.reap_child()?;
        for spec in &self.config.kill_commands {
            self.run(spec)?;
        }
        info!("simulator terminated");
        Ok(())
    }

    fn regenerate_world(&mut self, actors: usize) -> Result<(), TaskError> {
        self.actors = actors;
        let generator = self.config.world_generator.clone();
        if !self.run(&generator)? {
            return Err(TaskError::process(
                format!("generate world with `{generator}`"),
                std::io::Error::other("generator exited unsuccessfully"),
            ));
        }
        info!(actors, world = %self.config.world, "world regenerated");
        Ok(())
    }

    fn relaunch(&mut self) -> Result<(), TaskError> {
        let launch = self.config.launch.clone();
        let child = self
            .command(&launch)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| TaskError::process(format!("launch `{launch}`"), e))?;
        info!(pid = child.id(), command = %launch, "simulator launched");
        self.child = Some(child);
        Ok(())
    }

    fn wait_until_ready(&mut self) -> Result<(), TaskError> {
        let service = self.config.spawn_service.clone();
        let budget = self.config.ready_timeout();
        let started = Instant::now();
        loop {
            if self.sim.service_available(&service) {
                debug!(service = %service, elapsed = ?started.elapsed(), "simulator ready");
                return Ok(());
            }
            if self.child.is_some() && !self.is_running() {
                warn!("simulator process exited while waiting for readiness");
            }
            if started.elapsed() >= budget {
                return Err(TaskError::SimulatorNotReady {
                    service,
                    waited: started.elapsed(),
                });
            }
            std::thread::sleep(
                self.config
                    .ready_poll_interval()
                    .min(budget.saturating_sub(started.elapsed()))
                    .max(Duration::from_millis(1)),
            );
        }
    }
}

impl Drop for ProcessSimulatorControl {
    fn drop(&mut self) {
        if let Err(e) = self.reap_child() {
            warn!(error = %e, "failed to stop simulator on shutdown");
        }
    }
}
