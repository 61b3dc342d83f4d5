//! Access point bring-up and teardown.
//!
//! The controller walks the stages in [`Stage`] order, one external action
//! at a time, and records each resource in [`LifecycleState`] only after the
//! action that creates it succeeded. Any failure stops forward progress and
//! tears down exactly what is live, newest first. Teardown is best effort:
//! every live resource gets its release attempt even if an earlier one
//! failed.

mod plan;
mod state;


use std::fmt;
use std::future::Future;
use std::path::Path;

use log::{debug, error, info, warn};

pub use plan::BringUpPlan;
pub use state::{LifecycleState, Resource, Stage, TeardownReport, TeardownWarning};

use crate::hostapd::{self, DaemonConfigFile};
use crate::rules::FilterRule;
use crate::supervisor::{Directive, StopOutcome, Supervisor};

pub struct Controller<S: Supervisor> {
    supervisor: S,
    plan: BringUpPlan,
    stage: Stage,
    state: LifecycleState,
    daemon_config: Option<DaemonConfigFile>,
    installed: Vec<FilterRule>,
}

impl<S: Supervisor> Controller<S> {
    pub fn new(supervisor: S, plan: BringUpPlan) -> Self {
        Self {
            supervisor,
            plan,
            stage: Stage::Init,
            state: LifecycleState::default(),
            daemon_config: None,
            installed: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[cfg(test)]
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Brings everything up, waits for `shutdown`, then tears down.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<TeardownReport, LifecycleError> {
        self.bring_up().await?;

        info!(stage = self.stage.name(); "access point is up, waiting for interrupt");
        shutdown.await;
        info!("interrupt received, shutting down");

        Ok(self.teardown().await)
    }

    pub async fn bring_up(&mut self) -> Result<(), LifecycleError> {
        match self.advance().await {
            Ok(()) => Ok(()),
            Err(failure) => {
                error!(stage = failure.stage.name(); "bring-up failed: {}", failure.reason);
                let teardown = self.teardown().await;
                Err(LifecycleError {
                    stage: failure.stage,
                    reason: failure.reason,
                    teardown,
                })
            }
        }
    }

    async fn advance(&mut self) -> Result<(), StageFailure> {
        self.enter(Stage::CredentialsValidated);
        self.plan
            .settings
            .validate()
            .map_err(|e| self.fail(e.to_string()))?;

        self.enter(Stage::RadioUnblocked);
        for step in self.plan.radio.steps() {
            match self.exec(&step.directive).await {
                Ok(()) => {}
                Err(reason) if !step.required => warn!("{}", reason),
                Err(reason) => return Err(self.fail(reason)),
            }
        }

        self.enter(Stage::InterfaceDown);
        let down = self.plan.interface_down();
        self.exec(&down).await.map_err(|r| self.fail(r))?;

        self.enter(Stage::DaemonConfigWritten);
        let text = hostapd::render(&self.plan.template, &self.plan.settings, &self.plan.overrides)
            .map_err(|e| self.fail(e.to_string()))?;
        let config = DaemonConfigFile::write(&text).map_err(|e| self.fail(format!("{:#}", e)))?;
        debug!("hostapd config written to {}", config.path().display());
        let daemon = hostapd::daemon_directive(config.path(), &self.plan.daemon_pid_file);
        self.daemon_config = Some(config);

        self.enter(Stage::DaemonRunning);
        self.start(&daemon, &self.plan.daemon_pid_file, Resource::ApDaemon).await?;
        self.state.ap_daemon_running = true;

        self.enter(Stage::InterfaceAddressed);
        let address = self
            .plan
            .interface_address()
            .map_err(|e| self.fail(format!("{:#}", e)))?;
        for directive in &address {
            let result = self.exec(directive).await;
            if result.is_ok() {
                self.state.interface_up = true;
            }
            result.map_err(|r| self.fail(r))?;
        }

        self.enter(Stage::HelperRunning);
        let helper = self.plan.helper().map_err(|e| self.fail(format!("{:#}", e)))?;
        self.start(&helper, &self.plan.helper_pid_file, Resource::Helper).await?;
        self.state.helper_running = true;

        self.enter(Stage::RulesInstalled);
        for rule in self.plan.filter_rules() {
            self.exec(&rule.append()).await.map_err(|r| self.fail(r))?;
            self.installed.push(rule);
            self.state.packet_rules_installed = true;
        }
        info!("{} packet filter rule(s) installed", self.installed.len());

        self.enter(Stage::ForwardingEnabled);
        let forwarding = self.plan.forwarding(true);
        self.exec(&forwarding).await.map_err(|r| self.fail(r))?;
        self.state.forwarding_enabled = true;

        Ok(())
    }

    /// Releases every live resource in reverse bring-up order. Safe to call
    /// any number of times; with nothing live it does nothing.
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.state.is_clear() && self.daemon_config.is_none() {
            if self.stage != Stage::Init {
                self.stage = Stage::Stopped;
            }
            return report;
        }

        self.stage = Stage::Teardown;
        info!(stage = self.stage.name(); "tearing down");

        if self.state.forwarding_enabled {
            let directive = self.plan.forwarding(false);
            self.release(&directive, Resource::Forwarding, &mut report).await;
            self.state.forwarding_enabled = false;
        }

        if self.state.packet_rules_installed {
            while let Some(rule) = self.installed.pop() {
                self.release(&rule.delete(), Resource::PacketRules, &mut report).await;
            }
            self.state.packet_rules_installed = false;
        }

        if self.state.helper_running {
            let pid_file = self.plan.helper_pid_file.clone();
            self.stop(&pid_file, Resource::Helper, &mut report).await;
            self.state.helper_running = false;
        }

        if self.state.ap_daemon_running {
            let pid_file = self.plan.daemon_pid_file.clone();
            self.stop(&pid_file, Resource::ApDaemon, &mut report).await;
            self.state.ap_daemon_running = false;
        }

        if self.daemon_config.take().is_some() {
            debug!("hostapd config removed");
        }

        if self.state.interface_up {
            for directive in self.plan.interface_release() {
                self.release(&directive, Resource::Interface, &mut report).await;
            }
            self.state.interface_up = false;
        }

        self.stage = Stage::Stopped;
        if report.is_clean() {
            info!("teardown complete");
        } else {
            warn!("teardown finished with {} warning(s)", report.warnings.len());
        }
        report
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        info!(stage = stage.name(); "entering stage");
    }

    fn fail(&self, reason: String) -> StageFailure {
        StageFailure {
            stage: self.stage,
            reason,
        }
    }

    async fn exec(&self, directive: &Directive) -> Result<(), String> {
        debug!("{}", directive);
        match self.supervisor.run_once(directive).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("'{}' failed", directive)),
            Err(e) => Err(format!("'{}': {:#}", directive, e)),
        }
    }

    async fn start(&self, directive: &Directive, pid_file: &Path, resource: Resource) -> Result<(), StageFailure> {
        debug!("{}", directive);
        self.supervisor
            .start_detached(directive, pid_file)
            .await
            .map_err(|e| self.fail(format!("{} did not start: {:#}", resource, e)))
    }

    async fn release(&self, directive: &Directive, resource: Resource, report: &mut TeardownReport) {
        report.actions += 1;
        if let Err(reason) = self.exec(directive).await {
            error!("teardown of {} failed: {}", resource, reason);
            report.warnings.push(TeardownWarning { resource, reason });
        }
    }

    async fn stop(&self, pid_file: &Path, resource: Resource, report: &mut TeardownReport) {
        report.actions += 1;
        match self.supervisor.stop_by_pid_file(pid_file).await {
            Ok(StopOutcome::Signalled(pid)) => info!("stopped {} (pid {})", resource, pid),
            Ok(StopOutcome::NotRunning) => {
                info!("{} not running, no pid in {}", resource, pid_file.display())
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!("teardown of {} failed: {}", resource, reason);
                report.warnings.push(TeardownWarning { resource, reason });
            }
        }
    }
}

struct StageFailure {
    stage: Stage,
    reason: String,
}

/// A bring-up stage failed. Whatever was live has already been torn down.
#[derive(Debug)]
pub struct LifecycleError {
    pub stage: Stage,
    pub reason: String,
    pub teardown: TeardownReport,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} failed: {}", self.stage, self.reason)
    }
}

impl std::error::Error for LifecycleError {}
