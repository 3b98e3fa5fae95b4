//! CLI command handling
//!
//! Resolves the effective device and configuration for a command, builds a
//! sequencer with the console reporter attached, and runs it.

use std::path::Path;

use crate::commands::{Commands, TargetArgs};
use crate::common::config::{Config, SettleMode};
use crate::common::{paths, Error, Result};
use crate::families::DeviceFamily;
use crate::invoker::{Invoker, RetryPolicy};
use crate::ledger::{RunReport, Session};
use crate::report::{self, ConsoleReporter};
use crate::script::{self, ScriptDevice};
use crate::sequencer::{run_suite, Interrupt, Sequencer};

const BANNER: &str = "Device API Conformance Suite";

/// Dispatch a CLI command
///
/// Returns the run report for commands that exercise a device, `None` for
/// informational commands.
pub async fn dispatch(command: Commands, interrupt: Interrupt) -> Result<Option<RunReport>> {
    match command {
        Commands::Run { target, basic_only } => {
            let resolved = Resolved::new(&target, &ScriptDevice::default())?;
            let mut seq = resolved.sequencer(interrupt)?;
            let family = resolved.family;

            run_suite(&mut seq, family.type_tag(), family.bracket(basic_only)).await;

            finish(seq, target.report.as_deref()).map(Some)
        }

        Commands::Script { path, target } => {
            let script = script::load(&path)?;
            let resolved = Resolved::new(&target, &script.device)?;
            let mut seq = resolved.sequencer(interrupt)?;

            script::run_script(&mut seq, &script).await;

            finish(seq, target.report.as_deref()).map(Some)
        }

        Commands::Paths => {
            let show = |p: Option<std::path::PathBuf>| {
                p.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(unavailable)".to_string())
            };
            println!("Config file: {}", show(paths::config_path()));
            println!("Log directory: {}", show(paths::log_dir()));
            Ok(None)
        }
    }
}

/// Effective settings after CLI flags, script defaults and config file
struct Resolved {
    config: Config,
    address: String,
    family: DeviceFamily,
}

impl Resolved {
    fn new(target: &TargetArgs, script: &ScriptDevice) -> Result<Self> {
        let mut config = match &target.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if target.poll {
            config.settle.mode = SettleMode::Poll;
        }

        let address = target
            .address
            .clone()
            .or_else(|| script.address.clone())
            .unwrap_or_else(|| config.device.address.clone());

        let family = match target.family.or(script.family) {
            Some(family) => family,
            None => config.device.family.parse().map_err(Error::Config)?,
        };

        tracing::info!(%address, %family, settle = ?config.settle.mode, "Resolved target");
        Ok(Self {
            config,
            address,
            family,
        })
    }

    fn sequencer(&self, interrupt: Interrupt) -> Result<Sequencer> {
        let policy = RetryPolicy::from_millis(self.config.retry.unit_ms);
        let invoker = Invoker::http(&self.address, policy)?;

        let mut reporter = ConsoleReporter::stdout();
        reporter.banner(BANNER, &self.address, self.family.type_tag());

        let mut session = Session::new(self.address.clone(), self.family.to_string());
        session.ledger_mut().subscribe(Box::new(reporter));

        Ok(Sequencer::new(invoker, session, self.config.clone(), interrupt))
    }
}

fn finish(seq: Sequencer, report_path: Option<&Path>) -> Result<RunReport> {
    let report = seq.finish();
    if let Some(path) = report_path {
        report::write_json(&report, path)?;
    }
    Ok(report)
}
