mod config;
mod helper;
mod hostapd;
mod lifecycle;
mod radio;
mod rules;
mod supervisor;
mod users;

use std::path::Path;

use clap::Parser;
use log::{error, info, warn};
use tokio::signal::unix::{SignalKind, signal};

use config::{ConfigError, DEFAULT_CONFIG_PATH, SettingsOverlay};
use lifecycle::{BringUpPlan, Controller, Stage};
use radio::{NmcliDetector, RadioDetector};
use supervisor::SystemSupervisor;

const EXIT_PRIVILEGE: i32 = -1;
const EXIT_CONFIG: i32 = -2;
const EXIT_INTERFACE: i32 = -3;
const EXIT_DAEMON_CONFIG: i32 = -4;
const EXIT_HOST_MAP: i32 = -5;
const EXIT_BRING_UP: i32 = -6;
const EXIT_TEARDOWN: i32 = -7;

#[derive(Parser, Debug)]
struct Args {
    // Path to the configuration file.
    #[arg(long, default_value_t = DEFAULT_CONFIG_PATH.to_string())]
    config: String,

    // Upstream DNS server handed to clients.
    #[arg(long)]
    dns: Option<String>,

    // Upstream (internet facing) interface.
    #[arg(long)]
    lan: Option<String>,

    // Wireless interface the access point runs on.
    #[arg(long)]
    wlan: Option<String>,

    // Host mappings, `host:ip` separated by commas.
    #[arg(long)]
    hosts: Option<String>,

    #[arg(long, short)]
    verbose: bool,

    // Print what would be done and exit.
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn overlay(&self) -> SettingsOverlay {
        SettingsOverlay {
            upstream: self.lan.clone(),
            wireless: self.wlan.clone(),
            dns: self.dns.clone(),
            hosts: self.hosts.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    std_logger::Config::logfmt().init();
    log::set_max_level(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    if !args.dry_run && !nix::unistd::geteuid().is_root() {
        error!("must be run as root");
        return EXIT_PRIVILEGE;
    }

    let config = match config::load(&args.config, &args.overlay()) {
        Ok(config) => config,
        Err(e @ ConfigError::MalformedHostMap(_)) => {
            error!("{}: {}", args.config, e);
            return EXIT_HOST_MAP;
        }
        Err(e) => {
            error!("{}: {}", args.config, e);
            return EXIT_CONFIG;
        }
    };

    if !args.dry_run && !is_wireless(&config.settings.wireless) {
        error!("{} is not a usable wireless interface", config.settings.wireless);
        return EXIT_INTERFACE;
    }

    if let Err(e) = hostapd::render(hostapd::DEFAULT_TEMPLATE, &config.settings, &config.overrides) {
        error!("cannot generate hostapd config: {}", e);
        return EXIT_DAEMON_CONFIG;
    }

    let radio = NmcliDetector.detect().await;
    let plan = BringUpPlan::new(config, radio);

    if args.dry_run {
        return match plan.describe().and_then(|plan| Ok(serde_json::to_string_pretty(&plan)?)) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                error!("cannot describe plan: {:#}", e);
                EXIT_DAEMON_CONFIG
            }
        };
    }

    // Registered before bring-up so a signal received mid bring-up is held
    // until the access point is up and then triggers teardown.
    let (mut interrupt, mut terminate) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
        (Err(e), _) | (_, Err(e)) => {
            error!("cannot register signal handlers: {}", e);
            return EXIT_BRING_UP;
        }
    };
    let shutdown = async move {
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received"),
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    };

    let mut controller = Controller::new(SystemSupervisor::new(), plan);
    let outcome = controller.run(shutdown).await;
    let stage = controller.stage();
    info!(stage = stage.name(); "exiting");

    match outcome {
        Ok(report) if report.is_clean() => 0,
        Ok(report) => {
            for warning in &report.warnings {
                warn!("teardown: {}", warning);
            }
            EXIT_TEARDOWN
        }
        Err(e) => {
            error!("{}", e);
            for warning in &e.teardown.warnings {
                warn!("teardown: {}", warning);
            }
            match e.stage {
                Stage::CredentialsValidated => EXIT_CONFIG,
                Stage::DaemonConfigWritten => EXIT_DAEMON_CONFIG,
                _ => EXIT_BRING_UP,
            }
        }
    }
}

fn is_wireless(interface: &str) -> bool {
    let base = Path::new("/sys/class/net").join(interface);
    base.join("wireless").exists() || base.join("phy80211").exists()
}
