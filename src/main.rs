mod capture;
mod cli;
mod cluster;
mod command;
mod config;
mod connection;
mod dispatcher;
mod gate;
mod log;
mod registry;
mod shutdown;
mod validator;
mod watchdog;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use capture::Capture;
use cli::{Cli, Command};
use cluster::{ProcessLauncher, ScriptTeardown};
use config::HarnessConfig;
use connection::ConnectionCtx;
use dispatcher::Dispatcher;
use gate::ReadGate;
use log::{RunEvent, RunLog};
use registry::NodeRegistry;
use shutdown::ShutdownController;
use validator::Report;
use watchdog::Watchdog;

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults — no .chatcheck/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

fn render_config_human(config: &HarnessConfig, config_path: Option<&Path>) -> String {
    let mut output = String::new();
    output.push_str("Cluster\n");
    push_kv(&mut output, "program", &config.cluster.program);
    push_kv(&mut output, "teardown", &config.cluster.teardown);
    push_kv(&mut output, "host", &config.cluster.host);
    push_kv(&mut output, "passthrough", config.cluster.passthrough);
    output.push('\n');

    output.push_str("Timing\n");
    push_kv(
        &mut output,
        "settle",
        format!("{}s", config.timing.settle_secs),
    );
    push_kv(
        &mut output,
        "recovery",
        format!("{}s", config.timing.recovery_secs),
    );
    push_kv(
        &mut output,
        "grace",
        format!("{}s", config.timing.grace_secs),
    );
    push_kv(
        &mut output,
        "watchdog",
        format!("{}s", config.timing.watchdog_secs),
    );
    push_kv(
        &mut output,
        "shutdown_wait",
        format!("{}s", config.timing.shutdown_wait_secs),
    );
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

fn render_config_json(config: &HarnessConfig, config_path: Option<&Path>) -> Result<String> {
    let payload = serde_json::json!({
        "cluster": {
            "program": &config.cluster.program,
            "teardown": &config.cluster.teardown,
            "host": &config.cluster.host,
            "passthrough": config.cluster.passthrough
        },
        "timing": {
            "settle_secs": config.timing.settle_secs,
            "recovery_secs": config.timing.recovery_secs,
            "grace_secs": config.timing.grace_secs,
            "watchdog_secs": config.timing.watchdog_secs,
            "shutdown_wait_secs": config.timing.shutdown_wait_secs
        },
        "source_path": config_source_label(config_path)
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

fn open_script(script: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match script {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(std::io::stdin().lock())),
    }
}

fn report_failures(report: &Report) {
    for failure in &report.failures {
        match failure.line {
            Some(line) => eprintln!(
                "  group {}: {} (output line {})",
                failure.group + 1,
                failure.kind,
                line + 1
            ),
            None => eprintln!("  group {}: {}", failure.group + 1, failure.kind),
        }
    }
}

fn run_harness(
    config: &HarnessConfig,
    script: Option<&Path>,
    expected: Option<&Path>,
    log_file: Option<&Path>,
) -> Result<()> {
    let registry = Arc::new(NodeRegistry::new());
    let gate = Arc::new(ReadGate::new());
    let capture = Arc::new(Capture::new());
    let log = Arc::new(match log_file {
        Some(path) => RunLog::to_file(path)?,
        None => RunLog::disabled(),
    });
    let ctx = ConnectionCtx {
        registry: Arc::clone(&registry),
        gate: Arc::clone(&gate),
        capture: Arc::clone(&capture),
        log: Arc::clone(&log),
    };

    let shutdown = Arc::new(ShutdownController::new(
        registry,
        gate,
        Arc::clone(&capture),
        Arc::clone(&log),
        Box::new(ScriptTeardown::new(config.cluster.teardown.clone())),
        config.timing.shutdown_wait(),
        config.timing.grace(),
    ));

    // The watchdog bounds the whole run; when it fires, pending reads are
    // abandoned and the process exits on its thread.
    let _watchdog = {
        let shutdown = Arc::clone(&shutdown);
        let log = Arc::clone(&log);
        Watchdog::spawn(config.timing.watchdog(), move || {
            log.append(RunEvent::WatchdogFired);
            shutdown.run(true);
            std::process::exit(0);
        })
    };

    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.run(true);
            std::process::exit(0);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let launcher = Box::new(ProcessLauncher::new(
        config.cluster.program.clone(),
        config.cluster.passthrough,
    ));
    let mut dispatcher = Dispatcher::new(
        ctx,
        launcher,
        config.cluster.host.clone(),
        config.timing.settle(),
        config.timing.recovery(),
    );

    let input = open_script(script)?;
    let outcome = dispatcher.run(input);
    info!(?outcome, "command stream finished");
    shutdown.run(outcome.forced());

    if let Some(expected_path) = expected {
        let text = std::fs::read_to_string(expected_path)
            .with_context(|| format!("failed to read {}", expected_path.display()))?;
        let entries = validator::parse_expected(&text)?;
        let report = validator::validate(&capture.snapshot(), &entries);
        log.append(RunEvent::Verdict {
            correct: report.is_correct(),
            failures: report.kinds().iter().map(ToString::to_string).collect(),
        });
        eprintln!("{}", report.verdict());
        report_failures(&report);
    }

    Ok(())
}

fn run_check(output: &Path, expected: &Path) -> Result<()> {
    let output_text = std::fs::read_to_string(output)
        .with_context(|| format!("failed to read {}", output.display()))?;
    let lines: Vec<String> = output_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    let expected_text = std::fs::read_to_string(expected)
        .with_context(|| format!("failed to read {}", expected.display()))?;
    let entries = validator::parse_expected(&expected_text)?;

    let report = validator::validate(&lines, &entries);
    println!("{}", report.verdict());
    report_failures(&report);
    if !report.is_correct() {
        std::process::exit(1);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_config_command = matches!(&cli.command, Command::Config { .. });

    let filter = match cli.verbose {
        0 if is_config_command => "chatcheck=warn",
        0 => "chatcheck=info",
        1 => "chatcheck=debug",
        _ => "chatcheck=trace",
    };
    // stdout is the captured-output channel; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (mut config, config_path) = HarnessConfig::load(&cwd)?;

    if !is_config_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .chatcheck/config.toml found, using defaults"),
        }
    }

    match cli.command {
        Command::Run {
            script,
            expected,
            program,
            teardown,
            passthrough,
            log_file,
        } => {
            if let Some(program) = program {
                config.cluster.program = program;
            }
            if let Some(teardown) = teardown {
                config.cluster.teardown = teardown;
            }
            if passthrough {
                config.cluster.passthrough = true;
            }
            run_harness(
                &config,
                script.as_deref(),
                expected.as_deref(),
                log_file.as_deref(),
            )?;
        }
        Command::Check { output, expected } => {
            run_check(&output, &expected)?;
        }
        Command::Config { json } => {
            if json {
                println!("{}", render_config_json(&config, config_path.as_deref())?);
            } else {
                print!("{}", render_config_human(&config, config_path.as_deref()));
            }
        }
    }

    Ok(())
}
