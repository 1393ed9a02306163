use crate::config::runner::RunnerConfig;
use crate::config::types::{TestOutput, TestResult};
use crate::exec::inline::InlineRunner;
use crate::exec::runner::{ForkedRunner, TestRunner};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command as an isolated test and report its verdict
    Run {
        /// Timeout in milliseconds (overrides the config file)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Runner configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Close inherited descriptors in the child
        #[arg(long)]
        close_fds: bool,
        /// Run in this process without isolation or capture
        #[arg(long, conflicts_with_all = ["timeout_ms", "close_fds"])]
        inline: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Command and arguments to execute
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

/// Verdict and captured streams of one run, as printed with `--json`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub result: TestResult,
    pub output: TestOutput,
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            timeout_ms,
            config,
            close_fds,
            inline,
            json,
            command,
        } => {
            let config = build_config(config, timeout_ms, close_fds)?;
            log::debug!("Running {:?} with {:?}", command, config);

            let runner: Box<dyn TestRunner> = if inline {
                Box::new(InlineRunner::new())
            } else {
                Box::new(ForkedRunner::with_config(config)?)
            };

            let mut output = TestOutput::new();
            let result = runner.run(&|| command_test(&command), &mut output);
            let passed = result.passed;
            emit_report(RunReport { result, output }, json)?;

            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn build_config(
    path: Option<PathBuf>,
    timeout_ms: Option<u64>,
    close_fds: bool,
) -> Result<RunnerConfig> {
    let mut config = match path {
        Some(path) => RunnerConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    if timeout_ms.is_some() {
        config.timeout_ms = timeout_ms;
    }
    config.close_inherited_fds |= close_fds;
    config.validate()?;
    Ok(config)
}

/// Test function wrapping an external command: passes when it exits successfully
fn command_test(command: &[String]) -> TestResult {
    let Some((program, args)) = command.split_first() else {
        return TestResult::fail("empty command");
    };
    match Command::new(program).args(args).status() {
        Ok(status) => TestResult::new(status.success(), status.to_string()),
        Err(e) => TestResult::fail(format!("failed to start {}: {}", program, e)),
    }
}

fn emit_report(report: RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    stdout.write_all(report.output.stdout.as_bytes())?;
    stdout.flush()?;
    let mut stderr = std::io::stderr();
    stderr.write_all(report.output.stderr.as_bytes())?;
    writeln!(stderr, "forkbox: {}", report.result)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_trailing_command() {
        let cli = Cli::try_parse_from([
            "forkbox",
            "run",
            "--timeout-ms",
            "500",
            "--json",
            "--",
            "sh",
            "-c",
            "exit 3",
        ])
        .unwrap();
        let Commands::Run {
            timeout_ms,
            json,
            command,
            ..
        } = cli.command;
        assert_eq!(timeout_ms, Some(500));
        assert!(json);
        assert_eq!(command, vec!["sh", "-c", "exit 3"]);
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["forkbox", "run"]).is_err());
    }

    #[test]
    fn inline_conflicts_with_timeout() {
        let parsed =
            Cli::try_parse_from(["forkbox", "run", "--inline", "--timeout-ms", "5", "--", "true"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let config = build_config(None, Some(750), true).unwrap();
        assert_eq!(config.timeout_ms, Some(750));
        assert!(config.close_inherited_fds);
    }

    #[test]
    fn zero_timeout_flag_is_rejected() {
        assert!(build_config(None, Some(0), false).is_err());
    }

    #[test]
    fn command_test_reports_exit_status() {
        let passed = command_test(&["true".to_string()]);
        assert!(passed.passed);

        let failed = command_test(&["sh".into(), "-c".into(), "exit 3".into()]);
        assert!(!failed.passed);
        assert!(failed.message.contains('3'));

        let missing = command_test(&["/nonexistent/forkbox-test-binary".to_string()]);
        assert!(!missing.passed);
        assert!(missing.message.starts_with("failed to start"));
    }

    #[test]
    fn report_serializes_result_and_output() {
        let report = RunReport {
            result: TestResult::fail("Timed out after 100 ms"),
            output: TestOutput {
                stdout: "partial".into(),
                stderr: String::new(),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["result"]["passed"], false);
        assert_eq!(value["result"]["message"], "Timed out after 100 ms");
        assert_eq!(value["output"]["stdout"], "partial");
    }
}
