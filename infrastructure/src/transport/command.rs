//! Secondary transport: one CLI process per request
//!
//! Each provider maps to a command template. The flattened prompt goes to
//! the process on stdin and whatever it prints on stdout is the answer.

use async_trait::async_trait;
use council_application::{AvailabilityCache, Transport};
use council_domain::util::excerpt;
use council_domain::{ErrorType, TransportKind, TransportRequest, TransportResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stderr excerpt carried into an error message
const STDERR_SNIPPET_BYTES: usize = 500;

/// Program and arguments for one provider. `{model}` in any argument is
/// replaced with the requested model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render_args(&self, model: &str) -> Vec<String> {
        self.args.iter().map(|a| a.replace("{model}", model)).collect()
    }
}

pub struct CommandTransport {
    commands: BTreeMap<String, CommandTemplate>,
    availability: AvailabilityCache,
}

impl CommandTransport {
    pub fn new(commands: BTreeMap<String, CommandTemplate>, availability: AvailabilityCache) -> Self {
        Self {
            commands,
            availability,
        }
    }

    pub fn command_for(&self, provider: &str) -> Option<&CommandTemplate> {
        self.commands.get(provider)
    }

    /// At least one configured program resolvable on `PATH`. A provider
    /// whose own program is missing fails in `send`, not here, so one
    /// uninstalled CLI does not close the channel for the others.
    fn detect(&self) -> bool {
        let mut found = false;
        for (provider, template) in &self.commands {
            match which::which(&template.program) {
                Ok(_) => found = true,
                Err(e) => debug!(
                    "Command for {} not found ({}): {}",
                    provider, template.program, e
                ),
            }
        }
        found
    }

    async fn run(&self, template: &CommandTemplate, request: &TransportRequest) -> TransportResult {
        let started = Instant::now();
        let latency_ms = || started.elapsed().as_millis() as u64;
        let args = template.render_args(&request.model);

        debug!(
            "Running {} {} for {}",
            template.program,
            args.join(" "),
            request.provider
        );

        let mut child = match Command::new(&template.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return TransportResult::error(
                    ErrorType::Network,
                    format!("could not run {}: {}", template.program, e),
                    latency_ms(),
                    TransportKind::Secondary,
                );
            }
        };

        // Feed stdin from its own task so a chatty process can't deadlock
        // against a full stdout pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.payload.flatten();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!("Command stdin closed early: {}", e);
                }
                let _ = stdin.shutdown().await;
            });
        }

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(request.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return TransportResult::error(
                    ErrorType::Network,
                    format!("{} failed: {}", template.program, e),
                    latency_ms(),
                    TransportKind::Secondary,
                );
            }
            Err(_) => {
                warn!(
                    "{} timed out after {}ms, killed",
                    template.program, request.timeout_ms
                );
                return TransportResult::error(
                    ErrorType::Timeout,
                    format!(
                        "{} timed out after {}ms",
                        template.program, request.timeout_ms
                    ),
                    latency_ms(),
                    TransportKind::Secondary,
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            let snippet = excerpt(detail, STDERR_SNIPPET_BYTES);
            warn!("{} exited with {}: {}", template.program, output.status, snippet);
            return TransportResult::error(
                ErrorType::classify(detail),
                format!("{} exited with {}: {}", template.program, output.status, snippet),
                latency_ms(),
                TransportKind::Secondary,
            );
        }

        if stdout.is_empty() {
            return TransportResult::error(
                ErrorType::classify(&stderr),
                format!(
                    "{} produced no output: {}",
                    template.program,
                    excerpt(&stderr, STDERR_SNIPPET_BYTES)
                ),
                latency_ms(),
                TransportKind::Secondary,
            );
        }

        TransportResult::ok(stdout, latency_ms(), TransportKind::Secondary)
    }
}

#[async_trait]
impl Transport for CommandTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Secondary
    }

    async fn is_available(&self) -> bool {
        self.availability.check(|| async { self.detect() }).await
    }

    async fn send(&self, request: &TransportRequest) -> TransportResult {
        match self.commands.get(&request.provider) {
            Some(template) if which::which(&template.program).is_err() => {
                TransportResult::error(
                    ErrorType::InvalidRequest,
                    format!(
                        "{} for provider '{}' not found on PATH",
                        template.program, request.provider
                    ),
                    0,
                    TransportKind::Secondary,
                )
            }
            Some(template) => self.run(template, request).await,
            None => TransportResult::error(
                ErrorType::InvalidRequest,
                format!("no command configured for provider '{}'", request.provider),
                0,
                TransportKind::Secondary,
            ),
        }
    }

    fn invalidate(&self) {
        self.availability.invalidate();
    }
}
