//! Trainer backed by an external program
//!
//! One process per repetition. The experiment specification goes to stdin as
//! JSON; seeds, device and dataset locations go through the environment. The
//! last non-empty stdout line must be `{"headers": [...], "values": [...]}`.
//!
//! A child that dies from SIGINT (or exits 130) was interrupted along with the
//! rest of the foreground process group, so it reports [`Cancelled`] instead of
//! a trainer failure.

use super::{RunContext, TrainOutput, Trainer};
use crate::device::{DeviceSlot, VISIBLE_DEVICES_ENV};
use crate::isolate::Cancelled;
use anyhow::{anyhow, bail, Context};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// Shell convention for "terminated by Ctrl-C" (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[cfg(unix)]
const SIGINT: i32 = 2;

/// Whether the child was stopped by an interrupt rather than failing on its own.
#[must_use]
fn was_interrupted(status: ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(SIGINT) {
            return true;
        }
    }
    status.code() == Some(INTERRUPTED_EXIT_CODE)
}

/// Spawns `program args...` for every repetition.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTrainer {
    /// Trainer running `program` with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, ctx: &RunContext<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env("TRUENO_LAB_EXPERIMENT", ctx.spec.name());
        cmd.env("TRUENO_LAB_REPETITION", ctx.repetition.to_string());
        cmd.env("TRUENO_LAB_PRIMARY_SEED", ctx.seeds.primary_seed.to_string());
        cmd.env("TRUENO_LAB_AUXILIARY_SEED", ctx.seeds.auxiliary_seed.to_string());
        cmd.env("TRUENO_LAB_DEVICE", ctx.device.to_string());
        cmd.env("TRUENO_LAB_TRAIN_DATA", ctx.train.id().path());
        cmd.env("TRUENO_LAB_TEST_DATA", ctx.test.id().path());
        cmd.env("TRUENO_LAB_TRAIN_ROWS", ctx.train.num_rows().to_string());
        cmd.env("TRUENO_LAB_TEST_ROWS", ctx.test.num_rows().to_string());
        // Scope the child to its slot; the fallback slot sees no accelerator
        match ctx.device {
            DeviceSlot::Accelerator(i) => cmd.env(VISIBLE_DEVICES_ENV, i.to_string()),
            DeviceSlot::Fallback => cmd.env(VISIBLE_DEVICES_ENV, ""),
        };
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

/// Parse the trainer's report from its stdout.
///
/// # Errors
/// Returns error if no JSON report line is found or headers and values disagree in length
pub fn parse_report(stdout: &str) -> anyhow::Result<TrainOutput> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("trainer printed no result line"))?;
    let output: TrainOutput = serde_json::from_str(line)
        .with_context(|| format!("trainer result line is not a valid report: {line}"))?;
    if output.headers.len() != output.values.len() {
        bail!(
            "trainer reported {} header(s) but {} value(s)",
            output.headers.len(),
            output.values.len()
        );
    }
    Ok(output)
}

impl Trainer for CommandTrainer {
    fn train(&mut self, ctx: &RunContext<'_>) -> anyhow::Result<TrainOutput> {
        let spec_json = ctx.spec.to_json()?;
        let mut child = self
            .command(ctx)
            .spawn()
            .with_context(|| format!("failed to spawn trainer {}", self.program.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A trainer that ignores stdin may exit before reading it
            match stdin.write_all(spec_json.as_bytes()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(e).context("failed to send specification to trainer");
                }
                _ => {}
            }
        }
        let output = child.wait_with_output().context("trainer did not exit cleanly")?;
        debug!(status = %output.status, "trainer exited");

        if was_interrupted(output.status) {
            warn!(status = %output.status, "trainer was interrupted");
            return Err(anyhow::Error::new(Cancelled));
        }
        if !output.status.success() {
            bail!("trainer exited with {}", output.status);
        }
        parse_report(&String::from_utf8_lossy(&output.stdout))
    }
}
