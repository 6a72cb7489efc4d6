//! Entropy sources behind the `EntropySource` port.
//!
//! `LocalEntropy` simulates the draw with the process RNG and is the default
//! everywhere. `ProcessEntropy` shells out to an external command (e.g. a
//! hardware-anchored RNG bridge) for deployments that need an auditable
//! entropy certificate; its JSON contract is a bit-count map on stdout.

use crate::domain::ports::{BitCounts, EntropySource};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info};

/// Wall-clock budget for the external entropy process.
const PROCESS_TIMEOUT: Duration = Duration::from_secs(90);

/// Coin-flip entropy from the local RNG.
pub struct LocalEntropy;

#[async_trait]
impl EntropySource for LocalEntropy {
    async fn draw(&self, shots: u32) -> Result<BitCounts> {
        let mut rng = rand::rng();
        let mut counts = BitCounts::default();
        for _ in 0..shots {
            if rng.random::<bool>() {
                counts.ones += 1;
            } else {
                counts.zeros += 1;
            }
        }
        Ok(counts)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// External entropy command, invoked as `<command> --shots N`.
pub struct ProcessEntropy {
    command: String,
}

impl ProcessEntropy {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl EntropySource for ProcessEntropy {
    async fn draw(&self, shots: u32) -> Result<BitCounts> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .context("empty entropy command")?;

        let mut cmd = Command::new(program);
        cmd.args(parts).arg("--shots").arg(shots.to_string());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(PROCESS_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                error!("entropy command timed out ({}s)", PROCESS_TIMEOUT.as_secs());
                anyhow::anyhow!("entropy command timed out after {}s", PROCESS_TIMEOUT.as_secs())
            })?
            .context("failed to spawn entropy command")?;

        if !output.status.success() {
            bail!(
                "entropy command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let counts: HashMap<String, u64> =
            serde_json::from_str(stdout.trim()).context("entropy command output is not a bit-count map")?;

        let result = BitCounts {
            zeros: counts.get("0").copied().unwrap_or(0),
            ones: counts.get("1").copied().unwrap_or(0),
        };
        info!(
            "entropy draw: {} ones / {} shots",
            result.ones,
            result.total()
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_entropy_counts_sum_to_shots() {
        let source = LocalEntropy;
        let counts = source.draw(100).await.unwrap();
        assert_eq!(counts.total(), 100);
        assert!(counts.fraction_ones() >= 0.0 && counts.fraction_ones() <= 1.0);
    }

    #[tokio::test]
    async fn test_local_entropy_zero_shots() {
        let counts = LocalEntropy.draw(0).await.unwrap();
        assert_eq!(counts.total(), 0);
        assert_eq!(counts.fraction_ones(), 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_entropy_parses_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("entropy.sh");
        std::fs::write(&script, "#!/bin/sh\necho '{\"0\": 40, \"1\": 60}'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = ProcessEntropy::new(script.to_str().unwrap());
        let counts = source.draw(100).await.unwrap();
        assert_eq!(counts.zeros, 40);
        assert_eq!(counts.ones, 60);
    }

    #[tokio::test]
    async fn test_process_entropy_missing_binary_fails() {
        let source = ProcessEntropy::new("definitely-not-a-real-binary-zzz");
        assert!(source.draw(10).await.is_err());
    }
}
