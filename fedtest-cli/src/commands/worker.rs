//! Child entry point: one request on stdin, one result line on stdout.

use anyhow::{Context, Result};
use fedtest_protocol::{run_role, LocalBackend};
use fedtest_types::WorkerRequest;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;

/// Run the worker command.
pub async fn run() -> Result<ExitCode> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read worker request")?;
    let request: WorkerRequest =
        serde_json::from_str(&input).context("Failed to decode worker request")?;

    let result = run_role(&request, &LocalBackend::new()).await;
    let line = result.to_json_line().context("Failed to encode result")?;
    println!("{}", line);
    Ok(ExitCode::SUCCESS)
}
