//! Prints a job part plan file as JSON.
//!
//! Usage: `plan-inspect <plan-file>`

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use shuttle_common::{JobStatus, TransferStatus};
use shuttle_plan::{PlanFile, PlanHeader};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanDump {
    path: PathBuf,
    job_status: JobStatus,
    header: PlanHeader,
    transfers: Vec<TransferDump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferDump {
    index: u32,
    source: String,
    destination: String,
    source_size: u64,
    status: TransferStatus,
    completion_time: u64,
}

fn dump(path: &Path) -> anyhow::Result<PlanDump> {
    let mut plan =
        PlanFile::open(path).with_context(|| format!("failed to open plan {}", path.display()))?;

    let mut transfers = Vec::with_capacity(plan.num_transfers() as usize);
    for record in plan.transfers() {
        let record = record?;
        let (source, destination) = plan
            .source_and_destination(record.index())
            .with_context(|| format!("transfer {}", record.index()))?;
        transfers.push(TransferDump {
            index: record.index(),
            source: source.to_owned(),
            destination: destination.to_owned(),
            source_size: record.source_size(),
            status: record.transfer_status()?,
            completion_time: record.completion_time(),
        });
    }

    let out = PlanDump {
        path: path.to_path_buf(),
        job_status: plan.job_status()?,
        header: plan.header()?,
        transfers,
    };
    plan.unmap()?;
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: plan-inspect <plan-file>")?;

    let out = dump(&path)?;
    tracing::info!(
        path = %path.display(),
        transfers = out.transfers.len(),
        "plan loaded"
    );
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
