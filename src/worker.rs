//! `ragq work`: answer one dispatched job and exit.
//!
//! The payload is the job JSON the orchestrator dispatched, given as an
//! argument or on stdin (`-` or no argument). A failed job leaves its
//! record pending and the command exits non-zero.

use anyhow::{Context, Result};
use std::io::Read;

use rag_query_core::job::FinalizeOutcome;
use rag_query_core::models::QueryJob;

use crate::config::Config;
use crate::query::build_services;

/// Parse a dispatched payload.
pub fn parse_payload(raw: &str) -> Result<QueryJob> {
    serde_json::from_str(raw.trim()).context("Invalid job payload")
}

fn read_payload(arg: Option<&str>) -> Result<String> {
    match arg {
        Some(raw) if raw != "-" => Ok(raw.to_string()),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read job payload from stdin")?;
            Ok(buf)
        }
    }
}

pub async fn run_work(config: &Config, payload: Option<&str>) -> Result<()> {
    let job = parse_payload(&read_payload(payload)?)?;
    let services = build_services(config).await?;

    match services.worker.handle(&job).await? {
        FinalizeOutcome::Applied => println!("completed {}", job.query_id),
        FinalizeOutcome::AlreadyComplete => println!("already complete {}", job.query_id),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        let job = QueryJob::new("What is LFH?");
        let raw = serde_json::to_string(&job).unwrap();
        let parsed = parse_payload(&format!("  {}\n", raw)).unwrap();
        assert_eq!(parsed, job);
        assert!(!parsed.is_complete);
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert!(parse_payload("not json").is_err());
        assert!(parse_payload(r#"{"query_text":"q"}"#).is_err());
    }
}
