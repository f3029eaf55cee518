// `notetally once`: run a single aggregation cycle.

use clap::Args;
use notetally_common::types::{note_file_name, ProviderKind};
use notetally_daemon::engine::CycleOutcome;
use notetally_daemon::logging;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::ConfigArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct OnceArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Notes backend: s3 | web_clipper.
    #[arg(long, default_value = "s3")]
    provider: ProviderKind,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnceReport {
    pub provider: ProviderKind,
    pub holder: String,
    pub target: String,
    pub written: bool,
    pub entries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl OnceReport {
    fn new(provider: ProviderKind, holder: &str, note_id: &str, outcome: CycleOutcome) -> Self {
        let (written, entries, hash) = match outcome {
            CycleOutcome::Written { entries, hash } => (true, entries, Some(hash)),
            CycleOutcome::Unchanged { entries } => (false, entries, None),
        };
        Self {
            provider,
            holder: holder.to_string(),
            target: note_file_name(note_id),
            written,
            entries,
            hash,
        }
    }
}

pub fn run(args: OnceArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = super::block_on(run_cycle(&args)).and_then(|result| result);

    match result {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn run_cycle(args: &OnceArgs) -> anyhow::Result<OnceReport> {
    let config = args.config.load()?;
    let outcome = notetally_daemon::runtime::run_once(&config, args.provider)
        .instrument(logging::service_span())
        .await?;
    Ok(OnceReport::new(args.provider, &config.app_id, &config.note_id, outcome))
}

fn format_human(report: &OnceReport) -> String {
    if report.written {
        let hash = report.hash.as_deref().unwrap_or_default();
        format!(
            "Wrote {} todo(s) to {} via {} (hash {})",
            report.entries,
            report.target,
            report.provider,
            &hash[..hash.len().min(12)]
        )
    } else {
        format!("{} unchanged: {} todo(s), nothing written", report.target, report.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written() -> OnceReport {
        OnceReport::new(
            ProviderKind::ObjectStore,
            "4f2a",
            "target",
            CycleOutcome::Written { entries: 3, hash: "0123456789abcdef0123".into() },
        )
    }

    #[test]
    fn report_from_written_outcome() {
        let report = written();
        assert!(report.written);
        assert_eq!(report.entries, 3);
        assert_eq!(report.target, "target.md");
        assert_eq!(report.hash.as_deref(), Some("0123456789abcdef0123"));
    }

    #[test]
    fn human_format_shortens_hash() {
        let output = format_human(&written());
        assert_eq!(output, "Wrote 3 todo(s) to target.md via s3 (hash 0123456789ab)");
    }

    #[test]
    fn human_format_unchanged() {
        let report = OnceReport::new(
            ProviderKind::WebClipper,
            "4f2a",
            "target",
            CycleOutcome::Unchanged { entries: 0 },
        );
        assert_eq!(format_human(&report), "target.md unchanged: 0 todo(s), nothing written");
    }

    #[test]
    fn json_format_roundtrips() {
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &written(), format_human).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(raw["provider"], "s3");
        let parsed: OnceReport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, written());
    }

    #[test]
    fn unchanged_report_omits_hash() {
        let report = OnceReport::new(
            ProviderKind::ObjectStore,
            "4f2a",
            "target",
            CycleOutcome::Unchanged { entries: 1 },
        );
        let raw = serde_json::to_value(&report).unwrap();
        assert!(raw.get("hash").is_none());
    }
}
