// `notetally locks`: list lock markers on the object store.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::ConfigArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct LocksArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub holder: String,
    /// Marker belongs to the configured `app_id`. Absent when the config
    /// sets none, since a generated id never matches a running instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocksReport {
    pub holders: Vec<LockHolder>,
    /// `app_id` from the config, if one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl LocksReport {
    fn new(holders: Vec<String>, app_id: Option<&str>) -> Self {
        let holders = holders
            .into_iter()
            .map(|holder| LockHolder { is_self: app_id.map(|id| holder == id), holder })
            .collect();
        Self { holders, app_id: app_id.map(str::to_string) }
    }
}

pub fn run(args: LocksArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = super::block_on(list_holders(&args)).and_then(|result| result);

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

async fn list_holders(args: &LocksArgs) -> anyhow::Result<LocksReport> {
    let config = args.config.load()?;
    let lock = super::object_store_lock(&config).await?;
    let holders = lock.holders().await?;
    let app_id = (!config.app_id_generated).then_some(config.app_id.as_str());
    Ok(LocksReport::new(holders, app_id))
}

fn format_human(report: &LocksReport) -> String {
    if report.holders.is_empty() {
        return "No lock markers present.".into();
    }

    let mut lines = vec![format!("Lock markers ({})", report.holders.len())];
    for entry in &report.holders {
        let suffix = if entry.is_self == Some(true) { " (this instance)" } else { "" };
        lines.push(format!("  {}{suffix}", entry.holder));
    }
    if report.holders.len() > 1 {
        lines.push(String::new());
        lines.push("  Several markers: holders are contending or one is stale.".into());
    }
    if report.app_id.is_none() {
        lines.push(String::new());
        lines.push("  No app_id configured: this instance's marker cannot be identified.".into());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flags_own_marker() {
        let report = LocksReport::new(vec!["4f2a".into(), "9c1d".into()], Some("9c1d"));
        assert_eq!(report.holders[0].is_self, Some(false));
        assert_eq!(report.holders[1].is_self, Some(true));
    }

    #[test]
    fn human_format_empty() {
        assert_eq!(format_human(&LocksReport::new(vec![], Some("me"))), "No lock markers present.");
    }

    #[test]
    fn human_format_lists_holders() {
        let output = format_human(&LocksReport::new(vec!["4f2a".into(), "me".into()], Some("me")));
        assert!(output.starts_with("Lock markers (2)\n  4f2a\n  me (this instance)"));
        assert!(output.contains("contending or one is stale"));
        assert!(!output.contains("No app_id configured"));
    }

    #[test]
    fn without_configured_app_id_ownership_is_unknown() {
        let report = LocksReport::new(vec!["4f2a".into()], None);
        assert_eq!(report.holders[0].is_self, None);

        let output = format_human(&report);
        assert!(!output.contains("(this instance)"));
        assert!(output.ends_with("No app_id configured: this instance's marker cannot be identified."));

        let raw = serde_json::to_value(&report).unwrap();
        assert!(raw["holders"][0].get("is_self").is_none());
        assert!(raw.get("app_id").is_none());
    }

    #[test]
    fn json_format_roundtrips() {
        let report = LocksReport::new(vec!["4f2a".into()], Some("me"));
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &report, format_human).unwrap();
        let parsed: LocksReport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, report);
    }
}
