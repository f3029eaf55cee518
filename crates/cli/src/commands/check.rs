// `notetally check`: configuration and backend diagnostics.

use std::io::IsTerminal;
use std::path::Path;

use chrono::Utc;
use clap::Args;
use notetally_common::types::{note_file_name, ProviderKind};
use notetally_daemon::config::AppConfig;
use notetally_daemon::provider::{Backend, NoteProvider};
use serde::Serialize;

use super::ConfigArgs;
use crate::output::{self, OutputFormat};

const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Notes backend: s3 | web_clipper.
    #[arg(long, default_value = "s3")]
    provider: ProviderKind,

    /// Only check the config file; do not contact the backend.
    #[arg(long)]
    offline: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    name: &'static str,
    status: CheckStatus,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckItem {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, detail: detail.into(), hint: None }
    }

    fn warning(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Warning, detail: detail.into(), hint: Some(hint.into()) }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, detail: detail.into(), hint: Some(hint.into()) }
    }
}

/// Checks run so far plus the first failure, which decides the exit code.
#[derive(Default)]
struct CheckRun {
    checks: Vec<CheckItem>,
    failure: Option<anyhow::Error>,
}

impl CheckRun {
    fn push(&mut self, check: CheckItem) {
        self.checks.push(check);
    }

    fn fail(&mut self, check: CheckItem, error: anyhow::Error) {
        self.checks.push(check);
        self.failure.get_or_insert(error);
    }

    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let mut report = check_config(&args.config.config, args.provider);

    if !args.offline && !report.failed() {
        if let Ok(config) = args.config.load() {
            match super::block_on(check_backend(&config, args.provider)) {
                Ok(checks) => checks.into_iter().for_each(|(check, error)| match error {
                    Some(error) => report.fail(check, error),
                    None => report.push(check),
                }),
                Err(error) => report.fail(CheckItem::fail("runtime", format!("{error:#}"), "retry"), error),
            }
        }
    }

    output::print_output(format, &report.checks, |checks| format_human(checks))?;
    match report.failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Load and validate the config file without touching the network.
fn check_config(path: &Path, provider: ProviderKind) -> CheckRun {
    let mut run = CheckRun::default();

    let config = match AppConfig::load_from(path) {
        Ok(config) => {
            run.push(CheckItem::pass("config", format!("loaded {}", path.display())));
            config
        }
        Err(error) => {
            let hint = "pass --config <path> to a YAML (.yaml/.yml) or TOML (.toml) file";
            run.fail(CheckItem::fail("config", error.to_string(), hint), error.into());
            return run;
        }
    };

    match config.validate(provider) {
        Ok(()) => run.push(CheckItem::pass(
            "settings",
            format!("target {} under {}", note_file_name(&config.note_id), config.parent_id),
        )),
        Err(error) => {
            let hint = format!("fill in the missing values for provider `{provider}`");
            run.fail(CheckItem::fail("settings", error.to_string(), hint), error.into());
            return run;
        }
    }

    match config.cron_schedule() {
        Ok(schedule) => {
            let detail = match schedule.upcoming(Utc).next() {
                Some(next) => format!("`{}`, next run at {}", config.schedule, next.to_rfc3339()),
                None => format!("`{}` never fires again", config.schedule),
            };
            run.push(CheckItem::pass("schedule", detail));
        }
        Err(error) => {
            let hint = "use a six-field cron expression with seconds, e.g. `0 * * * * *`";
            run.fail(CheckItem::fail("schedule", error.to_string(), hint), error.into());
        }
    }

    run
}

type BackendCheck = (CheckItem, Option<anyhow::Error>);

/// Connect, list notes, look for the target and inspect lock markers.
async fn check_backend(config: &AppConfig, provider: ProviderKind) -> Vec<BackendCheck> {
    let mut checks = Vec::new();

    let backend = match Backend::connect(provider, config).await {
        Ok(backend) => backend,
        Err(error) => {
            let item = CheckItem::fail("backend", format!("{error:#}"), "check the backend settings");
            checks.push((item, Some(error)));
            return checks;
        }
    };

    let names = match backend.list_names().await {
        Ok(names) => {
            checks.push((CheckItem::pass("backend", format!("{provider}: {} note(s)", names.len())), None));
            names
        }
        Err(error) => {
            let hint = "check network access and credentials";
            checks.push((CheckItem::fail("backend", error.to_string(), hint), Some(error.into())));
            return checks;
        }
    };

    let target = note_file_name(&config.note_id);
    if names.contains(&target) {
        checks.push((CheckItem::pass("target", format!("{target} exists")), None));
    } else {
        let hint = "create the target note first or fix `note_id`";
        let error = anyhow::anyhow!("target note `{target}` not found");
        checks.push((CheckItem::fail("target", format!("{target} not listed"), hint), Some(error)));
    }

    match backend.lock_holders().await {
        Ok(holders) if holders.is_empty() => {
            checks.push((CheckItem::pass("locks", "no lock markers"), None));
        }
        Ok(holders) => {
            let hint = "if a holder crashed, run: notetally unlock --holder <id>";
            let detail = format!("held by: {}", holders.join(", "));
            checks.push((CheckItem::warning("locks", detail, hint), None));
        }
        Err(error) => {
            checks.push((CheckItem::fail("locks", error.to_string(), "check access to locks/"), Some(error.into())));
        }
    }

    checks
}

fn format_human(checks: &[CheckItem]) -> String {
    let use_color = std::io::stdout().is_terminal();
    let mut lines = Vec::new();

    for check in checks {
        let (symbol, color) = match check.status {
            CheckStatus::Pass => ("✓", ANSI_GREEN),
            CheckStatus::Warning => ("⚠", ANSI_YELLOW),
            CheckStatus::Fail => ("✗", ANSI_RED),
        };
        let rendered_symbol =
            if use_color { format!("{color}{symbol}{ANSI_RESET}") } else { symbol.to_string() };
        lines.push(format!("{rendered_symbol} {}: {}", check.name, check.detail));
        if let Some(hint) = &check.hint {
            lines.push(format!("  hint: {hint}"));
        }
    }

    let passed = checks.iter().filter(|check| check.status == CheckStatus::Pass).count();
    let warnings = checks.iter().filter(|check| check.status == CheckStatus::Warning).count();
    let failed = checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    lines.push(String::new());
    lines.push(format!("Summary: {passed} passed, {warnings} warning(s), {failed} failed"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notetally_daemon::config::ConfigError;
    use tempfile::TempDir;

    use super::*;

    const COMPLETE: &str = "\
note_id: target
parent_id: inbox
s3:
  bucket: notes
  region: eu-west-1
web_clipper:
  host: http://localhost:41184
  token: secret
";

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn statuses(run: &CheckRun) -> Vec<(&'static str, CheckStatus)> {
        run.checks.iter().map(|check| (check.name, check.status)).collect()
    }

    #[test]
    fn complete_config_passes_offline_checks() {
        let dir = TempDir::new().unwrap();
        let run = check_config(&write(&dir, "config.yaml", COMPLETE), ProviderKind::ObjectStore);

        assert!(!run.failed());
        assert_eq!(
            statuses(&run),
            vec![
                ("config", CheckStatus::Pass),
                ("settings", CheckStatus::Pass),
                ("schedule", CheckStatus::Pass),
            ]
        );
        assert_eq!(run.checks[1].detail, "target target.md under inbox");
    }

    #[test]
    fn missing_file_fails_with_config_error() {
        let dir = TempDir::new().unwrap();
        let run = check_config(&dir.path().join("absent.yaml"), ProviderKind::ObjectStore);

        assert_eq!(statuses(&run), vec![("config", CheckStatus::Fail)]);
        let failure = run.failure.expect("failure should be recorded");
        assert!(failure.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn missing_provider_section_fails_settings() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.yaml", "note_id: target\nparent_id: inbox\n");
        let run = check_config(&path, ProviderKind::WebClipper);

        assert_eq!(statuses(&run), vec![("config", CheckStatus::Pass), ("settings", CheckStatus::Fail)]);
        assert!(run.checks[1].detail.contains("web_clipper.host"));
        assert!(run.checks[1].hint.as_deref().unwrap().contains("web_clipper"));
    }

    #[test]
    fn format_human_includes_summary_and_hints() {
        let checks = vec![
            CheckItem::pass("config", "ok"),
            CheckItem::warning("locks", "held by: 4f2a", "run notetally unlock"),
            CheckItem::fail("target", "missing", "create the target note"),
        ];
        let rendered = format_human(&checks);
        assert!(rendered.contains("Summary: 1 passed, 1 warning(s), 1 failed"));
        assert!(rendered.contains("hint: create the target note"));
    }

    #[test]
    fn json_output_uses_snake_case_status() {
        let checks = vec![CheckItem::pass("config", "ok")];
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &checks, |c| format_human(c)).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[0]["status"], "pass");
        assert!(parsed[0].get("hint").is_none());
    }
}
