// `notetally unlock`: delete a lock marker left by a crashed holder.
//
// Markers are never expired automatically; this is the manual escape hatch.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::ConfigArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct UnlockArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Holder id whose marker should be deleted (see `notetally locks`).
    #[arg(long)]
    holder: String,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockReport {
    pub holder: String,
    /// A marker for `holder` was present before the delete.
    pub removed: bool,
    /// Markers still present afterwards.
    pub remaining: Vec<String>,
}

pub fn run(args: UnlockArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    if args.holder.trim().is_empty() {
        let error = anyhow::anyhow!("--holder must not be empty");
        output::print_error(format, "USAGE", &error.to_string());
        return Err(error);
    }

    let result = super::block_on(remove_marker(&args)).and_then(|result| result);
    match result {
        Ok(report) => {
            if !report.removed {
                output::print_warning(
                    format,
                    "NO_MARKER",
                    &format!("no marker found for holder `{}`", report.holder),
                );
            }
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn remove_marker(args: &UnlockArgs) -> anyhow::Result<UnlockReport> {
    let config = args.config.load()?;
    let lock = super::object_store_lock(&config).await?;

    let before = lock.holders().await?;
    lock.release(&args.holder).await?;
    let remaining = lock.holders().await?;

    Ok(UnlockReport {
        holder: args.holder.clone(),
        removed: before.contains(&args.holder),
        remaining,
    })
}

fn format_human(report: &UnlockReport) -> String {
    let mut line = if report.removed {
        format!("Removed lock marker of {}.", report.holder)
    } else {
        format!("Nothing to remove for {}.", report.holder)
    };
    if !report.remaining.is_empty() {
        line.push_str(&format!(" Still held by: {}", report.remaining.join(", ")));
    }
    line
}
