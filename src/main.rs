mod agents;
mod catalog;
mod llm_client;
mod orchestrator;

use std::io::Read;
use std::path::{Path, PathBuf};

use agents::{default_roster, Case};
use anyhow::Context;
use clap::{Parser, Subcommand};
use llm_client::{build_llm_client_from_env, EchoLlmClient};
use orchestrator::{CaseRecord, MultidisciplinaryTeam, TeamConfig, TeamSummary};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "medaura-mdt",
    about = "Fan a patient case out to five specialist reasoning agents and synthesize a team summary"
)]
struct Cli {
    /// Case description to consult on; if omitted (and no subcommand is
    /// given), the description is read from stdin.
    #[arg(short, long)]
    case: Option<String>,

    /// Optional case identifier, used as the saved record's filename.
    #[arg(long)]
    case_id: Option<String>,

    /// Save the finished case record into this directory.
    #[arg(long)]
    save_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a consultation against the offline echo backend to verify wiring
    /// without credentials.
    ConsultSmoke,
    /// Export saved case records to a static catalog (one file per case plus
    /// index.json).
    Export {
        /// Directory holding saved case records.
        #[arg(long, default_value = "cases_data")]
        cases_dir: PathBuf,
        /// Output directory for the catalog.
        #[arg(long, default_value = "catalog")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::ConsultSmoke) => run_consult_smoke().await,
        Some(Commands::Export { cases_dir, out_dir }) => run_export(&cases_dir, &out_dir),
        None => {
            let description = match cli.case {
                Some(text) => text,
                None => read_case_from_stdin()?,
            };
            let case = match cli.case_id {
                Some(id) => Case::with_id(id, description),
                None => Case::new(description),
            };
            run_consult(case, cli.save_dir.as_deref()).await
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

async fn run_consult(case: Case, save_dir: Option<&Path>) -> anyhow::Result<()> {
    let llm_client =
        build_llm_client_from_env(false).context("LLM client initialization failed")?;

    let team = MultidisciplinaryTeam::new(default_roster(llm_client.clone()))
        .with_moderator(llm_client)
        .with_config(TeamConfig::from_env());

    let summary = team.consult(&case).await.map_err(|err| {
        error!(%err, "consultation failed");
        anyhow::Error::new(err)
    })?;

    print!("{}", render_summary(&summary));

    if let Some(dir) = save_dir {
        let record = CaseRecord::new(summary);
        let path = catalog::write_case_record(dir, &record)?;
        info!(path = %path.display(), "case record saved");
        println!("Saved case record to {}", path.display());
    }

    Ok(())
}

async fn run_consult_smoke() -> anyhow::Result<()> {
    let team = MultidisciplinaryTeam::new(default_roster(EchoLlmClient::shared()));
    let case = Case::with_id(
        "smoke-case",
        "58-year-old with exertional chest tightness, intermittent word-finding difficulty, and a three-week history of epigastric pain.",
    );

    let summary = team.consult(&case).await?;
    println!(
        "Smoke consult OK: {} opinions, {} failures.",
        summary.opinions.len(),
        summary.failures.len()
    );
    print!("{}", render_summary(&summary));

    Ok(())
}

fn run_export(cases_dir: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let report = catalog::export_catalog(cases_dir, out_dir)?;
    println!(
        "Exported {} case records to {} ({} skipped).",
        report.exported,
        out_dir.display(),
        report.skipped
    );
    Ok(())
}

fn read_case_from_stdin() -> anyhow::Result<String> {
    eprintln!("Enter the case description (end with Ctrl-D):");
    let mut description = String::new();
    std::io::stdin()
        .read_to_string(&mut description)
        .context("Failed to read case description from stdin")?;
    Ok(description)
}

fn render_summary(summary: &TeamSummary) -> String {
    let mut out = String::new();
    let case_label = summary.case.id.as_deref().unwrap_or("unlabeled");

    out.push_str(&format!("== Team summary: case {case_label} ==\n\n"));
    out.push_str(summary.overview.trim());
    out.push_str("\n\n-- Individual findings --\n");

    for opinion in &summary.opinions {
        out.push_str(&format!("\n### {}\n{}\n", opinion.role, opinion.assessment.trim()));
        if let Some(confidence) = opinion.confidence {
            out.push_str(&format!("(confidence {confidence:.2})\n"));
        }
    }

    if !summary.failures.is_empty() {
        out.push_str("\n-- Did not respond --\n");
        for failure in &summary.failures {
            out.push_str(&format!("- {}: {}\n", failure.role, failure.reason));
        }
    }

    out
}
