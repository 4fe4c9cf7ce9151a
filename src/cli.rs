use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::bulk;
use crate::config::AppConfig;
use crate::export::{self, ExportMode};
use crate::import::{self, ImportOptions};
use crate::ledger::Ledger;
use crate::model::work_item::IssueType;
use crate::prep::{self, PrepOptions};
use crate::prompt;
use crate::providers::IssueTracker;
use crate::update;
use crate::workflow::{self, TransitionOutcome};

#[derive(Parser)]
#[command(name = "jira-csv", version)]
#[command(about = "Turn calendar exports into Jira work items and manage them from CSV")]
pub struct Cli {
    /// Without a command, the interactive menu starts.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize an Outlook/Teams calendar export into the work-item CSV
    Prep(PrepArgs),
    /// Create issues from a prepared work-item CSV
    Import(ImportArgs),
    /// Prepare a calendar export, review it, then import it
    PrepImport(PrepArgs),
    /// Update existing issues from a CSV, sending only changed fields
    Update(FileArg),
    /// Export issues assigned to or reported by you
    Export(ExportArgs),
    /// Export field metadata for reference
    Fields(FieldsArgs),
    /// Show the field mapping table in use
    FieldMap,
    /// List the transitions available for an issue
    Transitions(KeyArg),
    /// Move one issue through a named transition (or `close_by_type`)
    Transition(TransitionArgs),
    /// Move every issue in a CSV to its final status
    BulkTransition(BulkArgs),
    /// Give closed but unresolved issues a resolution
    FixUnresolved(FixArgs),
    /// Export your issues, confirm, then bulk transition them
    Workflow,
}

#[derive(Args, Default)]
pub struct PrepArgs {
    /// Calendar export CSV
    pub input: Option<PathBuf>,
    /// Output CSV (default: <output dir>/output.csv)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Project key (default: JIRA_PROJECT_ID)
    #[arg(long, short)]
    pub project: Option<String>,
    /// Epic, Story, Task or Sub-task
    #[arg(long = "type", short = 't')]
    pub issue_type: Option<String>,
    /// Parent key applied to every row (stories and sub-tasks only)
    #[arg(long)]
    pub parent: Option<String>,
    /// Do not ask for a parent
    #[arg(long, conflicts_with = "parent")]
    pub no_parent: bool,
}

#[derive(Args, Default)]
pub struct ImportArgs {
    /// Work-item CSV (default: <output dir>/output.csv)
    pub source: Option<PathBuf>,
}

#[derive(Args, Default)]
pub struct FileArg {
    pub csv: Option<PathBuf>,
}

#[derive(Args, Default)]
pub struct KeyArg {
    /// Issue key, e.g. PROJ-123
    pub key: Option<String>,
}

#[derive(Args, Default)]
pub struct ExportArgs {
    /// Output CSV
    pub output: Option<PathBuf>,
    /// Every field instead of the work-item columns
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Default)]
pub struct FieldsArgs {
    pub output: Option<PathBuf>,
    /// Issue whose edit metadata decides the `editable` column
    #[arg(long)]
    pub sample: Option<String>,
}

#[derive(Args)]
pub struct TransitionArgs {
    pub key: String,
    pub target: String,
}

#[derive(Args, Default)]
pub struct BulkArgs {
    pub csv: Option<PathBuf>,
    /// Status for every row instead of the per-type default
    #[arg(long)]
    pub target: Option<String>,
    /// Report CSV (default: <output dir>/transition_report.csv)
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Args)]
pub struct FixArgs {
    pub csv: Option<PathBuf>,
    #[arg(long, default_value = "Done")]
    pub resolution: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

impl Default for FixArgs {
    fn default() -> Self {
        Self {
            csv: None,
            resolution: "Done".into(),
            yes: false,
        }
    }
}

const FOCUSED_EXPORT: &str = "bulk_transition_issues.csv";
const FULL_EXPORT: &str = "my_issues_full.csv";
const FIELDS_EXPORT: &str = "jira_field_names.csv";
const TRANSITION_REPORT: &str = "transition_report.csv";

pub async fn run(command: Command, config: &AppConfig, tracker: &dyn IssueTracker) -> Result<()> {
    match command {
        Command::Prep(args) => handle_prep(args, config).map(|_| ()),
        Command::Import(args) => handle_import(args, config, tracker).await,
        Command::PrepImport(args) => handle_prep_import(args, config, tracker).await,
        Command::Update(args) => handle_update(args, config, tracker).await,
        Command::Export(args) => handle_export(args, config, tracker).await.map(|_| ()),
        Command::Fields(args) => handle_fields(args, config, tracker).await,
        Command::FieldMap => {
            print_field_map(config);
            Ok(())
        }
        Command::Transitions(args) => handle_transitions(args, tracker).await,
        Command::Transition(args) => handle_transition(args, tracker).await,
        Command::BulkTransition(args) => handle_bulk(args, config, tracker).await,
        Command::FixUnresolved(args) => handle_fix(args, config, tracker).await,
        Command::Workflow => handle_workflow(config, tracker).await,
    }
}

fn prep_options(args: &mut PrepArgs, config: &AppConfig) -> Result<PrepOptions> {
    let project = match args.project.take().or_else(|| config.project_id.clone()) {
        Some(p) => p,
        None => prompt::text("Project key")?,
    };
    let issue_type = match args.issue_type.take() {
        Some(t) => IssueType::from(t),
        None => prompt::issue_type()?,
    };
    let parent = if !issue_type.takes_parent() || args.no_parent {
        None
    } else {
        match args.parent.take() {
            Some(p) => Some(p),
            None => prompt::optional_text("Parent key for all rows (empty for none)")?,
        }
    };
    Ok(PrepOptions {
        project,
        issue_type,
        parent,
    })
}

fn handle_prep(mut args: PrepArgs, config: &AppConfig) -> Result<PathBuf> {
    let input = match args.input.take() {
        Some(p) => p,
        None => PathBuf::from(prompt::text("Calendar export CSV")?),
    };
    if !input.is_file() {
        bail!("File not found: {}", input.display());
    }
    let output = args
        .output
        .take()
        .unwrap_or_else(|| config.prepared_csv_path());
    let opts = prep_options(&mut args, config)?;
    let report = prep::prepare_file(&input, &output, &opts)?;

    println!("Prepared {} work items in {}", report.rows.len(), output.display());
    println!(
        "  excluded: {}  failed: {}  malformed: {}",
        report.excluded, report.failed, report.dropped
    );
    Ok(output)
}

async fn import_file(
    source: PathBuf,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    if !source.is_file() {
        bail!("File not found: {}", source.display());
    }
    let ledger = Ledger::new(config.ledger_path());
    let summary =
        import::import_work_items(tracker, &source, &ledger, &ImportOptions::from_config(config))
            .await?;
    println!("Import complete");
    println!("  created: {}", summary.created);
    println!("  skipped: {}", summary.skipped);
    println!("  failed:  {}", summary.failed);
    if summary.step_failures > 0 {
        println!(
            "  {} post-creation updates failed, see {}",
            summary.step_failures,
            crate::logging::log_path().display()
        );
    }
    println!("Created issues recorded in {}", ledger.path().display());
    Ok(())
}

async fn handle_import(
    args: ImportArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    let source = prompt::path_or_ask(args.source, "Work-item CSV", &config.prepared_csv_path())?;
    import_file(source, config, tracker).await
}

async fn handle_prep_import(
    args: PrepArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    let output = handle_prep(args, config)?;
    println!("Review {} before importing.", output.display());
    if !prompt::confirm("Import it now?", false)? {
        println!("Import skipped.");
        return Ok(());
    }
    import_file(output, config, tracker).await
}

async fn handle_update(
    args: FileArg,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    let csv = prompt::path_or_ask(args.csv, "CSV to update from", &config.prepared_csv_path())?;
    let summary = update::update_from_csv(tracker, &csv, &config.field_map.roles).await?;
    println!(
        "Updated: {}  unchanged: {}  skipped: {}  failed: {}",
        summary.updated, summary.unchanged, summary.skipped, summary.failed
    );
    Ok(())
}

async fn handle_export(
    args: ExportArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<PathBuf> {
    let (mode, default_name) = if args.full {
        (ExportMode::Full, FULL_EXPORT)
    } else {
        (ExportMode::Focused, FOCUSED_EXPORT)
    };
    let output = args.output.unwrap_or_else(|| config.output_file(default_name));
    let n = export::export_my_issues(tracker, &output, mode, &config.field_map.roles).await?;
    println!("Exported {n} issues to {}", output.display());
    Ok(output)
}

async fn handle_fields(
    args: FieldsArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| config.output_file(FIELDS_EXPORT));
    let n = export::export_field_metadata(tracker, &output, args.sample.as_deref()).await?;
    println!("Exported {n} fields to {}", output.display());
    Ok(())
}

fn print_field_map(config: &AppConfig) {
    let map = &config.field_map;
    println!("Field map version {}", map.version);
    println!("  story points -> {}", map.roles.story_points);
    println!("  start date   -> {}", map.roles.start_date);
    println!("Registered defaults (FIELD_<NAME>):");
    for (name, field) in map.registered() {
        println!("  {name:<12} -> {} ({:?})", field.id, field.kind);
    }
    if config.field_defaults.is_empty() {
        println!("No FIELD_ defaults set.");
    } else {
        println!("Applied on create:");
        for (id, value) in &config.field_defaults {
            println!("  {id} = {value}");
        }
    }
}

async fn handle_transitions(args: KeyArg, tracker: &dyn IssueTracker) -> Result<()> {
    let key = prompt::or_ask(args.key, "Issue key (e.g. PROJ-123)")?;
    let issue = tracker.get_issue(&key).await?;
    println!(
        "{key}: {} [{}], resolution {}",
        issue.summary().unwrap_or_default(),
        issue.status_name().unwrap_or("Unknown"),
        issue.resolution_name()
    );
    let transitions = tracker.transitions(&key).await?;
    if transitions.is_empty() {
        println!("No transitions available.");
    }
    for t in &transitions {
        let marker = match t.resolution_field() {
            None => String::new(),
            Some(_) => format!("  (resolution: {})", t.settable_resolutions().join(", ")),
        };
        println!("  [{}] {} -> {}{marker}", t.id, t.name, t.to_status());
        let required = t.required_fields();
        if !required.is_empty() {
            println!("      requires: {}", required.join(", "));
        }
    }
    Ok(())
}

async fn handle_transition(args: TransitionArgs, tracker: &dyn IssueTracker) -> Result<()> {
    match workflow::transition_issue(tracker, &args.key, &args.target).await? {
        TransitionOutcome::Transitioned {
            transition,
            to_status,
            resolution,
            resolution_warning,
        } => {
            println!("{} moved to {to_status} via '{transition}'", args.key);
            if let Some(r) = resolution {
                println!("  resolution: {r}");
            }
            if resolution_warning {
                println!("  warning: issue is still Unresolved; try `fix-unresolved`");
            }
            Ok(())
        }
        TransitionOutcome::NotAvailable {
            requested,
            available,
        } => bail!(
            "'{requested}' is not available for {}. Available: {}",
            args.key,
            available.join(", ")
        ),
    }
}

async fn bulk_from(
    csv: PathBuf,
    args: BulkArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    if !csv.is_file() {
        bail!(
            "File not found: {}. Run `export` first, or `workflow` to do both.",
            csv.display()
        );
    }
    let plan = bulk::plan_transitions(&csv, args.target.as_deref())?;
    if plan.is_empty() {
        println!("No issue keys found in {}", csv.display());
        return Ok(());
    }
    println!("{} issues to transition:", plan.len());
    for p in &plan {
        println!("  {} [{}] {} -> {}", p.key, p.issue_type, p.summary, p.target);
    }
    if !args.yes && !prompt::confirm("Proceed with the bulk transition?", false)? {
        println!("Bulk transition skipped.");
        return Ok(());
    }
    let report = args
        .report
        .unwrap_or_else(|| config.output_file(TRANSITION_REPORT));
    let (summary, _) = bulk::bulk_transition(tracker, &plan, &report).await?;
    println!(
        "Succeeded: {}  skipped: {}  failed: {}",
        summary.succeeded, summary.skipped, summary.failed
    );
    println!("Report written to {}", report.display());
    Ok(())
}

async fn handle_bulk(
    mut args: BulkArgs,
    config: &AppConfig,
    tracker: &dyn IssueTracker,
) -> Result<()> {
    let csv = prompt::path_or_ask(
        args.csv.take(),
        "CSV of issues to transition",
        &config.output_file(FOCUSED_EXPORT),
    )?;
    bulk_from(csv, args, config, tracker).await
}

async fn handle_fix(args: FixArgs, config: &AppConfig, tracker: &dyn IssueTracker) -> Result<()> {
    let csv = prompt::path_or_ask(args.csv, "CSV of issue keys to check", &config.ledger_path())?;
    let scan = bulk::scan_unresolved(tracker, &csv).await?;
    println!("Checked: {}  could not fetch: {}", scan.checked, scan.failed);
    if scan.unresolved.is_empty() {
        println!("No closed issues without a resolution.");
        return Ok(());
    }
    println!("{} closed issues without a resolution:", scan.unresolved.len());
    for issue in &scan.unresolved {
        println!("  {} [{}] {}", issue.key, issue.status, issue.summary);
    }
    let question = format!("Set resolution '{}' on these issues?", args.resolution);
    if !args.yes && !prompt::confirm(&question, false)? {
        println!("No changes made.");
        return Ok(());
    }
    let summary = bulk::fix_unresolved(tracker, &scan.unresolved, &args.resolution).await;
    println!(
        "Fixed: {}  still unresolved: {}  failed: {}",
        summary.fixed, summary.still_unresolved, summary.failed
    );
    Ok(())
}

/// Export, then bulk transition the exported file. The bulk step asks for
/// confirmation after listing the issues.
async fn handle_workflow(config: &AppConfig, tracker: &dyn IssueTracker) -> Result<()> {
    let exported = handle_export(ExportArgs::default(), config, tracker).await?;
    bulk_from(exported, BulkArgs::default(), config, tracker).await
}
