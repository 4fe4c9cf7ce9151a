//! Interactive menu, shown when no subcommand is given.

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input, Select};

use crate::cli::{
    self, BulkArgs, Command, ExportArgs, FieldsArgs, FileArg, ImportArgs, KeyArg, PrepArgs,
};
use crate::config::AppConfig;
use crate::providers::IssueTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Import,
    PrepImport,
    Update,
    FieldMap,
    Export,
    BulkTransition,
    Workflow,
    Fields,
    Transitions,
    Quit,
}

const ENTRIES: [(&str, char, &str, MenuChoice); 10] = [
    ("1", 'i', "Import a prepared work-item CSV", MenuChoice::Import),
    ("2", 'p', "Prepare and import a calendar export", MenuChoice::PrepImport),
    ("3", 'u', "Update existing issues from CSV", MenuChoice::Update),
    ("4", 'c', "Review the field mapping", MenuChoice::FieldMap),
    ("5", 'e', "Export my issues to CSV", MenuChoice::Export),
    ("6", 't', "Bulk transition issues to their final status", MenuChoice::BulkTransition),
    ("7", 'w', "Complete workflow: export, then bulk transition", MenuChoice::Workflow),
    ("8", 'f', "Export field metadata", MenuChoice::Fields),
    ("9", 'r', "Check transitions for an issue", MenuChoice::Transitions),
    ("0", 'q', "Quit", MenuChoice::Quit),
];

/// Accepts the number, the letter shortcut, or `quit`/`exit`.
pub fn parse_choice(input: &str) -> Option<MenuChoice> {
    let input = input.trim().to_lowercase();
    if input == "quit" || input == "exit" {
        return Some(MenuChoice::Quit);
    }
    ENTRIES
        .iter()
        .find(|(num, letter, _, _)| input == *num || input == letter.to_string())
        .map(|(_, _, _, choice)| *choice)
}

fn print_menu() {
    println!();
    println!("jira-csv");
    println!("{}", "=".repeat(60));
    for (num, letter, label, _) in ENTRIES {
        println!("  {num}. {label:<50} [{}]", letter.to_ascii_uppercase());
    }
    println!("{}", "=".repeat(60));
}

fn export_args() -> Result<ExportArgs> {
    let modes = ["Focused (work-item columns, for bulk transition)", "Full (every field)"];
    let idx = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Export mode")
        .items(&modes)
        .default(0)
        .interact()?;
    Ok(ExportArgs {
        output: None,
        full: idx == 1,
    })
}

fn command_for(choice: MenuChoice) -> Result<Option<Command>> {
    Ok(Some(match choice {
        MenuChoice::Import => Command::Import(ImportArgs::default()),
        MenuChoice::PrepImport => Command::PrepImport(PrepArgs::default()),
        MenuChoice::Update => Command::Update(FileArg::default()),
        MenuChoice::FieldMap => Command::FieldMap,
        MenuChoice::Export => Command::Export(export_args()?),
        MenuChoice::BulkTransition => Command::BulkTransition(BulkArgs::default()),
        MenuChoice::Workflow => Command::Workflow,
        MenuChoice::Fields => Command::Fields(FieldsArgs::default()),
        MenuChoice::Transitions => Command::Transitions(KeyArg::default()),
        MenuChoice::Quit => return Ok(None),
    }))
}

fn pause() -> Result<()> {
    let _: String = Input::new()
        .with_prompt("Press Enter to return to the menu")
        .allow_empty(true)
        .interact_text()?;
    Ok(())
}

/// Runs until the user quits. A failed prompt (Ctrl-C, closed stdin) ends
/// the session.
pub async fn run(config: &AppConfig, tracker: &dyn IssueTracker) -> Result<()> {
    log::info!("Interactive session started");
    loop {
        print_menu();
        let input: String = match Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Select an option")
            .interact_text()
        {
            Ok(input) => input,
            Err(e) => {
                log::info!("Menu input ended: {e}");
                return Ok(());
            }
        };
        let Some(choice) = parse_choice(&input) else {
            println!("Invalid option '{}'. Use a number or its letter.", input.trim());
            continue;
        };
        let command = match command_for(choice) {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(e) => {
                log::info!("Prompt ended: {e}");
                return Ok(());
            }
        };
        if let Err(e) = cli::run(command, config, tracker).await {
            log::error!("{choice:?} failed: {e:#}");
            println!("Error: {e:#}");
        }
        if pause().is_err() {
            return Ok(());
        }
    }
    log::info!("Interactive session ended");
    Ok(())
}
