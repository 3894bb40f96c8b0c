use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{NoteListController, NotesApi};
use shared::domain::NoteId;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod shell;

use config::{load_settings, ConnectionArgs};

#[derive(Parser, Debug)]
#[command(name = "notetaker", about = "Keep a live list of notes in sync with a GraphQL backend")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every note once
    List,
    /// Create a note
    Add {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Replace the text of an existing note
    Update {
        id: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Delete a note by id
    Delete { id: String },
    /// Print the list again whenever another client changes it
    Watch,
    /// Interactive add/edit/delete session (default)
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.connection)?;
    let client = settings.build_client()?;
    info!(api_url = %client.api_url(), realtime_url = %client.realtime_url(), "using notes backend");
    let api: Arc<dyn NotesApi> = Arc::new(client);
    let mut controller = NoteListController::new(api);

    match cli.command.unwrap_or(Command::Shell) {
        Command::List => {
            let notes = controller.fetch_all().await?;
            print!("{}", shell::format_notes(notes));
        }
        Command::Add { text } => {
            let note = controller.create(text.join(" ")).await?;
            println!("created {}", note.id);
        }
        Command::Update { id, text } => {
            let note = controller.update(NoteId::new(id), text.join(" ")).await?;
            println!("updated {}: {}", note.id, note.note);
        }
        Command::Delete { id } => {
            let note = controller.delete(NoteId::new(id)).await?;
            println!("deleted {}", note.id);
        }
        Command::Watch => {
            controller.start().await?;
            print!("{}", shell::format_notes(controller.notes()));
            loop {
                tokio::select! {
                    event = controller.next_event() => match event {
                        Some(event) => {
                            println!("-- {} {}", event.kind().as_str(), event.note().id);
                            print!("{}", shell::format_notes(controller.notes()));
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            controller.teardown().await;
        }
        Command::Shell => {
            controller.start().await?;
            let outcome = shell::run(&mut controller).await;
            controller.teardown().await;
            outcome?;
        }
    }

    Ok(())
}
