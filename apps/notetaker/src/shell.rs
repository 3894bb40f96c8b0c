//! Interactive terminal front end for a running [`NoteListController`].

use anyhow::{bail, Context};
use client_core::NoteListController;
use shared::domain::{Note, NoteId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

const HELP: &str = "\
type text and press enter to add it (or save it, while editing)
  :edit N     load note N (position or id) into the draft for editing
  :delete N   delete note N (position or id)
  :draft      show the current draft
  :list       print the notes again
  :help       show this help
  :quit       leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Submit(String),
    Edit(String),
    Delete(String),
    ShowDraft,
    List,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> anyhow::Result<ShellCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellCommand::Empty);
    }
    let Some(command) = line.strip_prefix(':') else {
        return Ok(ShellCommand::Submit(line.to_string()));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let needs_arg = |arg: &str| -> anyhow::Result<String> {
        if arg.is_empty() {
            bail!(":{name} needs a note position or id");
        }
        Ok(arg.to_string())
    };

    Ok(match name {
        "edit" | "e" => ShellCommand::Edit(needs_arg(arg)?),
        "delete" | "d" | "rm" => ShellCommand::Delete(needs_arg(arg)?),
        "draft" => ShellCommand::ShowDraft,
        "list" | "ls" => ShellCommand::List,
        "help" | "h" | "?" => ShellCommand::Help,
        "quit" | "q" | "exit" => ShellCommand::Quit,
        other => bail!("unknown command :{other} (try :help)"),
    })
}

/// A 1-based position in the list, or else a note id.
pub fn resolve<'a>(notes: &'a [Note], selector: &str) -> Option<&'a Note> {
    if let Ok(position) = selector.parse::<usize>() {
        if let Some(note) = position.checked_sub(1).and_then(|index| notes.get(index)) {
            return Some(note);
        }
    }
    let id = NoteId::from(selector);
    notes.iter().find(|note| note.id == id)
}

/// Numbered note lines, each ending in a newline.
pub fn format_notes(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "(no notes)\n".to_string();
    }
    notes
        .iter()
        .enumerate()
        .map(|(index, note)| format!("{:>3}. {}  [{}]\n", index + 1, note.note, note.id))
        .collect()
}

pub fn render(controller: &NoteListController) -> String {
    let mut out = format_notes(controller.notes());
    match controller.editing_id() {
        Some(id) => out.push_str(&format!(
            "editing {id}: \"{}\"  (enter text to save)",
            controller.draft_text()
        )),
        None => out.push_str("add a note:"),
    }
    out
}

/// Runs until `:quit`, end of input, or a stdin error.
pub async fn run(controller: &mut NoteListController) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut live = true;
    println!("{}", render(controller));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(ShellCommand::Quit) => break,
                    Ok(command) => execute(controller, command).await,
                    Err(err) => println!("{err}"),
                }
            }
            event = controller.next_event(), if live => match event {
                Some(_) => println!("{}", render(controller)),
                None => {
                    live = false;
                    warn!("note feeds closed; the list will no longer update live");
                    println!("(live updates stopped)");
                }
            }
        }
    }
    Ok(())
}

async fn execute(controller: &mut NoteListController, command: ShellCommand) {
    match command {
        ShellCommand::Submit(text) => {
            controller.change_draft(text);
            match controller.submit().await {
                Ok(note) => println!("saved {}", note.id),
                Err(err) => {
                    warn!(error = %err, "submit failed");
                    println!("could not save: {err}");
                }
            }
        }
        ShellCommand::Edit(selector) => match resolve(controller.notes(), &selector).cloned() {
            Some(note) => {
                controller.select_for_edit(&note);
                println!("{}", render(controller));
            }
            None => println!("no note matches {selector}"),
        },
        ShellCommand::Delete(selector) => {
            let Some(note) = resolve(controller.notes(), &selector).cloned() else {
                println!("no note matches {selector}");
                return;
            };
            if let Err(err) = controller.delete(note.id).await {
                warn!(error = %err, "delete failed");
                println!("could not delete: {err}");
            }
        }
        ShellCommand::ShowDraft => match controller.editing_id() {
            Some(id) => println!("editing {id}: \"{}\"", controller.draft_text()),
            None => println!("draft: \"{}\"", controller.draft_text()),
        },
        ShellCommand::List => println!("{}", render(controller)),
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit | ShellCommand::Empty => {}
    }
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
