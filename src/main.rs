use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod generate;
mod notes;
mod querylog;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use app::InfoBot;
use cli::{Command, NoteAction};
use config::Config;
use notes::{NoteCreate, NoteId, NoteUpdate};
use querylog::JsonlQueryLog;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let base_path = config::default_base_path()?;
    let config = Config::load_with(&base_path)?;

    if let Command::Log { limit } = args.command {
        let query_log = JsonlQueryLog::new(Arc::new(storage::BackendLocal::new(&base_path)?));
        return print_json(&query_log.entries(Some(limit))?);
    }

    let bot = InfoBot::from_config(&config)?;

    match args.command {
        Command::Note { action } => match action {
            NoteAction::Add {
                title,
                topic,
                content,
                metadata,
            } => {
                if title.trim().is_empty() {
                    bail!("note title must not be empty");
                }
                let (note, status) = bot.create_note(NoteCreate {
                    title,
                    topic,
                    content,
                    metadata,
                })?;
                log::info!("embedding status: {status:?}");
                print_json(&note)?;
            }

            NoteAction::Update {
                id,
                title,
                topic,
                content,
                metadata,
            } => {
                let (note, status) = bot.update_note(
                    &NoteId::from(id.as_str()),
                    NoteUpdate {
                        title,
                        topic,
                        content,
                        metadata,
                    },
                )?;
                log::info!("embedding status: {status:?}");
                print_json(&note)?;
            }

            NoteAction::Delete { id, yes } => {
                let id = NoteId::from(id.as_str());
                let note = bot.get_note(&id)?;

                if !yes {
                    match inquire::prompt_confirmation(format!(
                        "Are you sure you want to delete \"{}\"?",
                        note.title
                    )) {
                        InquireResult::Ok(true) => {}
                        InquireResult::Ok(false) => return Ok(()),
                        InquireResult::Err(err) => bail!("{err}"),
                    }
                }

                bot.delete_note(&id)?;
                println!("note {id} deleted");
            }

            NoteAction::List { topic } => {
                print_json(&bot.list_notes(topic.as_deref())?)?;
            }

            NoteAction::Show { id } => {
                print_json(&bot.get_note(&NoteId::from(id.as_str()))?)?;
            }
        },

        Command::Reembed { force } => {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}") {
                bar.set_style(style);
            }

            log::info!("re-embedding notes with {}", bot.embedder_name());
            print_json(&bot.reembed_all(force, &bar)?)?;
        }

        Command::Search { query, topic, top } => {
            let results = bot.search(&query, topic.as_deref(), top)?;
            for scored in &results {
                println!("{:.4}  {}  {}", scored.score, scored.note.id, scored.note.title);
            }
            if results.is_empty() {
                println!("no notes found");
            }
        }

        Command::Ask {
            query,
            topic,
            threshold,
            context,
        } => {
            if query.trim().is_empty() {
                bail!("question must not be empty");
            }
            let answer = bot.ask(&query, topic.as_deref(), context.as_deref(), threshold)?;
            print_json(&answer)?;
        }

        Command::Log { .. } => {}
    }

    Ok(())
}
