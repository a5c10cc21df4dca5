//! `proofline log ...`

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use proofline_core::api::dto::EventResponse;
use proofline_core::db::EventFilter;

use crate::{commands, output, Cli};

#[derive(Subcommand)]
pub enum LogCommands {
    /// Show the most recent events
    Tail(TailArgs),
}

#[derive(Args)]
pub struct TailArgs {
    #[arg(long, default_value = "20")]
    limit: u32,
    /// Filter by event type (e.g. task.done)
    #[arg(long = "type")]
    event_type: Option<String>,
    /// Filter by entity kind (e.g. task, lease, rbac)
    #[arg(long = "entity-kind")]
    entity_kind: Option<String>,
}

pub async fn execute(cli: &Cli, cmd: &LogCommands) -> Result<()> {
    let engine = commands::open_engine(cli).await?;
    match cmd {
        LogCommands::Tail(args) => {
            let filter = EventFilter {
                event_type: args.event_type.clone(),
                entity_kind: args.entity_kind.clone(),
            };
            let page = engine
                .list_events(&cli.project, filter, Some(args.limit), None)
                .await?;
            if cli.json {
                output::print_json(&page.map(EventResponse::from))?;
            } else {
                for event in page.items.iter().rev() {
                    println!(
                        "{:>6} {} {:<28} {:<10} {} {}",
                        event.id,
                        event.ts.to_rfc3339().dimmed(),
                        event.event_type,
                        event.entity_kind,
                        event.entity_id,
                        format!("by {}", event.actor_id).dimmed()
                    );
                }
            }
        }
    }
    Ok(())
}
