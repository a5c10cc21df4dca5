//! `proofline task ...`

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use proofline_core::api::dto::{LeaseResponse, TaskResponse, TaskTreeResponse};
use proofline_core::domain::{TaskStatus, TaskType};
use proofline_core::engine::{self, TaskTreeNode};
use proofline_core::policy::ValidationSpec;

use crate::{commands, output, Cli};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a task
    Create(CreateArgs),
    /// Update a task
    Update(UpdateArgs),
    /// Claim the exclusive work lease
    Claim { id: String },
    /// Mark a task done
    Done(DoneArgs),
    /// List tasks
    List(ListArgs),
    /// Show the parent/child tree
    Tree,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Task id (generated when omitted)
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    title: String,
    /// technical | feature | bug | docs | chore
    #[arg(long, default_value = "technical")]
    r#type: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    iteration: Option<String>,
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    assignee: Option<String>,
    /// Task ids this task depends on (repeatable)
    #[arg(long = "depends-on")]
    depends_on: Vec<String>,
    /// Policy preset name overriding the type default
    #[arg(long)]
    preset: Option<String>,
    /// Inline required attestation kinds (repeatable; implies mode all)
    #[arg(long = "require")]
    require: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    id: String,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    assignee: Option<String>,
    #[arg(long = "add-depends-on")]
    add_depends_on: Vec<String>,
    #[arg(long = "remove-depends-on")]
    remove_depends_on: Vec<String>,
    #[arg(long)]
    parent: Option<String>,
}

#[derive(Args)]
pub struct DoneArgs {
    id: String,
    /// Complete even when validation is unsatisfied (needs task.force_done)
    #[arg(long)]
    force: bool,
    /// Work proof JSON object
    #[arg(long)]
    proof: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    cursor: Option<String>,
}

pub async fn execute(cli: &Cli, cmd: &TaskCommands) -> Result<()> {
    let engine = commands::open_engine(cli).await?;
    let actor = cli.actor();

    match cmd {
        TaskCommands::Create(args) => {
            let task_type = TaskType::parse(&args.r#type)
                .ok_or_else(|| anyhow!("unknown task type {}", args.r#type))?;
            let validation = if args.require.is_empty() {
                None
            } else {
                Some(ValidationSpec {
                    mode: None,
                    require: Some(args.require.clone()),
                    threshold: None,
                })
            };
            let task = engine
                .create_task(
                    &actor,
                    &cli.project,
                    engine::CreateTask {
                        id: args.id.clone(),
                        iteration_id: args.iteration.clone(),
                        parent_id: args.parent.clone(),
                        task_type,
                        title: args.title.clone(),
                        description: args.description.clone(),
                        assignee_id: args.assignee.clone(),
                        depends_on: args.depends_on.clone(),
                        preset: args.preset.clone(),
                        validation,
                        work_proof: None,
                    },
                )
                .await?;
            if cli.json {
                output::print_json(&TaskResponse::from(task))?;
            } else {
                output::print_ok(&format!("created task {}", task.id));
            }
        }
        TaskCommands::Update(args) => {
            let status = args
                .status
                .as_deref()
                .map(|raw| {
                    TaskStatus::parse(raw).ok_or_else(|| anyhow!("unknown status {raw}"))
                })
                .transpose()?;
            let task = engine
                .update_task(
                    &actor,
                    &cli.project,
                    &args.id,
                    engine::UpdateTask {
                        status,
                        assignee_id: args.assignee.clone(),
                        add_depends_on: args.add_depends_on.clone(),
                        remove_depends_on: args.remove_depends_on.clone(),
                        parent_id: args.parent.clone(),
                        work_proof: None,
                        validation: None,
                    },
                )
                .await?;
            if cli.json {
                output::print_json(&TaskResponse::from(task))?;
            } else {
                output::print_ok(&format!("updated task {} ({})", task.id, task.status.as_str()));
            }
        }
        TaskCommands::Claim { id } => {
            let lease = engine.claim_task(&actor, &cli.project, id).await?;
            if cli.json {
                output::print_json(&LeaseResponse::from(lease))?;
            } else {
                output::print_ok(&format!(
                    "leased {} to {} until {}",
                    lease.task_id,
                    lease.owner_id,
                    lease.expires_at.to_rfc3339()
                ));
            }
        }
        TaskCommands::Done(args) => {
            let work_proof = args
                .proof
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| anyhow!("invalid --proof JSON: {e}"))?;
            let task = engine
                .complete_task(&actor, &cli.project, &args.id, args.force, work_proof)
                .await?;
            if cli.json {
                output::print_json(&TaskResponse::from(task))?;
            } else {
                output::print_ok(&format!("task {} done", task.id));
            }
        }
        TaskCommands::List(args) => {
            let page = engine
                .list_tasks(&cli.project, args.limit, args.cursor.as_deref())
                .await?;
            if cli.json {
                output::print_json(&page.map(TaskResponse::from))?;
            } else {
                for task in &page.items {
                    println!(
                        "{:<38} {:<12} {:<10} {}",
                        task.id,
                        output::status_label(task.status.as_str()),
                        task.task_type.as_str(),
                        task.title
                    );
                }
                if !page.next_cursor.is_empty() {
                    println!("{} {}", "next cursor:".dimmed(), page.next_cursor);
                }
            }
        }
        TaskCommands::Tree => {
            let tree = engine.task_tree(&cli.project).await?;
            if cli.json {
                let out: Vec<TaskTreeResponse> = tree.into_iter().map(Into::into).collect();
                output::print_json(&out)?;
            } else {
                for node in &tree {
                    print_node(node, 0);
                }
            }
        }
    }
    Ok(())
}

fn print_node(node: &TaskTreeNode, depth: usize) {
    println!(
        "{}{} [{}] {}",
        "  ".repeat(depth),
        node.task.id,
        output::status_label(node.task.status.as_str()),
        node.task.title
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
