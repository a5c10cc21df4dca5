//! `proofline attest ...`

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use proofline_core::api::dto::AttestationResponse;
use proofline_core::domain::EntityKind;
use proofline_core::engine::CreateAttestation;

use crate::{commands, output, Cli};

#[derive(Subcommand)]
pub enum AttestCommands {
    /// Record an attestation about an entity
    Add(AddArgs),
    /// List attestations
    List(ListArgs),
}

#[derive(Args)]
pub struct AddArgs {
    /// project | iteration | task | decision
    #[arg(long = "entity-kind", default_value = "task")]
    entity_kind: String,
    #[arg(long = "entity-id")]
    entity_id: String,
    #[arg(long)]
    kind: String,
    /// Payload JSON object
    #[arg(long)]
    payload: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    cursor: Option<String>,
}

pub async fn execute(cli: &Cli, cmd: &AttestCommands) -> Result<()> {
    let engine = commands::open_engine(cli).await?;
    let actor = cli.actor();

    match cmd {
        AttestCommands::Add(args) => {
            let entity_kind = EntityKind::parse(&args.entity_kind)
                .ok_or_else(|| anyhow!("unknown entity kind {}", args.entity_kind))?;
            let payload = args
                .payload
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| anyhow!("invalid --payload JSON: {e}"))?;
            let attestation = engine
                .create_attestation(
                    &actor,
                    &cli.project,
                    CreateAttestation {
                        id: None,
                        entity_kind,
                        entity_id: args.entity_id.clone(),
                        kind: args.kind.clone(),
                        ts: None,
                        payload,
                    },
                )
                .await?;
            if cli.json {
                output::print_json(&AttestationResponse::from(attestation))?;
            } else {
                output::print_ok(&format!(
                    "attested {} on {} {}",
                    attestation.kind,
                    attestation.entity_kind.as_str(),
                    attestation.entity_id
                ));
            }
        }
        AttestCommands::List(args) => {
            let page = engine
                .list_attestations(&cli.project, args.limit, args.cursor.as_deref())
                .await?;
            if cli.json {
                output::print_json(&page.map(AttestationResponse::from))?;
            } else {
                for attestation in &page.items {
                    println!(
                        "{:<22} {:<10} {:<38} by {}",
                        attestation.kind,
                        attestation.entity_kind.as_str(),
                        attestation.entity_id,
                        attestation.actor_id
                    );
                }
            }
        }
    }
    Ok(())
}
