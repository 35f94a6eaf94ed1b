use std::path::Path;

use clap::Subcommand;
use phaserun_core::{CheckpointStore, FileCheckpointStore};

use crate::output::{print_json, print_phases, print_table};

#[derive(Subcommand)]
pub enum CheckpointSubcommand {
    /// List checkpoints, newest first
    List,

    /// Show the phases stored in a checkpoint
    Show { id: String },

    /// Delete a checkpoint
    Delete { id: String },
}

pub fn run(root: &Path, subcmd: CheckpointSubcommand, json: bool) -> anyhow::Result<()> {
    let store = FileCheckpointStore::new(root);
    match subcmd {
        CheckpointSubcommand::List => list(&store, json),
        CheckpointSubcommand::Show { id } => show(&store, &id, json),
        CheckpointSubcommand::Delete { id } => {
            store.delete(&id)?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("deleted checkpoint {id}");
            }
            Ok(())
        }
    }
}

fn list(store: &FileCheckpointStore, json: bool) -> anyhow::Result<()> {
    let metas = store.list()?;
    if json {
        return print_json(&metas);
    }
    if metas.is_empty() {
        println!("No checkpoints.");
        return Ok(());
    }
    let rows = metas
        .iter()
        .map(|m| {
            vec![
                m.id.clone(),
                m.name.clone(),
                m.project_name.clone(),
                m.stage.to_string(),
                m.timestamp
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "PROJECT", "STAGE", "SAVED"], rows);
    Ok(())
}

fn show(store: &FileCheckpointStore, id: &str, json: bool) -> anyhow::Result<()> {
    let state = store.load(id)?;
    if json {
        return print_json(&state);
    }
    println!("project: {}", state.project_name);
    println!("stage:   {}", state.stage);
    println!();
    print_phases(&state.checkpoint.phases);
    Ok(())
}
