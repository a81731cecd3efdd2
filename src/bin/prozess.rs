use clap::{Parser, Subcommand};
use prozess::loader::ProcessSet;
use prozess::runtime::task::DataMap;
use prozess::runtime::workflow::{Message, Workflow};
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result, bail};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process until it completes or blocks on external input
    Run {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Process id to start (defaults to the file's only process)
        #[arg(long, short)]
        process: Option<String>,

        /// Initial process data (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        data: Vec<(String, serde_json::Value)>,

        /// Complete the ready task on a node, NODE or NODE={json object}
        #[arg(long)]
        complete: Vec<String>,

        /// Deliver a message, NAME or NAME={json object}
        #[arg(long)]
        message: Vec<String>,
    },

    /// Restore a process from a saved state string and keep going
    Resume {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Process id to restore (defaults to the file's only process)
        #[arg(long, short)]
        process: Option<String>,

        /// State string printed by a previous run
        #[arg(long, short)]
        state: String,

        /// Process data to merge in (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        data: Vec<(String, serde_json::Value)>,

        /// Complete the ready task on a node, NODE or NODE={json object}
        #[arg(long)]
        complete: Vec<String>,
    },

    /// Build every process in a file and report problems without running
    Validate {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,
    },
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = s.split_once('=').ok_or_else(|| format!("expected KEY=value, got `{s}`"))?;
    // Anything that does not parse as JSON is taken as a bare string
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn pick_process(set: &ProcessSet, requested: Option<String>) -> Result<String> {
    if let Some(id) = requested {
        return Ok(id);
    }
    let ids = set.ids();
    if ids.len() != 1 {
        bail!("file defines {} processes, pick one with --process: {}", ids.len(), ids.join(", "));
    }
    Ok(ids[0].to_string())
}

/// Split `name={json object}` into the name and an optional payload.
fn parse_payload(spec: &str) -> Result<(&str, Option<DataMap>)> {
    let Some(pos) = spec.find('=') else {
        return Ok((spec, None));
    };
    let value: serde_json::Value = serde_json::from_str(&spec[pos + 1..])
        .with_context(|| format!("invalid JSON payload in `{}`", spec))?;
    match value {
        serde_json::Value::Object(map) => Ok((&spec[..pos], Some(map.into_iter().collect()))),
        _ => bail!("payload in `{}` must be a JSON object", spec),
    }
}

fn complete_named(workflow: &mut Workflow, spec: &str) -> Result<()> {
    let (node, data) = parse_payload(spec)?;
    let task = workflow
        .get_ready_user_tasks()
        .into_iter()
        .find(|t| t.node == node)
        .with_context(|| format!("no ready task on node '{}'", node))?;
    workflow.complete_task(task.id, data)?;
    workflow.do_engine_steps()?;
    Ok(())
}

fn deliver_message(workflow: &mut Workflow, spec: &str) -> Result<()> {
    let (name, data) = parse_payload(spec)?;
    let message = match data {
        Some(data) => Message::with_data(name, data),
        None => Message::new(name),
    };
    workflow.accept_message(&message)?;
    workflow.do_engine_steps()?;
    Ok(())
}

fn report(workflow: &Workflow) -> Result<()> {
    if workflow.is_completed() {
        println!("completed (success={})", workflow.success);
    } else {
        for task in workflow.get_ready_user_tasks() {
            println!("ready:   {} in {}", task.node, task.workflow.join(":"));
        }
        for task in workflow.get_waiting_tasks() {
            println!("waiting: {} in {}", task.node, task.workflow.join(":"));
        }
    }
    println!("data:  {}", serde_json::to_string(&workflow.data)?);
    println!("state: {}", workflow.get_workflow_state());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, process, data, complete, message } => {
            let set = Arc::new(ProcessSet::from_file(&file)?);
            let id = pick_process(&set, process)?;
            info!("Starting process: {}", id);

            let mut workflow = set.start(&id)?;
            workflow.set_data(data.into_iter().collect());
            workflow.do_engine_steps()?;
            for spec in &complete {
                complete_named(&mut workflow, spec)?;
            }
            for spec in &message {
                deliver_message(&mut workflow, spec)?;
            }
            workflow.refresh_waiting_tasks()?;
            workflow.do_engine_steps()?;
            report(&workflow)?;
        }

        Commands::Resume { file, process, state, data, complete } => {
            let set = Arc::new(ProcessSet::from_file(&file)?);
            let id = pick_process(&set, process)?;
            info!("Resuming process: {}", id);

            let mut workflow = set.start(&id)?;
            workflow.restore_workflow_state(&state)?;
            workflow.set_data(data.into_iter().collect());
            workflow.refresh_waiting_tasks()?;
            workflow.do_engine_steps()?;
            for spec in &complete {
                complete_named(&mut workflow, spec)?;
            }
            report(&workflow)?;
        }

        Commands::Validate { file } => {
            let set = ProcessSet::from_file(&file)?;
            let ids = set.ids();
            println!("ok: {} ({})", file.display(), ids.join(", "));
        }
    }

    Ok(())
}
