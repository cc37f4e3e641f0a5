use clap::{Parser, Subcommand};
use flowtree::actions::builtin::{EchoService, LogService};
use flowtree::compiler::core::Compiler;
use flowtree::compiler::loader::load_process_from_yaml;
use flowtree::runtime::context::Data;
use flowtree::{Engine, EngineConfig};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process to completion in memory
    Run {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Initial variables (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, serde_json::Value)>,

        /// Extra process files, callable from call activities
        #[arg(long)]
        include: Vec<PathBuf>,

        /// YAML map of human task name -> data (or list of data, used in order)
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Engine configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compile a process file and list its tasks
    Check {
        #[arg(long, short)]
        file: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Answer {
    Many(Vec<Data>),
    One(Data),
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let pos = s.find('=').ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].to_string();
    let val_str = &s[pos + 1..];
    // Try parsing as JSON, otherwise treat as string
    let val = serde_json::from_str(val_str).unwrap_or_else(|_| serde_json::Value::String(val_str.to_string()));
    Ok((key, val))
}

fn load_answers(path: &Path) -> Result<HashMap<String, VecDeque<Data>>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read answers from {}", path.display()))?;
    let raw: HashMap<String, Answer> = serde_yaml::from_str(&content).context("Failed to parse answers")?;
    Ok(raw
        .into_iter()
        .map(|(name, answer)| {
            let queue = match answer {
                Answer::Many(list) => list.into(),
                Answer::One(data) => VecDeque::from([data]),
            };
            (name, queue)
        })
        .collect())
}

fn compile_file(path: &Path) -> Result<flowtree::runtime::blueprint::SpecGraph> {
    let process = load_process_from_yaml(path)?;
    info!("Loaded process: {}", process.id);
    Compiler::new().compile(process)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => {
            let graph = compile_file(&file)?;
            println!("{} ({})", graph.id, graph.name);
            for spec in graph.specs.iter().skip(1) {
                let targets: Vec<&str> = spec.outgoing.iter().map(|t| graph.spec(t.target).name.as_str()).collect();
                println!("  {:<24} {:<26} -> {}", spec.name, spec.kind_name(), targets.join(", "));
            }
        }

        Commands::Run { file, vars, include, answers, config } => {
            let config = match config {
                Some(path) => EngineConfig::from_yaml_file(path)?,
                None => EngineConfig::default(),
            };
            let mut engine = Engine::with_config(config);
            engine.register_service(Arc::new(LogService));
            engine.register_service(Arc::new(EchoService));

            for path in &include {
                engine.register_process(compile_file(path)?);
            }
            let graph = engine.register_process(compile_file(&file)?);

            let mut answers = match answers {
                Some(path) => load_answers(&path)?,
                None => HashMap::new(),
            };

            let engine = Arc::new(engine);
            let mut instance = engine.instantiate_with(&graph.id, vars.into_iter().collect())?;
            info!("Process started: {}", instance.id());

            loop {
                instance.advance()?;
                let next = instance.ready_tasks().into_iter().find_map(|task| {
                    answers
                        .get_mut(task.name())
                        .and_then(|queue| queue.pop_front())
                        .map(|data| (task.id(), data))
                });
                match next {
                    Some((id, data)) => instance.complete(id, data)?,
                    None => break,
                }
            }

            for item in instance.navigation() {
                println!("{}{:<24} {:<10} {}", "  ".repeat(item.depth), item.name, item.state, item.description);
            }
            println!("{}", serde_json::to_string_pretty(&instance.data())?);

            if instance.is_completed() {
                info!("Process finished.");
            } else {
                let waiting: Vec<&str> = instance.ready_tasks().iter().map(|t| t.name()).collect();
                warn!(state = %instance.state(), ?waiting, "Process did not finish");
            }
        }
    }

    Ok(())
}
