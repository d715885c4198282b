use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use retrace::cache::{DirDocumentStore, MemoryDocumentStore};
use retrace::compiler::loader::load_graph_from_path;
use retrace::compiler::{CompileContext, TaskPlanCompiler};
use retrace::plan::TaskTree;
use retrace::planner;
use retrace::resolver::CurrentTaskContext;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a graph document into a task tree and print it
    Compile {
        /// Path to the graph YAML/JSON file
        #[arg(long, short)]
        file: PathBuf,

        /// Directory with composite graph documents (<composite_id>.yaml)
        #[arg(long)]
        docs: Option<PathBuf>,
    },

    /// Compile and print a step plan for one execution scope
    Plan {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long)]
        docs: Option<PathBuf>,

        /// Plan a single event flow: task id of its flow root
        #[arg(long)]
        flow: Option<String>,

        /// Plan the remaining steps starting from this task id
        #[arg(long)]
        from: Option<String>,

        /// Plan strictly this one step
        #[arg(long)]
        single: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { file, docs } => {
            let (tree, root_ids) = compile_file(&file, docs.as_deref())?;
            for root_id in &root_ids {
                print_subtree(&tree, root_id, 0);
            }
            info!(tasks = tree.len(), "task tree compiled");
        }
        Commands::Plan { file, docs, flow, from, single } => {
            let (tree, root_ids) = compile_file(&file, docs.as_deref())?;
            let graph_root_id = root_ids.last().cloned().unwrap_or_default();

            let plan = if let Some(step_id) = single {
                planner::plan_single_step(&tree, &step_id)
            } else if let Some(start_id) = from {
                planner::plan_from_step(&tree, &start_id)
            } else if let Some(flow_id) = flow {
                let mut context = CurrentTaskContext::new(&tree);
                context.selected_id = &flow_id;
                planner::plan_event_flow(&context)
            } else {
                let mut context = CurrentTaskContext::new(&tree);
                context.selected_id = &graph_root_id;
                planner::plan_whole_graph(&context)
            };

            match plan {
                Ok(plan) => {
                    println!("anchor: {}", plan.anchor_id);
                    for step in &plan.steps {
                        let node_title = tree
                            .get(&step.task_id)
                            .map(|n| n.title.as_str())
                            .unwrap_or("?");
                        match &step.skip {
                            None => println!("  [run]     {}  {}", step.task_id, node_title),
                            Some(reason) => {
                                println!("  [skip {:?}] {}  {}", reason, step.task_id, node_title)
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(reason = e.reason(), "planning failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn compile_file(
    file: &std::path::Path,
    docs: Option<&std::path::Path>,
) -> Result<(TaskTree, Vec<String>)> {
    let model = load_graph_from_path(file)?;
    let mut tree = TaskTree::new();
    let context = CompileContext::for_parent("cli");

    let output = match docs {
        Some(dir) => {
            let store = DirDocumentStore::new(dir);
            TaskPlanCompiler::new(&store).compile(&mut tree, &model, &context)?
        }
        None => {
            let store = MemoryDocumentStore::new();
            TaskPlanCompiler::new(&store).compile(&mut tree, &model, &context)?
        }
    };
    for root_id in &output.root_ids {
        tree.add_root(root_id);
    }
    Ok((tree, output.root_ids))
}

fn print_subtree(tree: &TaskTree, id: &str, depth: usize) {
    let Some(node) = tree.get(id) else {
        return;
    };
    println!("{}- {}  ({})", "  ".repeat(depth), node.title, node.id);
    for child_id in &node.children {
        print_subtree(tree, child_id, depth + 1);
    }
}
