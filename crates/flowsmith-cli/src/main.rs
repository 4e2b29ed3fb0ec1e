//! CLI binary for synthesizing, validating, and running flowsmith workflows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use flowsmith_engine::{progress, ExecutorConfig, RunContext, RunStatus, WorkflowExecutor};
use flowsmith_planner::{synthesize, validate_and_repair, validate_workflow};
use flowsmith_registry::CapabilityRegistry;
use flowsmith_types::{AgentContext, Graph, StepCategory};

#[derive(Parser)]
#[command(name = "flowsmith", version, about = "Turn plain-language automation requests into workflow graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a workflow graph from a prompt
    Synthesize {
        /// The automation request, e.g. "summarize my RSS feeds and email me daily"
        prompt: String,

        /// Capability catalog JSON (default: built-in catalog)
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Write the graph JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the decision and repair trail
        #[arg(long)]
        explain: bool,
    },

    /// Check a workflow graph file for structural issues
    Validate {
        /// Path to the graph .json file
        graph: PathBuf,

        /// Apply auto-repair and print the repaired graph
        #[arg(long)]
        repair: bool,

        /// Capability catalog used for repairs (default: built-in catalog)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },

    /// Execute a workflow graph with the dry-run handlers
    Run {
        /// Path to the graph .json file
        graph: PathBuf,

        /// Per-node deadline in seconds. Default: 300.
        #[arg(long, conflicts_with = "no_timeout")]
        node_timeout_secs: Option<u64>,

        /// Wait on every node indefinitely
        #[arg(long)]
        no_timeout: bool,
    },

    /// Show information about a workflow graph
    Info {
        /// Path to the graph .json file
        graph: PathBuf,
    },

    /// List the steps in a capability catalog
    Catalog {
        /// Capability catalog JSON (default: built-in catalog)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Synthesize {
            prompt,
            catalog,
            out,
            explain,
        } => {
            cmd_synthesize(&prompt, catalog.as_deref(), out.as_deref(), explain)?;
        }
        Commands::Validate {
            graph,
            repair,
            catalog,
        } => {
            cmd_validate(&graph, repair, catalog.as_deref())?;
        }
        Commands::Run {
            graph,
            node_timeout_secs,
            no_timeout,
        } => {
            let config = if no_timeout {
                ExecutorConfig::unbounded()
            } else {
                match node_timeout_secs {
                    Some(secs) => ExecutorConfig {
                        node_timeout: Some(Duration::from_secs(secs)),
                    },
                    None => ExecutorConfig::default(),
                }
            };
            cmd_run(&graph, config).await?;
        }
        Commands::Info { graph } => {
            cmd_info(&graph)?;
        }
        Commands::Catalog { catalog } => {
            cmd_catalog(catalog.as_deref())?;
        }
    }

    Ok(())
}

fn load_registry(path: Option<&Path>) -> anyhow::Result<CapabilityRegistry> {
    let registry = match path {
        Some(p) => CapabilityRegistry::from_path(p)?,
        None => CapabilityRegistry::builtin()?,
    };
    tracing::debug!(
        catalog = %path.map_or_else(|| "builtin".to_string(), |p| p.display().to_string()),
        steps = registry.len(),
        "Loaded capability catalog"
    );
    Ok(registry)
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let graph = Graph::from_json_str(&source)?;
    tracing::debug!(
        path = %path.display(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Loaded workflow graph"
    );
    Ok(graph)
}

fn write_json(value: &impl serde::Serialize, out: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_synthesize(
    prompt: &str,
    catalog: Option<&Path>,
    out: Option<&Path>,
    explain: bool,
) -> anyhow::Result<()> {
    let registry = load_registry(catalog)?;
    let synthesis = synthesize(prompt, &registry);
    tracing::info!(
        nodes = synthesis.workflow.nodes.len(),
        valid = synthesis.valid,
        issues = synthesis.issues.len(),
        "Synthesized workflow"
    );

    if explain {
        let summary = &synthesis.summary;
        eprintln!(
            "Intent: actions=[{}] sources={:?} outputs={:?} frequency={} confidence={:.2}",
            summary
                .intent
                .actions
                .iter()
                .map(|a| format!("{}:{:.2}", a.action_type, a.confidence))
                .collect::<Vec<_>>()
                .join(", "),
            summary.intent.sources,
            summary.intent.outputs,
            summary.intent.frequency.as_deref().unwrap_or("-"),
            summary.intent.confidence,
        );
        eprintln!("\nDecisions:");
        for d in &summary.decisions {
            let node = d.node_id.as_deref().map(|n| format!(" -> {n}")).unwrap_or_default();
            eprintln!("  [{}]{} {}", d.stage, node, d.reason);
        }
        if !summary.repairs.is_empty() {
            eprintln!("\nRepairs:");
            for r in &summary.repairs {
                eprintln!("  [{}] {}: {}", r.issue_type, r.action, r.message);
            }
        }
        eprintln!("\nProcessed in {}ms", summary.processing_time);
    }

    for issue in &synthesis.issues {
        eprintln!("[WARN] {}: {}", issue.kind.name(), issue.message);
    }

    write_json(&synthesis.workflow, out)
}

fn cmd_validate(path: &Path, repair: bool, catalog: Option<&Path>) -> anyhow::Result<()> {
    let graph = load_graph(path)?;

    if repair {
        let registry = load_registry(catalog)?;
        let mut ctx = AgentContext::new(format!("validate {}", path.display()));
        let validated = validate_and_repair(&graph, &registry, &mut ctx);
        for r in &validated.repairs {
            eprintln!("[REPAIR] {}: {}", r.issue_type, r.message);
        }
        for issue in &validated.issues {
            eprintln!("[ERROR] {}: {}", issue.kind.name(), issue.message);
        }
        write_json(&validated.workflow, None)?;
        if !validated.valid {
            std::process::exit(1);
        }
        return Ok(());
    }

    let report = validate_workflow(&graph);
    if report.valid {
        println!("Workflow is valid");
        return Ok(());
    }
    for issue in &report.issues {
        println!("[ERROR] {}: {}", issue.kind.name(), issue.message);
    }
    std::process::exit(1);
}

async fn cmd_run(path: &Path, config: ExecutorConfig) -> anyhow::Result<()> {
    let graph = load_graph(path)?;

    let ctx = RunContext::new();
    ctx.set("dry_run", serde_json::Value::Bool(true)).await;

    match config.node_timeout {
        Some(t) => println!("Node timeout: {}s", t.as_secs()),
        None => println!("Node timeout: none"),
    }
    println!("Running workflow: {} (run {})", path.display(), ctx.run_id());

    let executor = WorkflowExecutor::with_default_registry().with_config(config);
    let result = executor.run_workflow(&graph, &ctx).await;

    for entry in &result.logs {
        match &entry.error {
            None => println!("  ✓ {} [{}] {}ms", entry.node_id, entry.step_type, entry.duration_ms),
            Some(e) => println!("  ✗ {} [{}] {}", entry.node_id, entry.step_type, e),
        }
    }

    let (executed, total) = progress(&result);
    match result.status {
        RunStatus::Success => {
            println!("\nWorkflow completed: {executed}/{total} steps in {}ms", result.execution_time);
            Ok(())
        }
        RunStatus::Failed => {
            anyhow::bail!(
                "workflow failed at node {} after {executed}/{total} steps",
                result.failed_node.as_deref().unwrap_or("?")
            )
        }
        RunStatus::Error => {
            anyhow::bail!(
                "workflow rejected: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let graph = load_graph(path)?;

    println!("Workflow: {}", path.display());
    if let Some(prompt) = graph.metadata.get("prompt").and_then(|v| v.as_str()) {
        println!("Prompt: {prompt}");
    }
    if let Some(frequency) = graph.metadata.get("frequency").and_then(|v| v.as_str()) {
        println!("Frequency: {frequency}");
    }
    println!("Nodes: {}", graph.nodes.len());
    println!("Edges: {}", graph.edges.len());

    // List nodes with their steps
    println!("\nNodes:");
    for node in &graph.nodes {
        let category = node
            .category()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(none)".into());
        println!(
            "  {} [{}] step={} category={}",
            node.id, node.data.label, node.data.node_id, category
        );
    }

    Ok(())
}

fn cmd_catalog(path: Option<&Path>) -> anyhow::Result<()> {
    let registry = load_registry(path)?;
    println!("{} steps", registry.len());

    for category in StepCategory::ALL {
        println!("\n{category}:");
        let default = registry.default_step(category).map(|d| d.id.as_str());
        for step in registry.by_category(category) {
            let capabilities = step
                .capabilities
                .iter()
                .map(|c| format!("{}={:.2}", c.action, c.strength))
                .collect::<Vec<_>>()
                .join(" ");
            let marker = if Some(step.id.as_str()) == default { " (default)" } else { "" };
            println!(
                "  {} [{}] p{}{} {}",
                step.id, step.label, step.priority, marker, capabilities
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_registry_defaults_to_builtin() {
        let registry = load_registry(None).unwrap();
        assert!(!registry.is_empty());
    }

    #[test]
    fn load_graph_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": [{{"id": "1", "type": "customNode", "position": {{"x": 0, "y": 0}}, "data": {{"nodeId": "rss_fetch", "label": "RSS"}}}}], "edges": []}}"#
        )
        .unwrap();

        let graph = load_graph(file.path()).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].data.node_id, "rss_fetch");
    }

    #[test]
    fn load_graph_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_graph(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
