//! The main driver: parse, select, arbitrate tokens, print or execute

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cli::{parse_set, split_name_list, Cli};
use crate::exec::{expected_tags, required_tokens, Executor};
use crate::graph::{export_json, print_graph, Graph, PrintOptions, Report};
use crate::script::{read_script, preprocess, ReadOptions, Schema};
use crate::storage::TempStorage;
use crate::task::{docs, TaskRegistry};
use crate::tokens::TokenArbiter;

/// Execute one invocation end to end
pub fn execute(cli: Cli) -> Result<()> {
    let mut registry = TaskRegistry::with_builtin_tasks();
    if cli.public_tasks_only {
        registry.retain_public();
    }
    let schema = Schema::build(&registry);

    if let Some(path) = &cli.schema {
        schema.write_json(path)?;
        println!("Wrote schema to {}", path.display());
    }
    if let Some(path) = &cli.documentation {
        docs::write(&registry, path)?;
        println!("Wrote task documentation to {}", path.display());
    }

    let Some(script) = &cli.script else {
        if cli.schema.is_some() || cli.documentation.is_some() {
            return Ok(());
        }
        bail!("--script is required");
    };

    let root_dir = match &cli.workspace {
        Some(workspace) => workspace.clone(),
        None => std::env::current_dir().context("Failed to determine the working directory")?,
    };

    // The source-control probe lives outside this tool; its outputs arrive
    // as default properties with neutral fallbacks
    let branch = std::env::var("TRELLIS_BRANCH").unwrap_or_else(|_| "Unknown".to_string());
    let change = std::env::var("TRELLIS_CHANGE").unwrap_or_else(|_| "0".to_string());
    let default_properties = vec![
        ("RootDir".to_string(), root_dir.display().to_string()),
        ("Branch".to_string(), branch.clone()),
        ("Change".to_string(), change.clone()),
        ("HostPlatform".to_string(), host_platform().to_string()),
    ];
    let mut overrides = Vec::with_capacity(cli.set.len());
    for entry in &cli.set {
        overrides.push(parse_set(entry)?);
    }

    let opts = ReadOptions {
        registry: &registry,
        schema: &schema,
        root_dir: &root_dir,
        default_properties: &default_properties,
        overrides: &overrides,
    };
    let mut graph = read_script(script, &opts)?;

    // Selection: the requested targets plus their transitive inputs
    let targets = match &cli.target {
        Some(list) => split_name_list(list),
        None => graph.nodes().map(|node| node.name.clone()).collect(),
    };
    graph.select(&targets)?;

    if cli.skip_triggers {
        let names: Vec<String> = graph
            .triggers
            .iter()
            .map(|trigger| trigger.name.clone())
            .collect();
        graph.skip_triggers(&names)?;
    } else if let Some(list) = &cli.skip_trigger {
        graph.skip_triggers(&split_name_list(list))?;
    }

    if let Some(report_name) = &cli.report_name {
        let nodes: Vec<String> = graph.nodes().map(|node| node.name.clone()).collect();
        graph.reports.insert(
            report_name.clone(),
            Report {
                name: report_name.clone(),
                nodes,
            },
        );
    }

    // Buffered script diagnostics surface only now, after selection
    graph.emit_diagnostics(cli.trigger.as_deref())?;

    let storage = TempStorage::new(
        &root_dir,
        cli.shared_storage_dir.as_deref(),
        &branch,
        &change,
        cli.write_to_shared_storage,
    );

    if cli.clean {
        storage.clean_local()?;
    }
    if let Some(list) = &cli.clean_node {
        for node in split_name_list(list) {
            storage.clean_local_node(&node)?;
        }
    }

    if let Some(path) = &cli.export {
        let completed = completed_set(&graph, &storage);
        export_json(&graph, path, cli.trigger.as_deref(), &completed)?;
        println!("Wrote scheduler manifest to {}", path.display());
        return Ok(());
    }
    if let Some(path) = &cli.preprocess {
        preprocess::write(&graph, path)?;
        println!("Wrote preprocessed script to {}", path.display());
        return Ok(());
    }
    if cli.list_only {
        let completed = completed_set(&graph, &storage);
        let options = PrintOptions {
            show_deps: cli.show_deps,
            show_notifications: cli.show_notifications,
        };
        print_graph(&graph, &completed, &options);
        return Ok(());
    }

    // Nodes behind triggers that have not fired are excluded from
    // execution only; print and export still show them
    graph.filter_unfired_triggers(cli.trigger.as_deref())?;

    // Token arbitration over the nodes about to run
    if let Some(signature) = &cli.token_signature {
        arbitrate_tokens(&mut graph, &cli, signature)?;
    }

    // A fresh (non-resume) build starts from clean local state
    if !cli.resume && cli.single_node.is_none() && !cli.clean {
        storage.clean_local()?;
    }

    let executor = Executor {
        graph: &graph,
        storage: &storage,
    };
    match &cli.single_node {
        Some(name) => executor.execute_single(name),
        None => executor.execute_all(),
    }
}

/// Acquire every token the remaining nodes require; on conflict either
/// drop the affected nodes (--skip-targets-without-tokens) or roll back
/// this attempt's tokens and fail.
fn arbitrate_tokens(graph: &mut Graph, cli: &Cli, signature: &str) -> Result<()> {
    let names: Vec<String> = match &cli.single_node {
        Some(name) => vec![name.clone()],
        None => graph.execution_order()?,
    };
    let tokens = required_tokens(graph, &names);
    if tokens.is_empty() {
        return Ok(());
    }

    let mut arbiter = TokenArbiter::new(signature);
    let conflicts = arbiter.acquire_all(&tokens)?;
    if conflicts.is_empty() {
        return Ok(());
    }

    if cli.skip_targets_without_tokens {
        let conflicted: Vec<PathBuf> = conflicts.keys().cloned().collect();
        let affected: Vec<String> = graph
            .nodes()
            .filter(|node| node.tokens.iter().any(|token| conflicted.contains(token)))
            .map(|node| node.name.clone())
            .collect();
        for name in &affected {
            println!(
                "{} {} (token held by another job)",
                "skip".yellow().bold(),
                name
            );
        }
        graph.remove_nodes(&affected)?;
        Ok(())
    } else {
        for (token, holder) in &conflicts {
            eprintln!(
                "{} token {} is held by '{holder}'",
                "error:".red().bold(),
                token.display()
            );
        }
        arbiter.release_created()?;
        bail!("Token conflict: {} token(s) held by other jobs", conflicts.len());
    }
}

/// Nodes whose completion markers (and file-lists) are present locally
fn completed_set(graph: &Graph, storage: &TempStorage) -> BTreeSet<String> {
    graph
        .nodes()
        .filter(|node| storage.is_complete(&node.name, &expected_tags(node)))
        .map(|node| node.name.clone())
        .collect()
}

fn host_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "Win64"
    } else if cfg!(target_os = "macos") {
        "Mac"
    } else {
        "Linux"
    }
}
