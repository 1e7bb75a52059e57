//! Cardprop command line
//!
//! Validates project manifests, computes their values and previews the
//! impact of destructive edits.

use anyhow::{anyhow, bail, Context, Result};
use cardprop_engine::{
    recompute_channel, CardFailure, DependentKind, Effect, ImpactReport, ProjectContext, ProjectManifest,
    ProjectStore, RecomputeMode,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let manifest = || {
        Arg::new("manifest")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Project manifest (TOML)")
    };
    let json = || {
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Output as JSON")
    };
    Command::new("cardprop")
        .version(cardprop_engine::VERSION)
        .about("Computed card property checks and impact reports")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("check")
                .about("Build a manifest and compute every value in the background worker")
                .arg(manifest())
                .arg(json()),
        )
        .subcommand(
            Command::new("values")
                .about("Show one property on every card")
                .arg(manifest())
                .arg(
                    Arg::new("property")
                        .long("property")
                        .required(true)
                        .help("Property name"),
                )
                .arg(json()),
        )
        .subcommand(
            Command::new("impact")
                .about("Preview what a deletion would affect")
                .arg(manifest())
                .arg(Arg::new("property").long("property").help("Property to delete"))
                .arg(Arg::new("tree").long("tree").help("Tree to delete"))
                .arg(
                    Arg::new("value")
                        .long("value")
                        .help("Enumeration value to delete, as PROPERTY=VALUE"),
                )
                .arg(json()),
        )
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(path: &Path, recompute: RecomputeMode) -> Result<ProjectContext> {
    let mut manifest = ProjectManifest::from_path(path)?;
    manifest.config.recompute = recompute;
    manifest
        .build()
        .with_context(|| format!("building {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckSummary {
    project: String,
    properties: usize,
    trees: usize,
    cards: usize,
    evaluated: usize,
    failures: Vec<CardFailure>,
}

async fn check(args: &ArgMatches) -> Result<bool> {
    let path = args
        .get_one::<PathBuf>("manifest")
        .ok_or_else(|| anyhow!("manifest path required"))?;
    let project = load(path, RecomputeMode::Deferred)?;

    let store = Arc::new(ProjectStore::new());
    let id = store.insert(project);
    let (queue, worker) = recompute_channel(Arc::clone(&store), 16);
    let handle = tokio::spawn(worker.run());
    queue.enqueue(id).await?;
    queue.shutdown().await?;
    let stats = handle.await?;
    info!(evaluated = stats.evaluated, failures = stats.failures, "check finished");

    let summary = store.read(id, |p| CheckSummary {
        project: p.name.clone(),
        properties: p.registry.len(),
        trees: p.trees.trees().count(),
        cards: p.cards.len(),
        evaluated: stats.evaluated,
        failures: p
            .cache()
            .failures()
            .map(|((property, card), message)| CardFailure {
                property: p.registry.get(property).map_or_else(|| property.to_string(), |d| d.name.clone()),
                card: p.card(card).map_or(0, |c| c.number),
                message: message.to_string(),
            })
            .collect(),
    })?;

    if args.get_flag("json") {
        print_json(&summary)?;
    } else {
        println!(
            "{}: {} properties, {} trees, {} cards",
            summary.project, summary.properties, summary.trees, summary.cards
        );
        println!("{} values computed", summary.evaluated);
        for failure in &summary.failures {
            println!("  #{} {}: {}", failure.card, failure.property, failure.message);
        }
    }
    Ok(summary.failures.is_empty())
}

#[derive(Debug, Serialize)]
struct ValueLine {
    card: u32,
    name: String,
    value: Option<String>,
}

fn values(args: &ArgMatches) -> Result<bool> {
    let path = args
        .get_one::<PathBuf>("manifest")
        .ok_or_else(|| anyhow!("manifest path required"))?;
    let name = args
        .get_one::<String>("property")
        .ok_or_else(|| anyhow!("--property required"))?;
    let project = load(path, RecomputeMode::Eager)?;
    let property = project
        .registry
        .by_name(name)
        .map(|d| d.id)
        .ok_or_else(|| anyhow!("There is no such property: {name}"))?;

    let mut lines = Vec::new();
    for card in project.sort_cards(property)? {
        let Some(c) = project.card(card) else {
            continue;
        };
        lines.push(ValueLine {
            card: c.number,
            name: c.name.clone(),
            value: project.display_value(card, property)?,
        });
    }
    if args.get_flag("json") {
        print_json(&lines)?;
    } else {
        for line in &lines {
            println!("#{} {}: {}", line.card, line.name, line.value.as_deref().unwrap_or("(not set)"));
        }
    }
    Ok(true)
}

fn kind_label(kind: DependentKind) -> &'static str {
    match kind {
        DependentKind::Transition => "transition",
        DependentKind::Favorite => "favorite",
        DependentKind::ProjectVariable => "project variable",
        DependentKind::Formula => "formula",
        DependentKind::Aggregate => "aggregate",
        DependentKind::CardDefaults => "card defaults",
        DependentKind::RelationshipProperty => "relationship property",
    }
}

fn effect_label(effect: Effect) -> &'static str {
    match effect {
        Effect::Blocking => "blocking",
        Effect::WillBeDeleted => "will be deleted",
        Effect::WillBeDisassociated => "will be disassociated",
        Effect::Reported => "reported",
    }
}

fn preview(project: &ProjectContext, args: &ArgMatches) -> Result<ImpactReport> {
    if let Some(name) = args.get_one::<String>("property") {
        let definition = project
            .registry
            .by_name(name)
            .ok_or_else(|| anyhow!("There is no such property: {name}"))?;
        return Ok(project.preview_delete_property(definition.id)?);
    }
    if let Some(name) = args.get_one::<String>("tree") {
        let tree = project
            .trees
            .by_name(name)
            .ok_or_else(|| anyhow!("There is no such tree: {name}"))?;
        return Ok(project.preview_delete_tree(tree.id)?);
    }
    if let Some(spec) = args.get_one::<String>("value") {
        let (name, text) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("--value expects PROPERTY=VALUE"))?;
        let definition = project
            .registry
            .by_name(name.trim())
            .ok_or_else(|| anyhow!("There is no such property: {name}"))?;
        let value = project
            .registry
            .find_value(definition.id, text.trim())?
            .ok_or_else(|| anyhow!("{} has no value '{}'", definition.name, text.trim()))?;
        return Ok(project.preview_remove_enumeration_value(definition.id, value.id)?);
    }
    bail!("one of --property, --tree or --value is required")
}

fn impact(args: &ArgMatches) -> Result<bool> {
    let path = args
        .get_one::<PathBuf>("manifest")
        .ok_or_else(|| anyhow!("manifest path required"))?;
    let project = load(path, RecomputeMode::Deferred)?;
    let report = preview(&project, args)?;

    if args.get_flag("json") {
        print_json(&report)?;
    } else if report.is_empty() {
        println!("Deleting {} affects nothing", report.target);
    } else {
        println!("Deleting {} affects:", report.target);
        for dependent in &report.dependents {
            println!(
                "  {} {} ({})",
                kind_label(dependent.kind),
                dependent.display_name,
                effect_label(dependent.effect)
            );
        }
        let blockers: Vec<&str> = report.blockers().map(|d| d.display_name.as_str()).collect();
        if !blockers.is_empty() {
            println!("Blocked by: {}", blockers.join(", "));
        }
    }
    Ok(!report.is_blocked())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    let ok = match matches.subcommand() {
        Some(("check", args)) => check(args).await?,
        Some(("values", args)) => values(args)?,
        Some(("impact", args)) => impact(args)?,
        _ => bail!("unknown command"),
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn impact_requires_a_target() {
        let matches = cli()
            .try_get_matches_from(["cardprop", "impact", "project.toml"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let project = ProjectContext::new("Empty", cardprop_engine::EngineConfig::default());
        assert!(preview(&project, args).is_err());
    }
}
