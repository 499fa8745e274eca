mod display;
mod graph;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, warn};

use carina_core::config::{self, ParsedFile};
use carina_core::differ::{create_plan, merge_prior_state};
use carina_core::effect::Effect;
use carina_core::interpreter::{EffectOutcome, Interpreter};
use carina_core::plan::Plan;
use carina_core::provider::Provider;
use carina_core::resource::{Resource, ResourceId, State};
use carina_core::schema::ResourceSchema;
use carina_core::waiter::Timeouts;
use carina_provider_dms::DmsProvider;
use carina_provider_dms::schemas;
use carina_state::{BackendError, ResourceState, StateBackend, StateFile, create_backend};

use crate::graph::Bindings;

const DEFAULT_CONFIG: &str = "carina.json";

#[derive(Parser)]
#[command(name = "carina")]
#[command(about = "Manage AWS Database Migration Service resources", long_about = None)]
struct Cli {
    /// Log AWS calls and waiter progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to configuration file
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to configuration file
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to configuration file
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to configuration file
        #[arg(default_value = DEFAULT_CONFIG)]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Record an existing object in state
    Import {
        /// Resource type (e.g. dms_endpoint)
        resource_type: String,
        /// Resource name in the configuration
        name: String,
        /// Remote identifier (endpoint id, replication config ARN, ...)
        identifier: String,

        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Inspect recorded state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Remove a lock left behind by an interrupted run
    ForceUnlock {
        lock_id: String,

        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
    /// Show the recorded attributes of one resource
    Show {
        /// Resource address (type.name)
        address: String,

        #[arg(long, default_value = DEFAULT_CONFIG)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            resource_type,
            name,
            identifier,
            file,
        } => run_import(&file, &resource_type, &name, &identifier).await,
        Commands::State { command } => match command {
            StateCommands::List { file } => run_state_list(&file).await,
            StateCommands::Show { address, file } => run_state_show(&file, &address).await,
        },
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&file, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    schemas::all_schemas()
        .into_iter()
        .map(|s| (s.resource_type.clone(), s))
        .collect()
}

fn get_data_source_schemas() -> HashMap<String, ResourceSchema> {
    schemas::data_source_schemas()
        .into_iter()
        .map(|(s, _)| (s.resource_type.clone(), s))
        .collect()
}

fn validate_resources(parsed: &ParsedFile) -> Result<(), String> {
    if !parsed.provider.name.is_empty() && parsed.provider.name != "dms" {
        return Err(format!("Unsupported provider: {}", parsed.provider.name));
    }

    let resource_schemas = get_schemas();
    let data_source_schemas = get_data_source_schemas();
    let mut all_errors = Vec::new();

    for resource in &parsed.resources {
        let schemas = if resource.is_data_source() {
            &data_source_schemas
        } else {
            &resource_schemas
        };
        let Some(schema) = schemas.get(&resource.id.resource_type) else {
            let kind = if resource.is_data_source() {
                "data source"
            } else {
                "resource"
            };
            all_errors.push(format!("{}: unknown {} type", resource.id, kind));
            continue;
        };
        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.id, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn load_config(file: &Path) -> Result<ParsedFile, String> {
    let parsed = config::load(file).map_err(|e| format!("{}: {}", file.display(), e))?;
    validate_resources(&parsed)?;
    graph::sort_by_dependencies(&parsed.resources)?;
    Ok(parsed)
}

async fn open_backend(parsed: &ParsedFile) -> Result<Box<dyn StateBackend>, String> {
    let backend = create_backend(parsed.backend.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    backend.init().await.map_err(|e| e.to_string())?;
    debug!("state backend: {}", backend.location());
    Ok(backend)
}

async fn read_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn persist(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.bump();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

fn lock_error(e: BackendError) -> String {
    match e {
        BackendError::Locked { ref lock_id, .. } => format!(
            "{}\nIf no other run is in progress, release it with: carina force-unlock {}",
            e, lock_id
        ),
        e => e.to_string(),
    }
}

async fn get_provider(parsed: &ParsedFile) -> Result<DmsProvider, String> {
    DmsProvider::new(&parsed.provider)
        .await
        .map_err(|e| e.to_string())
}

/// Current state of every recorded resource. Resources deleted outside
/// carina are dropped from `state`.
async fn refresh(
    provider: &DmsProvider,
    state: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let schemas = get_schemas();
    let mut current = HashMap::new();
    let mut gone = Vec::new();

    for recorded in &state.resources {
        let id = recorded.id();
        let prior = recorded.to_state();
        let mut refreshed = provider
            .read(&id, Some(&recorded.identifier))
            .await
            .map_err(|e| format!("Failed to refresh {}: {}", id, e))?;

        if !refreshed.exists {
            warn!("{} no longer exists", id);
            gone.push(id);
            continue;
        }
        merge_prior_state(
            schemas.get(&id.resource_type),
            &mut refreshed.attributes,
            &prior.attributes,
        );
        if refreshed.identifier.is_none() {
            refreshed.identifier = prior.identifier;
        }
        current.insert(id, refreshed);
    }

    for id in &gone {
        println!(
            "{} {} was deleted outside carina",
            "!".yellow().bold(),
            id.to_string().yellow()
        );
        state.remove(id);
    }
    Ok(current)
}

/// Everything needed to apply a plan
struct Planned {
    plan: Plan,
    bindings: Bindings,
    /// Bindings each configured resource refers to
    dependencies: HashMap<ResourceId, Vec<String>>,
}

/// Read data sources, resolve references and diff against `current`
async fn build_plan(
    parsed: &ParsedFile,
    provider: &DmsProvider,
    state: &StateFile,
    current: &HashMap<ResourceId, State>,
) -> Result<Planned, String> {
    let schemas = get_schemas();
    let sorted = graph::sort_by_dependencies(&parsed.resources)?;

    let mut bindings = Bindings::new();
    let mut dependencies = HashMap::new();
    let mut reads = Vec::new();
    let mut desired = Vec::new();

    for resource in &sorted {
        dependencies.insert(resource.id.clone(), graph::dependencies(resource));
        let resolved = graph::resolve_resource(resource, &bindings);

        if resource.is_data_source() {
            if let Some(reference) = graph::first_unresolved(&resolved) {
                return Err(format!(
                    "{}: data source refers to {}, which is not known until apply",
                    resource.id, reference
                ));
            }
            let found = provider
                .read_data_source(&resolved)
                .await
                .map_err(|e| e.to_string())?;
            graph::bind(&mut bindings, &resolved, &found.attributes);
            reads.push(Effect::Read { resource: resolved });
            continue;
        }

        let mut normalized = resolved.clone();
        if let Some(schema) = schemas.get(&resource.id.resource_type) {
            normalized.attributes = schema.normalize(&resolved.attributes);
        }
        let normalized = provider.plan_resource(&normalized);
        let reported = current
            .get(&resource.id)
            .map(|s| s.attributes.clone())
            .unwrap_or_default();
        graph::bind(&mut bindings, &normalized, &reported);
        desired.push(normalized);
    }

    let diffed = create_plan(&desired, current, &schemas);
    let mut plan = Plan::new();
    for read in reads {
        plan.add(read);
    }
    for effect in order_deletions(&diffed, state) {
        plan.add(effect);
    }

    Ok(Planned {
        plan,
        bindings,
        dependencies,
    })
}

/// Creates and updates first, then deletions with dependents ahead of the
/// resources they refer to
fn order_deletions(plan: &Plan, state: &StateFile) -> Vec<Effect> {
    let (deletes, mut ordered): (Vec<Effect>, Vec<Effect>) = plan
        .effects()
        .iter()
        .cloned()
        .partition(|e| matches!(e, Effect::Delete { .. }));

    let entries: Vec<(String, Vec<String>)> = deletes
        .iter()
        .map(|e| {
            let id = e.resource_id();
            let depends_on = state
                .get(id)
                .map(|r| r.depends_on.clone())
                .unwrap_or_default();
            (id.name.clone(), depends_on)
        })
        .collect();
    let order = graph::deletion_order(&entries);

    let mut deletes = deletes;
    deletes.sort_by_key(|e| {
        order
            .iter()
            .position(|name| *name == e.resource_id().name)
            .unwrap_or(usize::MAX)
    });
    ordered.extend(deletes);
    ordered
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let parsed = load_config(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            parsed.resources.len()
        )
        .green()
        .bold()
    );

    for resource in &parsed.resources {
        let suffix = if resource.is_data_source() {
            " (data source)"
        } else {
            ""
        };
        println!("  • {}{}", resource.id, suffix);
    }

    Ok(())
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed).await?;
    let mut state = read_state(backend.as_ref()).await?;
    let provider = get_provider(&parsed).await?;

    let current = refresh(&provider, &mut state).await?;
    let planned = build_plan(&parsed, &provider, &state, &current).await?;
    display::print_plan(&planned.plan, &get_schemas());
    Ok(())
}

async fn run_apply(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed).await?;
    let lock = backend.acquire_lock("apply").await.map_err(lock_error)?;

    let result = apply_locked(&parsed, backend.as_ref()).await;

    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!("{} failed to release lock {}: {}", "Warning:".yellow().bold(), lock.id, e);
    }
    result
}

async fn apply_locked(parsed: &ParsedFile, backend: &dyn StateBackend) -> Result<(), String> {
    let mut state = read_state(backend).await?;
    let provider = get_provider(parsed).await?;

    let recorded = state.resources.len();
    let current = refresh(&provider, &mut state).await?;
    if state.resources.len() != recorded {
        persist(backend, &mut state).await?;
    }

    let Planned {
        plan,
        mut bindings,
        dependencies,
    } = build_plan(parsed, &provider, &state, &current).await?;

    let schemas = get_schemas();
    display::print_plan(&plan, &schemas);
    if plan.mutation_count() == 0 {
        return Ok(());
    }

    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;

    for effect in plan.effects().iter().filter(|e| e.is_mutating()) {
        let effect = resolve_effect(effect, &bindings);
        if let Some(target) = target_of(&effect)
            && let Some(reference) = graph::first_unresolved(target)
        {
            println!("  {} {}", "✗".red(), describe_effect(&effect));
            return Err(format!(
                "{}: {} is still unknown",
                effect.resource_id(),
                reference
            ));
        }

        let outcome = match interpreter.execute_effect(&effect).await {
            Ok(outcome) => outcome,
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), describe_effect(&effect), e);
                println!();
                println!(
                    "{}",
                    format!("Apply failed. {} succeeded, 1 failed.", success_count)
                        .red()
                        .bold()
                );
                return Err(e.to_string());
            }
        };

        match outcome {
            EffectOutcome::Created { state: created }
            | EffectOutcome::Updated { state: created }
            | EffectOutcome::Replaced { state: created } => {
                let Some(desired) = target_of(&effect) else {
                    continue;
                };
                let prior_identifier = match &effect {
                    Effect::Update { from, .. } => from.identifier.clone(),
                    _ => None,
                };
                let depends_on = dependencies
                    .get(&desired.id)
                    .cloned()
                    .unwrap_or_default();
                record(
                    &mut state,
                    &mut bindings,
                    schemas.get(&desired.id.resource_type),
                    created,
                    desired,
                    prior_identifier,
                    depends_on,
                );
            }
            EffectOutcome::Deleted { id } => {
                state.remove(&id);
            }
            EffectOutcome::Read { .. } => continue,
        }

        persist(backend, &mut state).await?;
        println!("  {} {}", "✓".green(), describe_effect(&effect));
        success_count += 1;
    }

    println!();
    println!(
        "{}",
        format!("Apply complete! {} changes applied.", success_count)
            .green()
            .bold()
    );
    Ok(())
}

fn resolve_effect(effect: &Effect, bindings: &Bindings) -> Effect {
    match effect {
        Effect::Create(resource) => Effect::Create(graph::resolve_resource(resource, bindings)),
        Effect::Update {
            id,
            from,
            to,
            changed_attributes,
        } => Effect::Update {
            id: id.clone(),
            from: from.clone(),
            to: graph::resolve_resource(to, bindings),
            changed_attributes: changed_attributes.clone(),
        },
        Effect::Replace {
            id,
            from,
            to,
            changed_attributes,
        } => Effect::Replace {
            id: id.clone(),
            from: from.clone(),
            to: graph::resolve_resource(to, bindings),
            changed_attributes: changed_attributes.clone(),
        },
        other => other.clone(),
    }
}

/// Desired resource of a create, update or replace
fn target_of(effect: &Effect) -> Option<&Resource> {
    match effect {
        Effect::Create(resource) => Some(resource),
        Effect::Update { to, .. } | Effect::Replace { to, .. } => Some(to),
        Effect::Read { .. } | Effect::Delete { .. } => None,
    }
}

fn describe_effect(effect: &Effect) -> String {
    let verb = match effect {
        Effect::Read { .. } => "Read",
        Effect::Create(_) => "Create",
        Effect::Update { .. } => "Update",
        Effect::Replace { .. } => "Replace",
        Effect::Delete { .. } => "Delete",
    };
    format!("{} {}", verb, effect.resource_id())
}

/// Store the outcome of a create or update. Attributes the API never
/// reports back (passwords, write-only settings) keep their configured
/// values.
fn record(
    state: &mut StateFile,
    bindings: &mut Bindings,
    schema: Option<&ResourceSchema>,
    mut outcome: State,
    desired: &Resource,
    prior_identifier: Option<String>,
    depends_on: Vec<String>,
) {
    merge_prior_state(schema, &mut outcome.attributes, &desired.user_attributes());
    if let Some(timeouts) = desired.attributes.get(Timeouts::ATTRIBUTE) {
        outcome
            .attributes
            .insert(Timeouts::ATTRIBUTE.to_string(), timeouts.clone());
    }
    if outcome.identifier.is_none() {
        outcome.identifier = prior_identifier;
    }
    graph::bind(bindings, desired, &outcome.attributes);

    match ResourceState::from_state(&outcome) {
        Some(recorded) => state.upsert(recorded.with_depends_on(depends_on)),
        None => warn!("{} returned no identifier; not recorded", desired.id),
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let parsed = load_config(file)?;
    let backend = open_backend(&parsed).await?;
    let lock = backend.acquire_lock("destroy").await.map_err(lock_error)?;

    let result = destroy_locked(&parsed, backend.as_ref(), auto_approve).await;

    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!("{} failed to release lock {}: {}", "Warning:".yellow().bold(), lock.id, e);
    }
    result
}

async fn destroy_locked(
    parsed: &ParsedFile,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state = read_state(backend).await?;
    let provider = get_provider(parsed).await?;

    let recorded = state.resources.len();
    let current = refresh(&provider, &mut state).await?;
    if state.resources.len() != recorded {
        persist(backend, &mut state).await?;
    }

    if current.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    let entries: Vec<(String, Vec<String>)> = state
        .resources
        .iter()
        .filter(|r| current.contains_key(&r.id()))
        .map(|r| (r.name.clone(), r.depends_on.clone()))
        .collect();
    let order = graph::deletion_order(&entries);
    let targets: Vec<Effect> = order
        .iter()
        .filter_map(|name| state.resources.iter().find(|r| &r.name == name))
        .filter_map(|r| {
            let id = r.id();
            let timeouts =
                Timeouts::from_attributes(&current.get(&id)?.attributes).unwrap_or_default();
            Some(Effect::Delete {
                id,
                identifier: r.identifier.clone(),
                timeouts,
            })
        })
        .collect();

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    let schemas = get_schemas();
    for effect in &targets {
        print!("{}", display::render_effect(effect, &schemas));
    }
    println!();
    println!("Plan: {} to destroy.", targets.len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;

    for effect in targets {
        match interpreter.execute_effect(&effect).await {
            Ok(_) => {
                state.remove(effect.resource_id());
                persist(backend, &mut state).await?;
                println!("  {} {}", "✓".green(), describe_effect(&effect));
                success_count += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), describe_effect(&effect), e);
                println!();
                println!(
                    "{}",
                    format!("Destroy failed. {} succeeded, 1 failed.", success_count)
                        .red()
                        .bold()
                );
                return Err(e.to_string());
            }
        }
    }

    println!();
    println!(
        "{}",
        format!("Destroy complete! {} resources destroyed.", success_count)
            .green()
            .bold()
    );
    Ok(())
}

async fn run_import(
    file: &Path,
    resource_type: &str,
    name: &str,
    identifier: &str,
) -> Result<(), String> {
    let parsed = load_config(file)?;
    if !get_schemas().contains_key(resource_type) {
        return Err(format!("Unknown resource type: {}", resource_type));
    }
    let id = ResourceId::new(resource_type, name);

    let backend = open_backend(&parsed).await?;
    let lock = backend.acquire_lock("import").await.map_err(lock_error)?;
    let result = import_locked(&parsed, backend.as_ref(), id, identifier).await;
    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!("{} failed to release lock {}: {}", "Warning:".yellow().bold(), lock.id, e);
    }
    result
}

async fn import_locked(
    parsed: &ParsedFile,
    backend: &dyn StateBackend,
    id: ResourceId,
    identifier: &str,
) -> Result<(), String> {
    let mut state = read_state(backend).await?;
    if state.get(&id).is_some() {
        return Err(format!("{} is already managed", id));
    }

    let provider = get_provider(parsed).await?;
    let mut found = provider
        .read(&id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !found.exists {
        return Err(format!("{} not found: {}", id, identifier));
    }
    if found.identifier.is_none() {
        found.identifier = Some(identifier.to_string());
    }

    let depends_on = parsed
        .resources
        .iter()
        .find(|r| r.id == id && !r.is_data_source())
        .map(graph::dependencies)
        .unwrap_or_default();
    let recorded = ResourceState::from_state(&found)
        .ok_or_else(|| format!("{} has no identifier", id))?;
    state.upsert(recorded.with_depends_on(depends_on));
    persist(backend, &mut state).await?;

    println!(
        "{}",
        format!("✓ Imported {} ({})", id, identifier).green().bold()
    );
    Ok(())
}

async fn run_state_list(file: &Path) -> Result<(), String> {
    let parsed = config::load(file).map_err(|e| format!("{}: {}", file.display(), e))?;
    let backend = open_backend(&parsed).await?;
    let state = read_state(backend.as_ref()).await?;

    if state.resources.is_empty() {
        println!("{}", "No resources in state.".yellow());
        return Ok(());
    }
    for resource in &state.resources {
        println!("{}  {}", resource.id(), resource.identifier.dimmed());
    }
    Ok(())
}

async fn run_state_show(file: &Path, address: &str) -> Result<(), String> {
    let (resource_type, name) = address
        .split_once('.')
        .ok_or_else(|| format!("Invalid address '{}': expected type.name", address))?;
    let id = ResourceId::new(resource_type, name);

    let parsed = config::load(file).map_err(|e| format!("{}: {}", file.display(), e))?;
    let backend = open_backend(&parsed).await?;
    let state = read_state(backend.as_ref()).await?;
    let recorded = state
        .get(&id)
        .ok_or_else(|| format!("{} is not in state", id))?;

    let schemas = get_schemas();
    let schema = schemas.get(resource_type);
    println!("{}", id.to_string().cyan().bold());
    println!("  identifier: {}", recorded.identifier);
    if !recorded.depends_on.is_empty() {
        println!("  depends_on: {}", recorded.depends_on.join(", "));
    }
    let restored = recorded.to_state();
    let mut keys: Vec<&String> = restored.attributes.keys().collect();
    keys.sort();
    for key in keys {
        let sensitive = schema
            .and_then(|s| s.attributes.get(key.as_str()))
            .is_some_and(|a| a.sensitive);
        let shown = if sensitive {
            "(sensitive value)".to_string()
        } else {
            display::format_value(&restored.attributes[key])
        };
        println!("  {}: {}", key, shown);
    }
    Ok(())
}

async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<(), String> {
    let parsed = config::load(file).map_err(|e| format!("{}: {}", file.display(), e))?;
    let backend = open_backend(&parsed).await?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("✓ Lock {} released.", lock_id).green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use carina_core::resource::Value;

    use super::*;

    fn recorded(name: &str, depends_on: &[&str]) -> ResourceState {
        ResourceState {
            resource_type: "dms_endpoint".to_string(),
            name: name.to_string(),
            identifier: name.to_string(),
            attributes: Default::default(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn delete(name: &str) -> Effect {
        Effect::Delete {
            id: ResourceId::new("dms_endpoint", name),
            identifier: name.to_string(),
            timeouts: Timeouts::default(),
        }
    }

    #[test]
    fn deletions_follow_creates_in_dependency_order() {
        let mut state = StateFile::new();
        state.upsert(recorded("cert", &[]));
        state.upsert(recorded("source", &["cert"]));

        let mut plan = Plan::new();
        plan.add(delete("cert"));
        plan.add(delete("source"));
        plan.add(Effect::Create(Resource::new("dms_endpoint", "target")));

        let names: Vec<(&str, String)> = order_deletions(&plan, &state)
            .iter()
            .map(|e| (e.kind(), e.resource_id().name.clone()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("create", "target".to_string()),
                ("delete", "source".to_string()),
                ("delete", "cert".to_string()),
            ]
        );
    }

    #[test]
    fn update_is_resolved_before_execution() {
        let mut bindings = Bindings::new();
        bindings.insert(
            "instance".to_string(),
            HashMap::from([(
                "replication_instance_arn".to_string(),
                Value::from("arn:aws:dms:us-east-1:123456789012:rep:XYZ"),
            )]),
        );
        let id = ResourceId::new("dms_replication_task", "task");
        let effect = Effect::Update {
            id: id.clone(),
            from: State::existing(id.clone(), HashMap::new()).with_identifier("task"),
            to: Resource::new("dms_replication_task", "task").with_attribute(
                "replication_instance_arn",
                Value::ResourceRef("instance".into(), "replication_instance_arn".into()),
            ),
            changed_attributes: vec!["replication_instance_arn".to_string()],
        };

        let resolved = resolve_effect(&effect, &bindings);
        let target = target_of(&resolved).unwrap();
        assert_eq!(
            target.attributes["replication_instance_arn"],
            Value::from("arn:aws:dms:us-east-1:123456789012:rep:XYZ")
        );
        assert!(graph::first_unresolved(target).is_none());
        assert_eq!(describe_effect(&resolved), "Update dms_replication_task.task");
    }

    #[test]
    fn record_keeps_configured_secrets_and_dependencies() {
        let schemas = get_schemas();
        let mut state = StateFile::new();
        let mut bindings = Bindings::new();

        let desired = Resource::new("dms_endpoint", "source")
            .with_attribute("_binding", Value::from("source"))
            .with_attribute("endpoint_id", Value::from("orders-src"))
            .with_attribute("password", Value::from("hunter2"));
        let reported = State::existing(
            desired.id.clone(),
            HashMap::from([
                ("endpoint_id".to_string(), Value::from("orders-src")),
                (
                    "endpoint_arn".to_string(),
                    Value::from("arn:aws:dms:us-east-1:123456789012:endpoint:ABC"),
                ),
            ]),
        )
        .with_identifier("orders-src");

        record(
            &mut state,
            &mut bindings,
            schemas.get("dms_endpoint"),
            reported,
            &desired,
            None,
            vec!["cert".to_string()],
        );

        let stored = state.get(&desired.id).unwrap();
        assert_eq!(stored.identifier, "orders-src");
        assert_eq!(stored.attributes["password"], serde_json::json!("hunter2"));
        assert_eq!(stored.depends_on, vec!["cert"]);
        assert!(bindings["source"].contains_key("endpoint_arn"));
    }

    #[test]
    fn unknown_types_fail_validation() {
        let parsed = config::parse(
            r#"{
                "provider": { "name": "dms" },
                "resources": [
                    { "type": "dms_widget", "name": "w", "attributes": {} }
                ]
            }"#,
        )
        .unwrap();
        let err = validate_resources(&parsed).unwrap_err();
        assert!(err.contains("dms_widget.w: unknown resource type"), "{}", err);
    }

    #[test]
    fn other_providers_are_rejected() {
        let parsed = config::parse(r#"{ "provider": { "name": "gcp" } }"#).unwrap();
        assert_eq!(
            validate_resources(&parsed).unwrap_err(),
            "Unsupported provider: gcp"
        );
    }
}
