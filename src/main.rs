//! treebind CLI - bind JSON models onto markup templates

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use treebind::{BindConfig, BindError, Binder, FixSuggestion, Model, Node, SelectorKey};

#[derive(Parser)]
#[command(name = "treebind")]
#[command(about = "treebind - bind JSON models onto markup templates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a JSON model onto a template and print the result
    Render {
        /// Markup template file
        template: PathBuf,

        /// JSON model file (an object of selector keys)
        model: PathBuf,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bind onto the first element matching this selector instead of the whole template
        #[arg(short, long)]
        select: Option<String>,

        /// Print the bind event log (JSON) to stderr
        #[arg(long)]
        events: bool,
    },

    /// Validate every key of a JSON model (parse only)
    Check {
        /// JSON model file
        model: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            template,
            model,
            config,
            select,
            events,
        } => render(&template, &model, config.as_deref(), select.as_deref(), events),
        Commands::Check { model } => check(&model),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<BindError>().and_then(|b| b.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read model {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn render(
    template: &Path,
    model: &Path,
    config: Option<&Path>,
    select: Option<&str>,
    events: bool,
) -> Result<ExitCode> {
    let config = match config {
        Some(path) => BindConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BindConfig::default(),
    };
    let markup = fs::read_to_string(template)
        .with_context(|| format!("Failed to read template {}", template.display()))?;
    let model = Model::new(read_json(model)?);

    // top-level nodes share a container so sequences can repeat them
    let container = Node::element("treebind-root");
    for node in Node::parse_fragment(&markup) {
        container.append_child(&node)?;
    }

    let root = match select {
        Some(selector) => container
            .select_first(selector)?
            .with_context(|| format!("No element matches '{}'", selector))?,
        None => container.clone(),
    };

    let binder = Binder::with_config(config);
    binder.bind(&root, &model, None)?;

    println!("{}", container.inner_html());
    if events {
        eprintln!("{}", serde_json::to_string_pretty(&binder.events().to_json())?);
    }
    Ok(ExitCode::SUCCESS)
}

/// Problem found in a model key, with its JSON path
struct KeyIssue {
    path: String,
    message: String,
    suggestion: Option<String>,
}

fn check(model: &Path) -> Result<ExitCode> {
    let json = read_json(model)?;
    if !json.is_object() {
        anyhow::bail!("Model must be a JSON object of selector keys");
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let keys = collect_issues(&json, "$", &mut errors, &mut warnings);

    for warning in &warnings {
        println!("{} {}: {}", "⚠".yellow(), warning.path, warning.message);
    }
    if errors.is_empty() {
        println!(
            "{} Model '{}' is valid ({} keys)",
            "✓".green(),
            model.display(),
            keys
        );
        return Ok(ExitCode::SUCCESS);
    }

    for error in &errors {
        println!("{} {}: {}", "✗".red(), error.path, error.message);
        if let Some(suggestion) = &error.suggestion {
            println!("  {} {}", "Fix:".yellow(), suggestion);
        }
    }
    println!("{} {} invalid key(s)", "Error:".red().bold(), errors.len());
    Ok(ExitCode::FAILURE)
}

/// Walk objects (and arrays of objects); returns the number of keys seen
fn collect_issues(
    value: &Value,
    path: &str,
    errors: &mut Vec<KeyIssue>,
    warnings: &mut Vec<KeyIssue>,
) -> usize {
    match value {
        Value::Object(map) => {
            let mut keys = map.len();
            for (raw, child) in map {
                let child_path = format!("{}[{:?}]", path, raw);
                match SelectorKey::parse(raw) {
                    Ok(key) => {
                        if key.name().is_some() && key.usable_name().is_none() {
                            warnings.push(KeyIssue {
                                path: child_path.clone(),
                                message: format!("target name in '{}' is unusable, writes are skipped", raw),
                                suggestion: None,
                            });
                        }
                    }
                    Err(e) => errors.push(KeyIssue {
                        path: child_path.clone(),
                        message: e.to_string(),
                        suggestion: e.fix_suggestion().map(str::to_string),
                    }),
                }
                keys += collect_issues(child, &child_path, errors, warnings);
            }
            keys
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| collect_issues(item, &format!("{}[{}]", path, i), errors, warnings))
            .sum(),
        _ => 0,
    }
}
