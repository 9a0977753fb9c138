//! Schema Mapping CLI
//!
//! Command-line interface for inspecting API schemas and checking mappings.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use schema_mapping::{
    check, date_toggle, filter_options, is_suggested, load_json_auto, rank_candidates, resolve,
    to_addressable_options, ApiObject, CheckResult, Collaborator, CollaboratorError, Connection,
    DateToggle, DeveloperObject, Field, FileCollaborator, MappingSession, ObjectState, SaveRequest,
    Selector, SelectorOption, Severity, SimpleType,
};

#[derive(Parser)]
#[command(name = "schema-mapping")]
#[command(about = "Inspect API schemas and check developer object mappings")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the addressable option tree of an API object schema
    Options {
        /// API object or bare selector: file path or URL (http:// or https://)
        api_object: String,

        /// Mark nodes selectable for a field of this type
        #[arg(long = "type")]
        kind: Option<String>,

        /// Field format (e.g., date-time)
        #[arg(long, requires = "kind")]
        format: Option<String>,

        /// Keep only options whose label contains this text
        #[arg(long)]
        search: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank API objects as pairing candidates for a developer object
    Suggest {
        /// Developer objects file or URL
        #[arg(long)]
        objects: String,

        /// API objects file or URL
        #[arg(long)]
        api_objects: String,

        /// Developer object slug or id
        #[arg(long)]
        object: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a mapping, merge and prune it, and report completeness
    Check {
        /// Developer objects file (file mode)
        #[arg(long, requires = "api_objects")]
        objects: Option<PathBuf>,

        /// API objects file; may embed each object's selector
        #[arg(long, requires = "objects")]
        api_objects: Option<PathBuf>,

        /// Saved mapping file (missing file = nothing saved yet)
        #[arg(long, requires = "objects")]
        mapping: Option<PathBuf>,

        #[command(flatten)]
        remote: RemoteArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,

        /// Write the merged and pruned mapping to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Only show incomplete objects
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Args)]
struct RemoteArgs {
    /// Mapping service base URL (remote mode)
    #[arg(long, env = "SCHEMA_MAPPING_URL")]
    base_url: Option<String>,

    /// Bearer token for the mapping service
    #[arg(long, env = "SCHEMA_MAPPING_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Connection id
    #[arg(long, env = "SCHEMA_MAPPING_CONNECTION")]
    connection: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

struct CheckArgs {
    objects: Option<PathBuf>,
    api_objects: Option<PathBuf>,
    mapping: Option<PathBuf>,
    remote: RemoteArgs,
    json_output: bool,
    output: Option<PathBuf>,
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Options {
            api_object,
            kind,
            format,
            search,
            json,
        } => run_options(&api_object, kind, format, search.as_deref(), json),

        Commands::Suggest {
            objects,
            api_objects,
            object,
            json,
        } => run_suggest(&objects, &api_objects, &object, json),

        Commands::Check {
            objects,
            api_objects,
            mapping,
            remote,
            json,
            output,
            quiet,
        } => run_check(CheckArgs {
            objects,
            api_objects,
            mapping,
            remote,
            json_output: json,
            output,
            quiet,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,schema_mapping={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn fail(err: &CollaboratorError) -> u8 {
    eprintln!("Error: {}", err);
    err.exit_code() as u8
}

/// Accept either an API object carrying `selector` or a bare selector.
fn load_selector(source: &str) -> Result<Selector, CollaboratorError> {
    let value: Value = load_json_auto(source)?;
    if value.get("selector").is_some() {
        let api: ApiObject =
            serde_json::from_value(value).map_err(|source| CollaboratorError::InvalidJson { source })?;
        api.selector
            .ok_or_else(|| CollaboratorError::rejected("API object has no selector"))
    } else {
        serde_json::from_value(value).map_err(|source| CollaboratorError::InvalidJson { source })
    }
}

/// An option annotated with its compatibility for the requested field.
#[derive(Serialize)]
struct OptionView<'a> {
    label: &'a str,
    sub_label: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selectable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<DateToggle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<OptionView<'a>>,
}

fn option_views<'a>(options: &[SelectorOption<'a>], field: Option<&Field>) -> Vec<OptionView<'a>> {
    options
        .iter()
        .map(|option| {
            let criteria = field.and_then(|f| resolve(option, f));
            OptionView {
                label: option.label,
                sub_label: option.sub_label,
                value: option.value,
                selectable: field.map(|_| criteria.is_some()),
                date: criteria.as_ref().map(|c| date_toggle(c, None)),
                children: option_views(option.children(), field),
            }
        })
        .collect()
}

fn print_option_tree(views: &[OptionView<'_>], depth: usize) {
    for view in views {
        let mut line = format!("{}{} ({})", "  ".repeat(depth), view.label, view.value);
        if !view.sub_label.is_empty() {
            line.push_str(&format!(": {}", view.sub_label));
        }
        match (view.selectable, view.date) {
            (Some(true), Some(date)) => {
                let state = if date.checked { "on" } else { "off" };
                if date.disabled {
                    line.push_str(&format!(" \x1b[32m[selectable, date {} (locked)]\x1b[0m", state));
                } else {
                    line.push_str(" \x1b[32m[selectable, date optional]\x1b[0m");
                }
            }
            (Some(true), None) => line.push_str(" \x1b[32m[selectable]\x1b[0m"),
            _ => {}
        }
        println!("{}", line);
        print_option_tree(&view.children, depth + 1);
    }
}

fn run_options(
    source: &str,
    kind: Option<String>,
    format: Option<String>,
    search: Option<&str>,
    json_output: bool,
) -> Result<(), u8> {
    let selector = load_selector(source).map_err(|e| fail(&e))?;

    let field = kind.map(|kind| {
        let simple_type = SimpleType { kind, format };
        Field::new("field", simple_type)
    });

    let options = to_addressable_options(std::slice::from_ref(&selector));
    let options = match search {
        Some(query) => filter_options(&options, query),
        None => options,
    };
    let views = option_views(&options, field.as_ref());

    if json_output {
        let output = serde_json::to_string_pretty(&views).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else if views.is_empty() {
        println!("No matching options");
    } else {
        print_option_tree(&views, 0);
    }

    Ok(())
}

#[derive(Serialize)]
struct Candidate<'a> {
    id: &'a str,
    slug: &'a str,
    label: &'a str,
    suggested: bool,
}

fn run_suggest(objects: &str, api_objects: &str, object: &str, json_output: bool) -> Result<(), u8> {
    let objects: Vec<DeveloperObject> = load_json_auto(objects).map_err(|e| fail(&e))?;
    let api_objects: Vec<ApiObject> = load_json_auto(api_objects).map_err(|e| fail(&e))?;

    let Some(object) = objects.iter().find(|o| o.slug == object || o.id == object) else {
        eprintln!("Error: unknown developer object '{}'", object);
        return Err(2);
    };

    let candidates: Vec<Candidate<'_>> = rank_candidates(&object.label, &api_objects)
        .into_iter()
        .map(|api| Candidate {
            id: &api.id,
            slug: &api.slug,
            label: &api.label_one,
            suggested: is_suggested(&object.label, api),
        })
        .collect();

    if json_output {
        let output = serde_json::to_string_pretty(&candidates).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        for candidate in &candidates {
            let marker = if candidate.suggested { "*" } else { " " };
            println!("{} {} ({})", marker, candidate.label, candidate.slug);
        }
    }

    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), u8> {
    if let Some(objects) = &args.objects {
        // An empty mapping path loads as nothing saved yet.
        let collaborator = FileCollaborator::new(
            objects,
            args.api_objects.clone().unwrap_or_default(),
            args.mapping.clone().unwrap_or_default(),
        );
        return check_with(collaborator, Connection::new("local"), &args);
    }

    let Some(base_url) = &args.remote.base_url else {
        eprintln!("Error: either --objects or --base-url is required");
        return Err(2);
    };
    let Some(connection) = &args.remote.connection else {
        eprintln!("Error: --connection is required with --base-url");
        return Err(2);
    };

    #[cfg(feature = "remote")]
    {
        use schema_mapping::{HttpCollaborator, RemoteConfig};

        let config = RemoteConfig::new(base_url.as_str())
            .token(args.remote.token.clone())
            .timeout(std::time::Duration::from_secs(args.remote.timeout_secs));
        let collaborator = HttpCollaborator::new(config).map_err(|e| fail(&e))?;
        check_with(collaborator, Connection::new(connection.as_str()), &args)
    }

    #[cfg(not(feature = "remote"))]
    {
        eprintln!(
            "Error: cannot reach {} for connection '{}': built without the remote feature",
            base_url, connection
        );
        Err(2)
    }
}

fn check_with<C: Collaborator>(collaborator: C, connection: Connection, args: &CheckArgs) -> Result<(), u8> {
    let mut session = MappingSession::new(collaborator, connection);
    session.load().map_err(|e| {
        report_error(args.json_output, &e.to_string());
        e.exit_code() as u8
    })?;
    if let Err(e) = session.load_schemas() {
        warn!(error = %e, "pointer checks limited to fetched schemas");
    }

    if let Some(path) = &args.output {
        let body = SaveRequest {
            objects: session.objects(),
            mapping: session.mappings(),
        };
        let json = serde_json::to_string_pretty(&body).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        std::fs::write(path, json).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        })?;
    }

    let result = check(session.objects(), session.api_objects(), session.mappings());

    if args.json_output {
        let output = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        print_check(&result, args.quiet);
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(1)
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "ok": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn print_check(result: &CheckResult, quiet: bool) {
    if !quiet {
        println!("Checking {} developer objects ...\n", result.objects_checked);
    }

    for object in &result.results {
        let status_icon = match object.status {
            ObjectState::Complete => "\x1b[32m✓\x1b[0m",
            ObjectState::Unpaired => "\x1b[33m⚠\x1b[0m",
            ObjectState::Incomplete => "\x1b[31m✗\x1b[0m",
        };

        if !quiet || object.status != ObjectState::Complete {
            if object.pairings.is_empty() {
                println!("  {} {}", status_icon, object.object);
            } else {
                println!("  {} {} -> {}", status_icon, object.object, object.pairings.join(", "));
            }
        }

        for diag in &object.diagnostics {
            let (color, label) = match diag.severity {
                Severity::Error => ("\x1b[31m", "error"),
                Severity::Warning => ("\x1b[33m", "warning"),
            };
            println!(
                "    {}{}[{}]\x1b[0m: {} - {}",
                color, label, diag.code, diag.path, diag.message
            );
        }
    }

    println!();
    if result.is_ok() {
        println!(
            "\x1b[32m✓ {} objects checked, all complete\x1b[0m",
            result.objects_checked
        );
    } else {
        println!(
            "\x1b[31m✗ {} objects checked: {} complete, {} incomplete, {} unpaired ({} errors, {} warnings)\x1b[0m",
            result.objects_checked,
            result.complete,
            result.incomplete,
            result.unpaired,
            result.errors,
            result.warnings
        );
    }
}
