//! `a3dshell`: prepare Alpine3D simulation inputs.

use a3d_cache::GridCache;
use a3d_dem::{CancellationToken, HttpTileSource};
use a3d_meteo::{JsonCatalogue, StationCatalogue};
use a3d_package::Packager;
use a3d_runner::{
    resolve_request, ExternalError, ModelRunner, Overrides, Pipeline, PipelineError, SimulationRequest, Settings,
};
use a3d_spatial::Crs;
use a3d_templates::TemplateEngine;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "a3dshell")]
#[command(version, about = "Prepare Alpine3D simulation inputs: DEM, land cover, meteo and configs")]
struct Cli {
    /// Settings file (default: ./a3dshell.yaml when present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare one package per request file
    Run {
        /// Request files (YAML)
        #[arg(required = true)]
        requests: Vec<PathBuf>,

        /// Replace existing packages
        #[arg(long)]
        overwrite: bool,

        /// Run independent requests concurrently
        #[arg(long)]
        parallel: bool,

        /// Run Alpine3D on each finished package
        #[arg(long)]
        run_model: bool,
    },
    /// Print the grid a request resolves to (JSON)
    Resolve {
        /// Request file (YAML)
        request: PathBuf,
    },
    /// Inspect or clear the grid cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// List or print configuration templates
    Templates {
        #[command(subcommand)]
        action: TemplatesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// List cache entries
    List,
    /// Remove cache entries
    Clear {
        /// Only entries of this source
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplatesCommand {
    /// List templates and where each one comes from
    List,
    /// Print a template
    Show { name: String },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    a3d_metrics::describe_metrics();

    let mut settings = match Settings::load(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    settings.apply(&cli.overrides);
    if let Err(e) = settings.validate() {
        error!("{e}");
        return ExitCode::from(EXIT_USAGE);
    }

    match cli.command {
        Command::Run {
            requests,
            overwrite,
            parallel,
            run_model,
        } => run(&settings, &requests, overwrite, parallel, run_model),
        Command::Resolve { request } => resolve(&request),
        Command::Cache { action } => cache(&settings, action),
        Command::Templates { action } => templates(&settings, action),
    }
}

fn run(settings: &Settings, paths: &[PathBuf], overwrite: bool, parallel: bool, run_model: bool) -> ExitCode {
    let mut requests = Vec::with_capacity(paths.len());
    for path in paths {
        match SimulationRequest::from_file(path) {
            Ok(request) => requests.push(request),
            Err(e) => {
                error!("{e}");
                return ExitCode::from(EXIT_USAGE);
            }
        }
    }
    if run_model && settings.model.alpine3d_bin.is_none() {
        error!("--run-model needs an Alpine3D binary (model.alpine3d_bin or ALPINE3D_BIN)");
        return ExitCode::from(EXIT_USAGE);
    }

    let cache = match GridCache::open(&settings.paths.cache_dir) {
        Ok(cache) => cache,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let national_dem = match HttpTileSource::new(
        "swissalti3d",
        settings.dem.url_template.as_str(),
        settings.dem.version.as_str(),
        Crs::Lv95,
        settings.dem.tile_size_m,
        settings.dem.timeout(),
    ) {
        Ok(source) => source,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let catalogue = match &settings.meteo.catalogue {
        Some(path) => match JsonCatalogue::open(path, settings.smet_dir()) {
            Ok(catalogue) => Some(catalogue),
            Err(e) => {
                error!("{e}");
                return ExitCode::from(EXIT_USAGE);
            }
        },
        None => None,
    };
    let templates = TemplateEngine::with_override_dir(settings.paths.template_dir.as_ref());
    let packager = Packager::new(&settings.paths.output_dir);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping at the next stage boundary");
        handler_token.cancel();
    }) {
        warn!("Cannot install interrupt handler: {e}");
    }

    let pipeline = Pipeline {
        settings,
        cache: &cache,
        templates: &templates,
        packager: &packager,
        national_dem: &national_dem,
        catalogue: catalogue.as_ref().map(|c| c as &dyn StationCatalogue),
        cancel: &cancel,
    };

    let mut cancelled = false;
    let mut failures = 0usize;
    for result in pipeline.run_all(&requests, overwrite, parallel) {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                cancelled |= e.is_cancelled();
                failures += 1;
                print_failure(&e);
                continue;
            }
        };
        for warning in &report.warnings {
            warn!(simulation = %report.simulation_name, "{warning}");
        }
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Cannot print report: {e}"),
        }

        if run_model {
            if let Some(bin) = &settings.model.alpine3d_bin {
                let runner = ModelRunner::new(bin, settings.model.alpine3d_args.clone(), settings.model.timeout());
                match runner.run(&report.package_dir, &cancel) {
                    Ok(outcome) => info!(
                        simulation = %report.simulation_name,
                        log = %outcome.log.display(),
                        "Model run finished"
                    ),
                    Err(ExternalError::Cancelled { .. }) => {
                        cancelled = true;
                        failures += 1;
                    }
                    Err(e) => {
                        error!(simulation = %report.simulation_name, "{e}");
                        failures += 1;
                    }
                }
            }
        }
    }

    if cancelled {
        ExitCode::from(EXIT_CANCELLED)
    } else if failures > 0 {
        ExitCode::from(EXIT_FAILURE)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_failure(e: &PipelineError) {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    eprintln!("error: {message}");
}

fn resolve(path: &Path) -> ExitCode {
    let request = match SimulationRequest::from_file(path) {
        Ok(request) => request,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    match resolve_request(&request) {
        Ok(resolved) => {
            let grid = &resolved.grid;
            let out = serde_json::json!({
                "simulation_name": request.simulation_name,
                "epsg": grid.crs.epsg(),
                "xllcorner": grid.xllcorner,
                "yllcorner": grid.yllcorner,
                "cell_size": grid.cell_size,
                "cols": grid.cols,
                "rows": grid.rows,
                "bounds": grid.bounds(),
                "dates": resolved.dates.to_string(),
                "pois": resolved.pois,
                "masking": resolved.masking,
            });
            println!("{out:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn cache(settings: &Settings, action: CacheCommand) -> ExitCode {
    let cache = match GridCache::open(&settings.paths.cache_dir) {
        Ok(cache) => cache,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let result = match action {
        CacheCommand::List => cache.entries().map(|entries| {
            for e in &entries {
                println!(
                    "{}  {:<14} {:<10} {}x{} @ {} m  {:>10} B  {}",
                    &e.key[..12.min(e.key.len())],
                    e.source_id,
                    e.version,
                    e.grid.cols,
                    e.grid.rows,
                    e.grid.cell_size,
                    e.size_bytes,
                    e.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("{} entries in {}", entries.len(), cache.root().display());
        }),
        CacheCommand::Clear { source } => cache.clear(source.as_deref()).map(|removed| {
            println!("Removed {removed} entries");
        }),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn templates(settings: &Settings, action: TemplatesCommand) -> ExitCode {
    let engine = TemplateEngine::with_override_dir(settings.paths.template_dir.as_ref());
    let result = match action {
        TemplatesCommand::List => engine.list().map(|names| {
            for (name, provider) in names {
                println!("{name:<16} {provider}");
            }
        }),
        TemplatesCommand::Show { name } => engine.source(&name).map(|(text, _)| print!("{text}")),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
