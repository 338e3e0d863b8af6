mod dump;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use weave_core::{ExecutionMode, WeaveConfig};
use weave_graph::{validate_graph, Executor, ExternalInputs, GraphDescription, RenderGraph};

#[derive(Parser)]
#[command(
    name = "weave",
    version,
    about = "Weave: assemble, check and run render graphs",
    long_about = "Weave builds render graphs from TOML or JSON descriptions,\nresolves a deterministic execution order and runs frames on the CPU."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, schedule and execute a graph, printing per-frame output digests
    Run {
        /// Path to the graph description (.toml or .json)
        #[arg()]
        graph: PathBuf,

        /// Number of frames (default: [frame] frames from the config)
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Frame width override
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        width: Option<u32>,

        /// Frame height override
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        height: Option<u32>,

        /// Runtime configuration file (default: ./weave.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run independent stages of a dependency level concurrently
        #[arg(long)]
        parallel: bool,

        /// Write every marked output of every frame as PNG into this directory
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Build and validate a graph without executing it
    Check {
        /// Path to the graph description
        #[arg()]
        graph: PathBuf,

        /// Runtime configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the registered pass types with their slots and options
    Passes,

    /// Build a graph and print its normalized description
    Export {
        /// Path to the graph description
        #[arg()]
        graph: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Toml)]
        format: ExportFormat,

        /// Runtime configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Toml,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. }
        | Commands::Check { config, .. }
        | Commands::Export { config, .. } => config.clone(),
        Commands::Passes => None,
    };
    let config = load_config(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();
    tracing::debug!("Configuration: {:?} ({:?})", config_path, config.execution.mode);

    match cli.command {
        Commands::Run {
            graph,
            frames,
            width,
            height,
            parallel,
            dump,
            ..
        } => {
            let mut config = config;
            if let Some(w) = width {
                config.frame.width = w;
            }
            if let Some(h) = height {
                config.frame.height = h;
            }
            if let Some(n) = frames {
                config.frame.frames = n;
            }
            if parallel {
                config.execution.mode = ExecutionMode::Parallel;
            }
            cmd_run(&graph, &config, dump.as_deref())
        }
        Commands::Check { graph, .. } => cmd_check(&graph, &config),
        Commands::Passes => cmd_passes(&config),
        Commands::Export { graph, format, .. } => cmd_export(&graph, &config, format),
    }
}

/// Explicit config file, else `./weave.toml` when present, else defaults.
fn load_config(path: Option<&Path>) -> Result<WeaveConfig> {
    match path {
        Some(path) => WeaveConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => {
            let local = Path::new("weave.toml");
            if local.exists() {
                WeaveConfig::load_from_file(local).context("failed to load ./weave.toml")
            } else {
                Ok(WeaveConfig::default())
            }
        }
    }
}

fn registry(config: &WeaveConfig) -> Result<weave_graph::PassRegistry> {
    weave_passes::builtin_registry(config.validation.range_policy)
        .context("failed to register built-in passes")
}

fn load_graph(path: &Path, config: &WeaveConfig) -> Result<RenderGraph> {
    let description = GraphDescription::load(path)
        .with_context(|| format!("failed to read graph description: {}", path.display()))?;
    let registry = registry(config)?;
    description
        .build(&registry)
        .with_context(|| format!("failed to build graph '{}'", description.name))
}

fn cmd_run(path: &Path, config: &WeaveConfig, dump: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let mut graph = load_graph(path, config)?;
    let schedule = graph.compile().context("failed to schedule graph")?.clone();

    println!("▶ Running {} ({} stages)", graph.name(), schedule.len());
    println!(
        "   {}x{}, {} frame(s), {:?}",
        config.frame.width, config.frame.height, config.frame.frames, config.execution.mode
    );
    if let Some(dir) = dump {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory: {}", dir.display()))?;
    }

    let mut executor = Executor::from_config(config);
    let external = ExternalInputs::new();
    for _ in 0..config.frame.frames {
        let outputs = executor
            .execute_frame(&mut graph, &external)
            .with_context(|| format!("frame {} failed", executor.frame_index()))?;
        println!("   frame {:>4}  {}", outputs.frame.index, outputs.digest().short());
        for (slot, resource) in outputs.iter() {
            let hash = weave_core::hash::hash_texture(&resource.texture);
            println!("              {} = {}", slot, hash.short());
            if let Some(dir) = dump {
                let file = dump::frame_path(dir, &slot.to_string(), outputs.frame.index);
                dump::save_png(&resource.texture, &file)?;
            }
        }
    }

    println!();
    println!("   ✓ Done in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn cmd_check(path: &Path, config: &WeaveConfig) -> Result<()> {
    println!("🔍 Checking {}", path.display());
    let graph = load_graph(path, config)?;
    println!("   ✓ Build OK ({} stages, {} edges)", graph.len(), graph.edges().len());

    match validate_graph(&graph, &ExternalInputs::new()) {
        Ok(schedule) => {
            println!("   ✓ Schedule OK");
            println!();
            print!("{}", schedule);
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                println!("   ❌ {}", e);
            }
            anyhow::bail!("{} problem(s) found in '{}'", errors.len(), graph.name())
        }
    }
}

fn cmd_passes(config: &WeaveConfig) -> Result<()> {
    let registry = registry(config)?;
    for descriptor in registry.descriptors() {
        println!("{}  {}", descriptor.name(), descriptor.description());
        let reflection = registry
            .reflect(descriptor.name())
            .with_context(|| format!("failed to reflect '{}'", descriptor.name()))?;
        for slot in reflection.inputs() {
            let optional = if slot.optional { " (optional)" } else { "" };
            println!("   in   {:<16} {}{}", slot.name, slot.kind, optional);
        }
        for slot in reflection.outputs() {
            let optional = if slot.optional { " (optional)" } else { "" };
            println!("   out  {:<16} {}{}", slot.name, slot.kind, optional);
        }
        for option in descriptor.schema().options() {
            println!(
                "   opt  {:<16} {} = {}",
                option.name,
                option.type_summary(),
                option.default
            );
        }
        println!();
    }
    Ok(())
}

fn cmd_export(path: &Path, config: &WeaveConfig, format: ExportFormat) -> Result<()> {
    let graph = load_graph(path, config)?;
    let description = graph.to_description();
    let text = match format {
        ExportFormat::Toml => description.to_toml_string(),
        ExportFormat::Json => description.to_json_string(),
    }
    .context("failed to serialize graph description")?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "weave", "run", "graph.toml", "-n", "4", "--width", "32", "--parallel",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                frames,
                width,
                height,
                parallel,
                ..
            } => {
                assert_eq!(frames, Some(4));
                assert_eq!(width, Some(32));
                assert_eq!(height, None);
                assert!(parallel);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_export_format_flag() {
        let cli = Cli::try_parse_from(["weave", "export", "g.toml", "--format", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                format: ExportFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        assert!(Cli::try_parse_from(["weave", "run", "g.toml", "--width", "0"]).is_err());
        assert!(Cli::try_parse_from(["weave", "run", "g.toml", "--height", "0"]).is_err());
        assert!(Cli::try_parse_from(["weave", "run", "g.toml", "--height", "1"]).is_ok());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/weave.toml"))).is_err());
    }
}
