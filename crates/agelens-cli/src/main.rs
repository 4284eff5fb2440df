//! `agelens` operator CLI

use agelens_core::{AgelensConfig, Orchestrator};
use agelens_model::AgeStage;
use agelens_synthesis::HttpSynthesisAdapter;
use agelens_watermark::Compositor;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("agelens")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render a subject at four life stages and export watermarked images")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (defaults apply when omitted)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("render")
                .about("Create a subject through the configured provider and export its stages")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .required(true)
                        .help("Subject name"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory for exported images"),
                )
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .value_parser(value_parser!(AgeStage))
                        .action(ArgAction::Append)
                        .help("Stage to export (repeatable; all four when omitted)"),
                ),
        )
        .subcommand(
            Command::new("watermark")
                .about("Burn a caption into a local image")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Image to caption"),
                )
                .arg(
                    Arg::new("label")
                        .long("label")
                        .required(true)
                        .help("Caption text"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as TOML"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("render", args)) => render(config, args).await,
        Some(("watermark", args)) => {
            let input = args.get_one::<PathBuf>("input").context("--input is required")?;
            let label = args.get_one::<String>("label").context("--label is required")?;
            let out = args.get_one::<PathBuf>("out").context("--out is required")?;
            let compositor =
                Compositor::new(config.watermark.layout.clone(), config.watermark.output);
            watermark_file(&compositor, input, label, out)?;
            println!("{}", out.display());
            Ok(())
        }
        Some(("config", _)) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        _ => unreachable!("subcommand_required"),
    }
}

fn init_tracing(json: bool) {
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

fn load_config(path: Option<&PathBuf>) -> Result<AgelensConfig> {
    match path {
        Some(path) => AgelensConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(AgelensConfig::default()),
    }
}

async fn render(config: AgelensConfig, args: &ArgMatches) -> Result<()> {
    let name = args.get_one::<String>("name").context("--name is required")?;
    let out = args.get_one::<PathBuf>("out").context("--out is required")?;
    let requested: Option<Vec<AgeStage>> = args
        .get_many::<AgeStage>("stage")
        .map(|stages| stages.copied().collect());

    let adapter = HttpSynthesisAdapter::from_config(&config.provider)
        .context("configuring image provider")?;
    let extension = config.watermark.output.extension();
    let orchestrator = Orchestrator::new(config, Arc::new(adapter));

    let subject = orchestrator.create_subject(name).await?;
    let stages = match requested {
        Some(stages) => {
            for &stage in &stages {
                orchestrator.get_variant(subject.id, stage).await?;
            }
            stages
        }
        None => {
            orchestrator.get_all_variants(subject.id).await?;
            AgeStage::ALL.to_vec()
        }
    };
    tracing::info!(subject = %subject.id, "exporting {} stage(s)", stages.len());

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for stage in stages {
        let image = orchestrator.export(subject.id, stage, stage.label()).await?;

        let path = out.join(format!("{}-{}.{extension}", slug(&subject.name), stage.tag()));
        std::fs::write(&path, &image).with_context(|| format!("writing {}", path.display()))?;
        println!("{}", path.display());
    }

    let stats = orchestrator.cache_stats();
    tracing::info!(
        upstream_calls = stats.upstream_calls,
        hits = stats.hits,
        failures = stats.failures,
        "render complete"
    );
    Ok(())
}

fn watermark_file(compositor: &Compositor, input: &Path, label: &str, out: &Path) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let labeled = compositor.apply(&bytes, label)?;
    std::fs::write(out, &labeled).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}

/// File-name-safe form of a subject name
fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "subject".to_string()
    } else {
        trimmed.to_string()
    }
}
