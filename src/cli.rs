use crate::{
    config::Config,
    form::{FormTemplate, template_field_names},
    pipeline::Pipeline,
    raster::{PopplerRasterizer, Rasterizer},
    registry::MappingRegistry,
    report::{RunReport, RunStatus},
    util::{ensure_dir, hash_file, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "formfill")]
#[command(about = "Fill a PDF form template once per roster row and rasterize the results")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./formfill.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the rasterizer is installed and runnable.
    Doctor {},
    /// List the subjects of the field mapping registry.
    Subjects {},
    /// List the form field names of a template.
    Fields {
        #[arg(long)]
        template: PathBuf,
    },
    /// Validate a roster against a subject without generating anything.
    Check {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        subject: String,
    },
    Run {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

/// Returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = Config::load(&cfg_path)?;
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Subjects {} => subjects(&cfg),
        Command::Fields { template } => fields(template),
        Command::Check { roster, subject } => check(&cfg, roster, subject),
        Command::Run {
            roster,
            template,
            subject,
            out_dir,
        } => run(&cfg, roster, template, subject, out_dir.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> PathBuf {
    if let Some(p) = user {
        return p.to_path_buf();
    }
    let default = PathBuf::from("formfill.toml");
    if default.exists() {
        default
    } else {
        PathBuf::from("formfill.example.toml")
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn load_registry(cfg: &Config) -> Result<MappingRegistry> {
    let path = Path::new(&cfg.paths.mappings_file);
    let registry = MappingRegistry::load(path)?;
    info!(
        "loaded {} subject(s) from {}",
        registry.subjects().count(),
        path.display()
    );
    Ok(registry)
}

fn doctor(cfg: &Config) -> Result<i32> {
    let diag = PopplerRasterizer::new(cfg).diagnose()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(if diag.ok { 0 } else { 1 })
}

fn subjects(cfg: &Config) -> Result<i32> {
    let registry = load_registry(cfg)?;
    println!("{}", serde_json::to_string_pretty(&registry)?);
    Ok(0)
}

fn fields(template: &Path) -> Result<i32> {
    let tpl = FormTemplate::from_path(template)
        .with_context(|| format!("reading template: {}", template.display()))?;
    let names = template_field_names(&tpl)?;
    if names.is_empty() {
        warn!("no form fields found in {}", template.display());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "template": template,
            "fields": names,
        }))?
    );
    Ok(0)
}

fn check(cfg: &Config, roster: &Path, subject: &str) -> Result<i32> {
    let pipeline = Pipeline::new(cfg, load_registry(cfg)?, PopplerRasterizer::new(cfg))?;
    match pipeline.validate(roster, subject) {
        Ok((mapping, table)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "subject": subject,
                    "status": RunStatus::Success,
                    "rows": table.len(),
                    "columns": table.columns(),
                    "mapping": mapping,
                }))?
            );
            Ok(0)
        }
        Err(err) => {
            report_rejection(err.status(), &err.to_string())?;
            Ok(1)
        }
    }
}

/// `formfill run`. Returns the process exit code.
pub fn run(
    cfg: &Config,
    roster: &Path,
    template: &Path,
    subject: &str,
    out_override: Option<&Path>,
) -> Result<i32> {
    let pipeline = Pipeline::new(cfg, load_registry(cfg)?, PopplerRasterizer::new(cfg))?;
    // Unknown subjects are rejected before either input is touched.
    if let Err(err) = pipeline.mapping_for(subject) {
        report_rejection(err.status(), &err.to_string())?;
        return Ok(1);
    }

    validate_input(cfg, roster, "csv")?;
    validate_input(cfg, template, "pdf")?;

    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let roster_hash =
        hash_file(roster).with_context(|| format!("hashing roster: {}", roster.display()))?;
    let template_hash = hash_file(template)
        .with_context(|| format!("hashing template: {}", template.display()))?;
    let run_id = sha256_hex(
        format!("{cfg_hash}:{subject}:{roster_hash}:{template_hash}").as_bytes(),
    );

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let run_dir = out_root.join(&run_id);

    if run_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "run_dir already exists and resume=false: {}",
            run_dir.display()
        ));
    }

    info!("run_id={run_id} out={}", run_dir.display());

    let started = now_rfc3339();
    let outcome = pipeline.process(roster, template, &run_dir, subject);

    if !outcome.status.is_success() {
        report_rejection(outcome.status, &outcome.message)?;
        return Ok(1);
    }

    ensure_dir(&run_dir)?;

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(run_dir.join("effective-config.toml"), raw)?;
    }

    let report = RunReport::new(&run_id, subject, &outcome);
    if cfg.output.write_report_json {
        std::fs::write(
            run_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "run_id": run_id,
            "subject": subject,
            "started": started,
            "finished": now_rfc3339(),
            "roster_sha256": roster_hash,
            "template_sha256": template_hash,
            "persons_processed": outcome.persons_processed,
            "summary": report.summary,
            "report": cfg.output.report_filename,
        });
        std::fs::write(run_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": run_id,
                "run_dir": run_dir,
                "status": outcome.status,
                "code": outcome.status.code(),
                "message": outcome.message,
                "written": outcome.written().collect::<Vec<_>>(),
            }))?
        );
    }

    Ok(0)
}

fn report_rejection(status: RunStatus, message: &str) -> Result<()> {
    error!("{message}");
    if status == RunStatus::MissingColumns {
        warn!("make sure the selected subject matches the uploaded roster and template");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": status,
            "code": status.code(),
            "message": message,
        }))?
    );
    Ok(())
}

fn validate_input(cfg: &Config, input: &Path, expected_ext: &str) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case(expected_ext) {
            return Err(anyhow!(
                "input is not a .{expected_ext} file: {}",
                input.display()
            ));
        }
    } else {
        warn!(
            "input has no extension; assuming .{expected_ext}: {}",
            input.display()
        );
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("formfill.log"))
}
