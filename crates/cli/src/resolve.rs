//! `placefuse resolve | label | validate`: config-driven place resolution.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use placefuse_resolve::config::ModelConfig;
use placefuse_resolve::ingest::load_source;
use placefuse_resolve::model::PairLabel;
use placefuse_resolve::output::{
    write_pairs_jsonl, write_review_csv, GoldenRecordWriter, RecordLookup,
};
use placefuse_resolve::{
    ChunkStore, DirChunkStore, ManualOverrides, ResolveConfig, ResolveError, ResolveInput,
    SourceTag,
};

use crate::exit_codes::{
    resolve_exit_code, EXIT_ERROR, EXIT_RESOLVE_INVALID_CONFIG, EXIT_RESOLVE_RUNTIME, EXIT_USAGE,
};
use crate::CliError;

fn resolve_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

impl From<ResolveError> for CliError {
    fn from(err: ResolveError) -> Self {
        let hint = match &err {
            ResolveError::ScorerUnavailable => {
                Some("add [decision.model] with kind = \"linear\" or kind = \"rules\"".to_string())
            }
            ResolveError::DuplicateId { .. } => {
                Some("give each source a distinct id_prefix".to_string())
            }
            ResolveError::CheckpointMismatch(_) => {
                Some("point --checkpoint-dir at an empty directory".to_string())
            }
            _ => None,
        };
        CliError { code: resolve_exit_code(&err), message: err.to_string(), hint }
    }
}

// ---------------------------------------------------------------------------
// Shared loading
// ---------------------------------------------------------------------------

/// A path named on the command line that does not exist is a usage error.
fn require_file(path: &Path, what: &str) -> Result<(), CliError> {
    if path.is_file() {
        return Ok(());
    }
    Err(resolve_err(EXIT_USAGE, format!("{what} not found: {}", path.display())))
}

fn load_config(config_path: &Path) -> Result<ResolveConfig, CliError> {
    require_file(config_path, "config")?;
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        resolve_err(
            EXIT_RESOLVE_RUNTIME,
            format!("cannot read config {}: {e}", config_path.display()),
        )
    })?;
    let config = ResolveConfig::from_toml(&config_str)?;

    for tag in &config.blocking.anchor_sources {
        if !config.sources.contains_key(tag.as_str()) {
            return Err(ResolveError::UnknownSource(format!(
                "blocking.anchor_sources lists '{tag}' but there is no [sources.{tag}]"
            ))
            .into());
        }
    }
    for tag in &config.survivorship.source_priority {
        if !config.sources.is_empty() && !config.sources.contains_key(tag.as_str()) {
            log::warn!("survivorship.source_priority lists '{tag}', which has no [sources.{tag}]");
        }
    }
    Ok(config)
}

/// Read every configured source. File paths resolve relative to the config
/// file's directory.
fn load_input(config: &ResolveConfig, config_path: &Path) -> Result<ResolveInput, CliError> {
    if config.sources.is_empty() {
        return Err(resolve_err(EXIT_RESOLVE_INVALID_CONFIG, "config has no sources")
            .with_hint("add at least one [sources.<tag>] block"));
    }
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let mut records = Vec::new();
    for (tag, source) in &config.sources {
        let path = base_dir.join(&source.file);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            resolve_err(EXIT_RESOLVE_RUNTIME, format!("cannot read {}: {e}", path.display()))
        })?;
        records.extend(load_source(&SourceTag::from(tag.as_str()), &data, source)?);
    }
    Ok(ResolveInput { records })
}

fn create_file(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path).map(BufWriter::new).map_err(|e| {
        resolve_err(EXIT_RESOLVE_RUNTIME, format!("cannot write {}: {e}", path.display()))
    })
}

fn model_name(config: &ResolveConfig) -> &'static str {
    match config.decision.model {
        Some(ModelConfig::Linear { .. }) => "linear",
        Some(ModelConfig::Rules) => "rules",
        None => "none",
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

pub fn cmd_resolve(
    config_path: PathBuf,
    output_file: Option<PathBuf>,
    json_output: bool,
    checkpoint_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    // Fail before reading any source data.
    if config.decision.model.is_none() {
        return Err(ResolveError::ScorerUnavailable.into());
    }

    let input = load_input(&config, &config_path)?;
    let store = checkpoint_dir.map(DirChunkStore::new);
    let result = placefuse_resolve::run(
        &config,
        &input,
        None,
        store.as_ref().map(|s| s as &dyn ChunkStore),
    )?;

    if let Some(ref path) = output_file {
        let mut writer = GoldenRecordWriter::new(create_file(path)?);
        writer.write_all(&result.golden_records)?;
        writer.finish()?;
        eprintln!("wrote {} golden records to {}", result.golden_records.len(), path.display());
    }

    if json_output {
        let json_str = serde_json::to_string_pretty(&result).map_err(|e| {
            resolve_err(EXIT_ERROR, format!("JSON serialization error: {e}"))
        })?;
        println!("{json_str}");
    } else if output_file.is_none() {
        let stdout = io::stdout();
        let mut writer = GoldenRecordWriter::new(stdout.lock());
        writer.write_all(&result.golden_records)?;
        drop(writer.finish()?);
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "resolve '{}': {} records, {} candidate pairs, {} accepted matches",
        result.meta.config_name, s.records, s.candidate_pairs, s.accepted_edges,
    );
    eprintln!(
        "clusters: {} ({} multi-member, {} singletons)",
        s.clusters, s.multi_member_clusters, s.singleton_clusters,
    );
    if s.dropped_no_coords > 0 || s.dropped_no_name > 0 {
        eprintln!(
            "not blocked: {} without coordinates, {} without a name",
            s.dropped_no_coords, s.dropped_no_name,
        );
    }
    if s.chunks_resumed > 0 {
        eprintln!("resumed {} chunk(s) from checkpoint", s.chunks_resumed);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// label
// ---------------------------------------------------------------------------

pub fn cmd_label(
    config_path: PathBuf,
    overrides_file: Option<PathBuf>,
    review_out: Option<PathBuf>,
    training_out: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    let overrides = match overrides_file {
        Some(ref path) => {
            require_file(path, "overrides file")?;
            let file = File::open(path).map_err(|e| {
                resolve_err(EXIT_RESOLVE_RUNTIME, format!("cannot read {}: {e}", path.display()))
            })?;
            ManualOverrides::from_csv(file)?
        }
        None => ManualOverrides::new(),
    };

    let input = load_input(&config, &config_path)?;
    let output = placefuse_resolve::run_training(&config, &input, &overrides, None)?;
    let records = RecordLookup::new(&input.records);

    if let Some(ref path) = review_out {
        write_review_csv(create_file(path)?, &output.review_queue, &records)?;
        eprintln!("wrote {} pairs for review to {}", output.review_queue.len(), path.display());
    }
    if let Some(ref path) = training_out {
        write_pairs_jsonl(create_file(path)?, &output.training_set, &records)?;
        eprintln!("wrote {} training pairs to {}", output.training_set.len(), path.display());
    }

    let count = |label| output.labeled.iter().filter(|p| p.label == label).count();
    eprintln!(
        "label '{}': {} pairs, {} positive, {} negative, {} ambiguous",
        config.name,
        output.labeled.len(),
        count(PairLabel::Positive),
        count(PairLabel::Negative),
        count(PairLabel::Ambiguous),
    );
    eprintln!(
        "overrides: {} applied, {} rows ignored",
        output.overrides_applied, overrides.rejected_rows,
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    eprintln!(
        "config '{}' is valid: {} source(s), radius {} m, model {}, threshold {}",
        config.name,
        config.sources.len(),
        config.blocking.radius_m,
        model_name(&config),
        config.decision.threshold,
    );
    if config.decision.model.is_none() {
        eprintln!("note: no [decision.model]; `placefuse label` works, `placefuse resolve` will fail");
    }
    Ok(())
}
