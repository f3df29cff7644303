use std::fmt;

#[derive(Debug)]
pub enum ResolveError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (threshold out of range, bad priority list, etc.).
    ConfigValidation(String),
    /// A source referenced by the config has no mapping or data.
    UnknownSource(String),
    /// Missing required column/field in a source file.
    MissingField { source: String, field: String },
    /// Two input records share an id.
    DuplicateId { id: String, first_source: String, second_source: String },
    /// No match scorer configured or injected.
    ScorerUnavailable,
    /// The scorer returned something outside its contract.
    ScorerContract(String),
    /// Checkpoint directory was written by an incompatible run.
    CheckpointMismatch(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::UnknownSource(source) => write!(f, "unknown source: {source}"),
            Self::MissingField { source, field } => {
                write!(f, "source '{source}': missing field '{field}'")
            }
            Self::DuplicateId { id, first_source, second_source } => write!(
                f,
                "duplicate record id '{id}' (sources '{first_source}' and '{second_source}'); \
                 set id_prefix on one of the sources"
            ),
            Self::ScorerUnavailable => write!(
                f,
                "no match scorer configured: add a [decision.model] section or inject a scorer"
            ),
            Self::ScorerContract(msg) => write!(f, "match scorer contract violation: {msg}"),
            Self::CheckpointMismatch(msg) => write!(f, "checkpoint mismatch: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
