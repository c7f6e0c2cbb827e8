//! Configuration management for the work-item engine.
//!
//! Configuration sources and precedence (highest wins). Environment
//! variables govern transport, database path, and server identity only:
//!
//! 1. Environment variables
//! 2. Defaults
//!
//! # Submodules
//!
//! - [`note_schema`] - the per-tag gate schema, loaded once and frozen

pub mod note_schema;

use crate::error::Result;
use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;

pub use note_schema::NoteSchema;

const DEFAULT_DB_FILENAME: &str = "workitems.db";
const DEFAULT_NOTE_SCHEMA_FILENAME: &str = "note_schema.yaml";
const DEFAULT_PRESERVE_TAGS: &[&str] = &["bugfix", "hotfix", "critical"];

/// Which transport `main` should run. Wire framing lives elsewhere; this
/// only selects which loop to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

/// Resolved process-wide configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_path: PathBuf,
    pub transport: Transport,
    pub http_host: String,
    pub http_port: u16,
    pub note_schema_path: PathBuf,
    pub preserve_on_cleanup_tags: Vec<String>,
}

impl ServerConfig {
    /// Resolve configuration from the environment, applying defaults for
    /// anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_FILENAME));

        let transport = match env::var("WIE_TRANSPORT").as_deref() {
            Ok("http") => Transport::Http,
            _ => Transport::Stdio,
        };

        let http_host = env::var("WIE_HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let http_port = env::var("WIE_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let note_schema_path = env::var("WIE_NOTE_SCHEMA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_NOTE_SCHEMA_FILENAME));

        let preserve_on_cleanup_tags = env::var("WIE_PRESERVE_TAGS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_PRESERVE_TAGS
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            });

        Self {
            database_path,
            transport,
            http_host,
            http_port,
            note_schema_path,
            preserve_on_cleanup_tags,
        }
    }
}

/// Process-wide note schema registry. Loaded once via [`init_note_schema`]
/// and immutable thereafter; every call site reads through [`note_schema`].
static NOTE_SCHEMA: OnceCell<NoteSchema> = OnceCell::new();

/// Load and freeze the note schema registry for the remainder of the
/// process. Calling this more than once is a no-op after the first call
/// succeeds.
///
/// # Errors
///
/// Returns an error if the schema file exists but cannot be read or parsed.
pub fn init_note_schema(path: &std::path::Path) -> Result<()> {
    let schema = NoteSchema::load(path)?;
    let _ = NOTE_SCHEMA.set(schema);
    Ok(())
}

/// Read the frozen note schema registry. Returns an empty schema if
/// [`init_note_schema`] has not been called yet (e.g. in unit tests that
/// construct services directly).
#[must_use]
pub fn note_schema() -> &'static NoteSchema {
    NOTE_SCHEMA.get_or_init(NoteSchema::default)
}
