// Creazione delle collezioni prezzi/dividendi e dei relativi indici
use crate::admin::database::Database;
use async_trait::async_trait;
use log::info;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const COLLECTION_KINDS: [&str; 2] = ["prices", "dividends"];
pub const DATE_INDEX: IndexSpec = IndexSpec { field: "date", ascending: true };

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/stocks_yahoo_NYSE.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: &'static str,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSpec {
    pub letter: char,
    pub kind: &'static str,
    pub index: IndexSpec,
}

impl CollectionSpec {
    pub fn name(&self) -> String {
        format!("{}_{}", self.letter, self.kind)
    }
}

/// `A_prices`, `A_dividends`, `B_prices`, ... each indexed on `date` ascending.
pub fn seed_plan() -> impl Iterator<Item = CollectionSpec> {
    LETTERS.chars().flat_map(|letter| {
        COLLECTION_KINDS
            .into_iter()
            .map(move |kind| CollectionSpec { letter, kind, index: DATE_INDEX })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Create the collections.
    Prep,
    /// Create the indices.
    Finish,
    All,
}

impl Phase {
    fn creates_collections(&self) -> bool {
        matches!(self, Phase::Prep | Phase::All)
    }

    fn creates_indexes(&self) -> bool {
        matches!(self, Phase::Finish | Phase::All)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prep" => Ok(Phase::Prep),
            "finish" => Ok(Phase::Finish),
            "all" => Ok(Phase::All),
            other => Err(format!("unknown phase '{}', expected prep, finish or all", other)),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Prep => "prep",
            Phase::Finish => "finish",
            Phase::All => "all",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid collection name '{0}'")]
    InvalidName(String),
}

#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn create_collection(&self, name: &str) -> Result<(), SeedError>;
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), SeedError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub collections: usize,
    pub indexes: usize,
}

pub async fn run_phase<S: SeedStore + ?Sized>(store: &S, phase: Phase) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    for letter in LETTERS.chars() {
        let specs: Vec<CollectionSpec> = seed_plan().filter(|s| s.letter == letter).collect();
        let names = specs.iter().map(CollectionSpec::name).collect::<Vec<_>>().join(" and ");

        if phase.creates_collections() {
            info!("[SEED] Creating collections {}", names);
            for spec in &specs {
                store.create_collection(&spec.name()).await?;
                report.collections += 1;
            }
        }
        if phase.creates_indexes() {
            info!("[SEED] Indexing collections {}", names);
            for spec in &specs {
                store.create_index(&spec.name(), &spec.index).await?;
                report.indexes += 1;
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub database_url: String,
}

impl SeedConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        }
    }
}

/// Each collection becomes a table holding raw JSON documents.
pub struct SqliteSeedStore {
    db: Database,
}

impl SqliteSeedStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SeedStore for SqliteSeedStore {
    async fn create_collection(&self, name: &str) -> Result<(), SeedError> {
        let table = quoted(name)?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, date TEXT, document TEXT NOT NULL)",
            table
        );
        sqlx::query(&sql).execute(&self.db.pool).await?;
        Ok(())
    }

    /// Creates the collection first when it is missing, so `finish` works on a fresh store.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), SeedError> {
        self.create_collection(collection).await?;
        let table = quoted(collection)?;
        let order = if index.ascending { "ASC" } else { "DESC" };
        let index_name = quoted(&format!("{}_{}_{}", collection, index.field, order.to_ascii_lowercase()))?;
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({} {})",
            index_name,
            table,
            quoted(index.field)?,
            order
        );
        sqlx::query(&sql).execute(&self.db.pool).await?;
        Ok(())
    }
}

/// Identifiers cannot be bound as parameters, so only `[A-Za-z0-9_]` is let through.
fn quoted(name: &str) -> Result<String, SeedError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SeedError::InvalidName(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}
