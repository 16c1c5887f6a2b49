//! Seed the catalog from an export file.
//!
//! The file is a list of catalog records in the export layout used by the
//! merchant's spreadsheet (`ID`, `Description`, `Product`, `Price`,
//! `Material`, `ImageUrl1`..`ImageUrl3`). JSON and YAML are both accepted.
//!
//! # Usage
//!
//! ```bash
//! ballerz seed catalog data/catalog.json
//!
//! # Validate without writing
//! ballerz seed catalog data/catalog.json --dry-run
//! ```

use std::collections::HashSet;
use std::path::Path;

use ballerz_core::{CatalogItem, CatalogRecord};
use ballerz_storefront::db::{CatalogRepository, RepositoryError};
use thiserror::Error;
use tracing::{error, info};

use super::{CommandError, connect};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Parse catalog records into items.
///
/// # Errors
///
/// Returns `SeedError::Parse` if the content is not a list of records.
pub fn parse_catalog(content: &str) -> Result<Vec<CatalogItem>, SeedError> {
    let records: Vec<CatalogRecord> = serde_yaml::from_str(content)?;
    Ok(records.into_iter().map(CatalogItem::from).collect())
}

/// Problems that would make the catalog unusable in the shop.
///
/// Products are addressed by description, so descriptions must be unique
/// and non-empty. Ids must be unique and prices non-negative.
#[must_use]
pub fn validate_catalog(items: &[CatalogItem]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut descriptions = HashSet::new();

    for item in items {
        if item.description.is_empty() {
            errors.push(format!("item {}: empty description", item.id));
        } else if !descriptions.insert(item.description.to_lowercase()) {
            errors.push(format!("item {}: duplicate description {:?}", item.id, item.description));
        }
        if !ids.insert(item.id.clone()) {
            errors.push(format!("item {}: duplicate id", item.id));
        }
        if item.category.is_empty() {
            errors.push(format!("item {}: empty product category", item.id));
        }
        if item.price.is_negative() {
            errors.push(format!("item {}: negative price", item.id));
        }
    }

    errors
}

/// Load a catalog file into the database.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, validation fails,
/// or a database write fails.
pub async fn catalog(file_path: &str, dry_run: bool) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::FileNotFound(file_path.to_owned()));
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let items = parse_catalog(&content)?;
    info!(items = items.len(), "Parsed catalog");

    let errors = validate_catalog(&items);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(errors.len()));
    }

    if dry_run {
        info!("Dry run: catalog is valid, nothing written");
        return Ok(());
    }

    let pool = connect().await?;
    let repo = CatalogRepository::new(&pool);
    for item in &items {
        repo.upsert(item).await?;
    }

    info!("Seeding complete!");
    info!("  Items written: {}", items.len());
    Ok(())
}
