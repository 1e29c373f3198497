//! Seed product stock levels.
//!
//! The file is a JSON array:
//!
//! ```json
//! [
//!   { "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427", "name": "Walnut bowl", "stock": 12 },
//!   { "name": "Ash spoon", "stock": 40 }
//! ]
//! ```
//!
//! Entries without an id get a fresh one, which is printed so it can be
//! used as the `productId` of cart line items. Existing products are
//! overwritten with the given name and level.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use atelier_core::ProductId;
use atelier_storefront::db::{PgStockLedger, RepositoryError, StockLedger};

use super::{ConnectError, connect};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid product {name:?}: {reason}")]
    Invalid { name: String, reason: &'static str },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Deserialize)]
struct ProductSeed {
    id: Option<ProductId>,
    name: String,
    stock: u32,
}

fn load(file_path: &str) -> Result<Vec<ProductSeed>, SeedError> {
    let contents = std::fs::read_to_string(Path::new(file_path)).map_err(|source| SeedError::Read {
        path: file_path.to_owned(),
        source,
    })?;
    let seeds: Vec<ProductSeed> = serde_json::from_str(&contents)?;

    for seed in &seeds {
        if seed.name.trim().is_empty() {
            return Err(SeedError::Invalid {
                name: seed.name.clone(),
                reason: "name is required",
            });
        }
        if i32::try_from(seed.stock).is_err() {
            return Err(SeedError::Invalid {
                name: seed.name.clone(),
                reason: "stock is too large",
            });
        }
    }
    Ok(seeds)
}

/// Set stock levels for every product in `file_path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or a write fails.
/// The file is validated in full before anything is written.
pub async fn products(file_path: &str) -> Result<(), SeedError> {
    let seeds = load(file_path)?;
    let pool = connect().await?;
    let ledger = PgStockLedger::new(pool);

    for seed in &seeds {
        let id = seed.id.unwrap_or_else(ProductId::generate);
        ledger.set_level(id, seed.name.trim(), seed.stock).await?;
        tracing::info!("  {} {} -> {}", id, seed.name.trim(), seed.stock);
    }

    tracing::info!("Seeded {} products", seeds.len());
    Ok(())
}
