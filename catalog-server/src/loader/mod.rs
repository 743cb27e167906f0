//! Catalog bulk loader
//!
//! Seeds an empty store from a JSON feed at startup. Reference rows are
//! written first as one deduplicated batch, then re-read so every product
//! resolves against committed ids. Only an unreadable or unparsable feed
//! aborts the run; every later failure is logged and skipped.

pub mod feed;

use crate::db::{CatalogStore, StorageError};
use crate::utils::logger::CATALOG_LOAD_TARGET;
use crate::utils::validation::{MAX_NAME_LEN, validate_price, validate_required_text};
use feed::{FeedDocument, FeedRecord};
use shared::models::{Category, Currency, NewProduct, ProductFull};
use shared::util::now_millis;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read feed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Store(#[from] StorageError),
}

/// One feed record that was not saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub material_id: String,
    pub reason: String,
}

/// Summary of a completed load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Records in the feed
    pub records: usize,
    pub currencies_inserted: usize,
    pub categories_inserted: usize,
    /// Saved products, in feed order
    pub saved: Vec<ProductFull>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    /// Saved products per category name
    pub fn per_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for product in &self.saved {
            *counts.entry(product.category.name.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of [`CatalogLoader::run`]
#[derive(Debug)]
pub enum LoadOutcome {
    /// Store already held products; nothing was written
    Skipped { existing: u64 },
    Loaded(LoadReport),
}

pub struct CatalogLoader {
    store: Arc<dyn CatalogStore>,
}

impl CatalogLoader {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Load the feed only if the product store is empty
    pub fn run(&self, feed_path: &Path) -> Result<LoadOutcome, LoaderError> {
        let existing = self.store.count_products()?;
        if existing > 0 {
            tracing::warn!(existing, "Product store is not empty, feed not loaded");
            return Ok(LoadOutcome::Skipped { existing });
        }
        self.load(feed_path).map(LoadOutcome::Loaded)
    }

    /// Read and load the feed at `feed_path` unconditionally
    pub fn load(&self, feed_path: &Path) -> Result<LoadReport, LoaderError> {
        tracing::info!(path = %feed_path.display(), "Loading product feed");
        let file = std::fs::File::open(feed_path).map_err(|source| LoaderError::Io {
            path: feed_path.to_path_buf(),
            source,
        })?;
        self.load_from_reader(std::io::BufReader::new(file))
    }

    pub fn load_from_reader(&self, reader: impl Read) -> Result<LoadReport, LoaderError> {
        // Parse fully before the first write
        let document: FeedDocument = serde_json::from_reader(reader)?;
        Ok(self.load_document(document))
    }

    pub fn load_document(&self, document: FeedDocument) -> LoadReport {
        let mut report = LoadReport {
            records: document.products.len(),
            ..LoadReport::default()
        };

        self.save_references(&document.products, &mut report);
        let (currencies, categories) = self.reference_maps();

        for record in document.products {
            match self.save_product(&record, &currencies, &categories) {
                Ok(product) => report.saved.push(product),
                Err(reason) => {
                    tracing::error!(
                        material_id = %record.material_id,
                        name = %record.name,
                        %reason,
                        "Error saving product"
                    );
                    report.failures.push(LoadFailure {
                        material_id: record.material_id,
                        reason,
                    });
                }
            }
        }

        log_summary(&report);
        report
    }

    /// Batch-insert distinct codes and names; a failure degrades the run, it does not stop it
    fn save_references(&self, records: &[FeedRecord], report: &mut LoadReport) {
        let codes: BTreeSet<String> = records
            .iter()
            .map(|r| r.currency.code().to_string())
            .collect();
        let names: BTreeSet<String> = records
            .iter()
            .map(|r| r.category.name().to_string())
            .collect();

        let codes: Vec<String> = codes.into_iter().collect();
        match self.store.insert_currencies(&codes) {
            Ok(inserted) => report.currencies_inserted = inserted,
            Err(e) => tracing::error!(error = %e, "Error while saving currencies"),
        }

        let names: Vec<String> = names.into_iter().collect();
        match self.store.insert_categories(&names) {
            Ok(inserted) => report.categories_inserted = inserted,
            Err(e) => tracing::error!(error = %e, "Error while saving categories"),
        }
    }

    /// Lookup maps from committed rows (empty on read failure)
    fn reference_maps(&self) -> (HashMap<String, Currency>, HashMap<String, Category>) {
        let currencies = match self.store.find_all_currencies() {
            Ok(rows) => rows.into_iter().map(|c| (c.code.clone(), c)).collect(),
            Err(e) => {
                tracing::error!(error = %e, "Error while reading currencies");
                HashMap::new()
            }
        };
        let categories = match self.store.find_all_categories() {
            Ok(rows) => rows.into_iter().map(|c| (c.name.clone(), c)).collect(),
            Err(e) => {
                tracing::error!(error = %e, "Error while reading categories");
                HashMap::new()
            }
        };
        (currencies, categories)
    }

    fn save_product(
        &self,
        record: &FeedRecord,
        currencies: &HashMap<String, Currency>,
        categories: &HashMap<String, Category>,
    ) -> Result<ProductFull, String> {
        validate_required_text(&record.material_id, "materialId", MAX_NAME_LEN)
            .and_then(|_| validate_required_text(&record.name, "name", MAX_NAME_LEN))
            .and_then(|_| validate_price(record.price))
            .map_err(|e| e.to_string())?;

        let currency = currencies
            .get(record.currency.code())
            .ok_or_else(|| format!("unresolved currency {}", record.currency.code()))?;
        let category = categories
            .get(record.category.name())
            .ok_or_else(|| format!("unresolved category {}", record.category.name()))?;

        let product = self
            .store
            .insert_product(NewProduct {
                material_id: record.material_id.clone(),
                name: record.name.clone(),
                price: record.price,
                currency_id: currency.id,
                category_id: category.id,
                last_modified_at: now_millis(),
            })
            .map_err(|e| e.to_string())?;

        Ok(ProductFull::from_parts(
            product,
            currency.clone(),
            category.clone(),
        ))
    }
}

fn log_summary(report: &LoadReport) {
    tracing::info!(
        count = report.saved_count(),
        failed = report.failures.len(),
        records = report.records,
        "Json products have been saved!"
    );

    for (category, count) in report.per_category() {
        tracing::info!(%category, count, "Material count per category");
    }

    for product in &report.saved {
        tracing::debug!(
            target: CATALOG_LOAD_TARGET,
            id = product.id,
            material_id = %product.material_id,
            name = %product.name,
            price = %product.price,
            currency = %product.currency.code,
            category = %product.category.name,
            "Saved product"
        );
    }
}
