//! redb-based storage layer for the product catalog
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `currencies` | `code` | `Currency` | Currency rows, unique by code |
//! | `currency_ids` | `id` | `code` | Id index for currency references |
//! | `categories` | `name` | `Category` | Category rows, unique by name |
//! | `category_ids` | `id` | `name` | Id index for category references |
//! | `products` | `id` | `Product` | Product rows |
//! | `product_material_index` | `material_id` | `id` | Enforces unique material ids |
//! | `sequence_counter` | table name | `u64` | Id sequences, one per table |
//!
//! All uniqueness checks happen inside the write transaction that inserts the
//! row. redb serializes writers, so two racing inserts of the same key resolve
//! to exactly one success and one [`StorageError::Duplicate`].

use super::CatalogStore;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::models::{Category, Currency, NewProduct, Product, ProductFull};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Currency rows: key = code, value = JSON-serialized Currency
const CURRENCIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("currencies");

/// Currency id index: key = id, value = code
const CURRENCY_IDS_TABLE: TableDefinition<i64, &str> = TableDefinition::new("currency_ids");

/// Category rows: key = name, value = JSON-serialized Category
const CATEGORIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("categories");

/// Category id index: key = id, value = name
const CATEGORY_IDS_TABLE: TableDefinition<i64, &str> = TableDefinition::new("category_ids");

/// Product rows: key = id, value = JSON-serialized Product
const PRODUCTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("products");

/// Material id uniqueness index: key = material_id, value = product id
const MATERIAL_INDEX_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("product_material_index");

/// Id sequences: key = table name, value = last issued id
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const CURRENCY_SEQ_KEY: &str = "currencies";
const CATEGORY_SEQ_KEY: &str = "categories";
const PRODUCT_SEQ_KEY: &str = "products";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unique key already taken
    #[error("Duplicate {table} key: {key}")]
    Duplicate { table: &'static str, key: String },

    /// Row referenced by id does not exist
    #[error("Missing {table} reference: id={id}")]
    MissingReference { table: &'static str, id: i64 },

    #[error("Product not found: {0}")]
    ProductNotFound(i64),
}

impl StorageError {
    /// Unique-constraint violation (the only error callers are expected to recover from)
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Catalog storage backed by redb
#[derive(Clone)]
pub struct CatalogStorage {
    db: Arc<Database>,
}

impl CatalogStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CURRENCIES_TABLE)?;
            let _ = write_txn.open_table(CURRENCY_IDS_TABLE)?;
            let _ = write_txn.open_table(CATEGORIES_TABLE)?;
            let _ = write_txn.open_table(CATEGORY_IDS_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(MATERIAL_INDEX_TABLE)?;
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            for key in [CURRENCY_SEQ_KEY, CATEGORY_SEQ_KEY, PRODUCT_SEQ_KEY] {
                if seq_table.get(key)?.is_none() {
                    seq_table.insert(key, 0u64)?;
                }
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Sequence Operations ==========

    /// Increment and return the id sequence for a table (within transaction)
    fn next_id(txn: &WriteTransaction, key: &str) -> StorageResult<i64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table.get(key)?.map(|v| v.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(key, next)?;
        Ok(next as i64)
    }

    // ========== Reference Operations ==========

    fn insert_currency_txn(txn: &WriteTransaction, code: &str) -> StorageResult<Currency> {
        let mut table = txn.open_table(CURRENCIES_TABLE)?;
        if table.get(code)?.is_some() {
            return Err(StorageError::Duplicate {
                table: "currencies",
                key: code.to_string(),
            });
        }
        let currency = Currency {
            id: Self::next_id(txn, CURRENCY_SEQ_KEY)?,
            code: code.to_string(),
        };
        let value = serde_json::to_vec(&currency)?;
        table.insert(code, value.as_slice())?;
        txn.open_table(CURRENCY_IDS_TABLE)?
            .insert(currency.id, code)?;
        Ok(currency)
    }

    fn insert_category_txn(txn: &WriteTransaction, name: &str) -> StorageResult<Category> {
        let mut table = txn.open_table(CATEGORIES_TABLE)?;
        if table.get(name)?.is_some() {
            return Err(StorageError::Duplicate {
                table: "categories",
                key: name.to_string(),
            });
        }
        let category = Category {
            id: Self::next_id(txn, CATEGORY_SEQ_KEY)?,
            name: name.to_string(),
        };
        let value = serde_json::to_vec(&category)?;
        table.insert(name, value.as_slice())?;
        txn.open_table(CATEGORY_IDS_TABLE)?
            .insert(category.id, name)?;
        Ok(category)
    }

    /// Both references must exist before a product row is written
    fn check_references(txn: &WriteTransaction, currency_id: i64, category_id: i64) -> StorageResult<()> {
        if txn.open_table(CURRENCY_IDS_TABLE)?.get(currency_id)?.is_none() {
            return Err(StorageError::MissingReference {
                table: "currencies",
                id: currency_id,
            });
        }
        if txn.open_table(CATEGORY_IDS_TABLE)?.get(category_id)?.is_none() {
            return Err(StorageError::MissingReference {
                table: "categories",
                id: category_id,
            });
        }
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_by_key<T: serde::de::DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> StorageResult<Option<T>> {
    match table.get(key)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn collect_all<T: serde::de::DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> StorageResult<Vec<T>> {
    let mut rows = Vec::new();
    for result in table.iter()? {
        let (_key, value) = result?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

/// Resolve a product row against preloaded reference maps
fn join(
    product: Product,
    currencies: &HashMap<i64, Currency>,
    categories: &HashMap<i64, Category>,
) -> StorageResult<ProductFull> {
    let currency = currencies
        .get(&product.currency_id)
        .cloned()
        .ok_or(StorageError::MissingReference {
            table: "currencies",
            id: product.currency_id,
        })?;
    let category = categories
        .get(&product.category_id)
        .cloned()
        .ok_or(StorageError::MissingReference {
            table: "categories",
            id: product.category_id,
        })?;
    Ok(ProductFull::from_parts(product, currency, category))
}

impl CatalogStore for CatalogStorage {
    fn count_products(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        Ok(table.len()?)
    }

    fn insert_currencies(&self, codes: &[String]) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let mut inserted = 0;
        for code in codes {
            match Self::insert_currency_txn(&txn, code) {
                Ok(_) => inserted += 1,
                Err(e) if e.is_duplicate() => {}
                Err(e) => return Err(e),
            }
        }
        txn.commit()?;
        Ok(inserted)
    }

    fn insert_categories(&self, names: &[String]) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let mut inserted = 0;
        for name in names {
            match Self::insert_category_txn(&txn, name) {
                Ok(_) => inserted += 1,
                Err(e) if e.is_duplicate() => {}
                Err(e) => return Err(e),
            }
        }
        txn.commit()?;
        Ok(inserted)
    }

    fn insert_currency(&self, code: &str) -> StorageResult<Currency> {
        let txn = self.db.begin_write()?;
        let currency = Self::insert_currency_txn(&txn, code)?;
        txn.commit()?;
        Ok(currency)
    }

    fn insert_category(&self, name: &str) -> StorageResult<Category> {
        let txn = self.db.begin_write()?;
        let category = Self::insert_category_txn(&txn, name)?;
        txn.commit()?;
        Ok(category)
    }

    fn find_currency_by_code(&self, code: &str) -> StorageResult<Option<Currency>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CURRENCIES_TABLE)?;
        get_by_key(&table, code)
    }

    fn find_category_by_name(&self, name: &str) -> StorageResult<Option<Category>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CATEGORIES_TABLE)?;
        get_by_key(&table, name)
    }

    fn find_all_currencies(&self) -> StorageResult<Vec<Currency>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CURRENCIES_TABLE)?;
        collect_all(&table)
    }

    fn find_all_categories(&self) -> StorageResult<Vec<Category>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CATEGORIES_TABLE)?;
        collect_all(&table)
    }

    fn insert_product(&self, product: NewProduct) -> StorageResult<Product> {
        let txn = self.db.begin_write()?;
        Self::check_references(&txn, product.currency_id, product.category_id)?;
        {
            let index = txn.open_table(MATERIAL_INDEX_TABLE)?;
            if index.get(product.material_id.as_str())?.is_some() {
                return Err(StorageError::Duplicate {
                    table: "products",
                    key: product.material_id,
                });
            }
        }

        let row = Product {
            id: Self::next_id(&txn, PRODUCT_SEQ_KEY)?,
            material_id: product.material_id,
            name: product.name,
            price: product.price,
            currency_id: product.currency_id,
            category_id: product.category_id,
            last_modified_at: product.last_modified_at,
        };
        let value = serde_json::to_vec(&row)?;
        txn.open_table(PRODUCTS_TABLE)?
            .insert(row.id, value.as_slice())?;
        txn.open_table(MATERIAL_INDEX_TABLE)?
            .insert(row.material_id.as_str(), row.id)?;
        txn.commit()?;

        Ok(row)
    }

    fn save_product(&self, product: &Product) -> StorageResult<Product> {
        let txn = self.db.begin_write()?;
        Self::check_references(&txn, product.currency_id, product.category_id)?;

        let previous: Product = {
            let table = txn.open_table(PRODUCTS_TABLE)?;
            let existing = table.get(product.id)?;
            match existing {
                Some(value) => decode(value.value())?,
                None => return Err(StorageError::ProductNotFound(product.id)),
            }
        };

        if previous.material_id != product.material_id {
            let mut index = txn.open_table(MATERIAL_INDEX_TABLE)?;
            let owner = index.get(product.material_id.as_str())?.map(|v| v.value());
            if owner.is_some_and(|id| id != product.id) {
                return Err(StorageError::Duplicate {
                    table: "products",
                    key: product.material_id.clone(),
                });
            }
            index.remove(previous.material_id.as_str())?;
            index.insert(product.material_id.as_str(), product.id)?;
        }

        let value = serde_json::to_vec(product)?;
        txn.open_table(PRODUCTS_TABLE)?
            .insert(product.id, value.as_slice())?;
        txn.commit()?;

        Ok(product.clone())
    }

    fn find_product_row(&self, id: i64) -> StorageResult<Option<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_product_by_id(&self, id: i64) -> StorageResult<Option<ProductFull>> {
        let read_txn = self.db.begin_read()?;
        let products = read_txn.open_table(PRODUCTS_TABLE)?;
        let product: Product = match products.get(id)? {
            Some(value) => decode(value.value())?,
            None => return Ok(None),
        };

        let currency_code = read_txn
            .open_table(CURRENCY_IDS_TABLE)?
            .get(product.currency_id)?
            .map(|v| v.value().to_string())
            .ok_or(StorageError::MissingReference {
                table: "currencies",
                id: product.currency_id,
            })?;
        let category_name = read_txn
            .open_table(CATEGORY_IDS_TABLE)?
            .get(product.category_id)?
            .map(|v| v.value().to_string())
            .ok_or(StorageError::MissingReference {
                table: "categories",
                id: product.category_id,
            })?;

        let currency: Option<Currency> =
            get_by_key(&read_txn.open_table(CURRENCIES_TABLE)?, &currency_code)?;
        let category: Option<Category> =
            get_by_key(&read_txn.open_table(CATEGORIES_TABLE)?, &category_name)?;
        match (currency, category) {
            (Some(currency), Some(category)) => {
                Ok(Some(ProductFull::from_parts(product, currency, category)))
            }
            (None, _) => Err(StorageError::MissingReference {
                table: "currencies",
                id: product.currency_id,
            }),
            (_, None) => Err(StorageError::MissingReference {
                table: "categories",
                id: product.category_id,
            }),
        }
    }

    fn find_all_products(&self) -> StorageResult<Vec<ProductFull>> {
        // Single read transaction: products and references come from one snapshot
        let read_txn = self.db.begin_read()?;
        let currencies: HashMap<i64, Currency> =
            collect_all::<Currency>(&read_txn.open_table(CURRENCIES_TABLE)?)?
                .into_iter()
                .map(|c| (c.id, c))
                .collect();
        let categories: HashMap<i64, Category> =
            collect_all::<Category>(&read_txn.open_table(CATEGORIES_TABLE)?)?
                .into_iter()
                .map(|c| (c.id, c))
                .collect();

        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        let mut products = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let product: Product = decode(value.value())?;
            products.push(join(product, &currencies, &categories)?);
        }

        Ok(products)
    }
}
