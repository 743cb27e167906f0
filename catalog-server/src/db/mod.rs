//! Database Module
//!
//! Embedded redb storage for the catalog. The engine is synchronous: every
//! call blocks the calling thread until the transaction commits, so async
//! callers go through [`crate::services::BlockingExecutor`].

pub mod storage;

pub use storage::{CatalogStorage, StorageError, StorageResult};

use shared::models::{Category, Currency, NewProduct, Product, ProductFull};

/// Capability set the catalog needs from its store
///
/// Uniqueness of currency codes, category names and product material ids is
/// enforced by the store; callers rely on [`StorageError::Duplicate`] to
/// arbitrate races instead of locking.
pub trait CatalogStore: Send + Sync + 'static {
    /// Number of product rows
    fn count_products(&self) -> StorageResult<u64>;

    /// Insert every currency code not yet present, in one transaction.
    /// Existing codes are skipped. Returns the number of rows inserted.
    fn insert_currencies(&self, codes: &[String]) -> StorageResult<usize>;

    /// Insert every category name not yet present, in one transaction.
    /// Existing names are skipped. Returns the number of rows inserted.
    fn insert_categories(&self, names: &[String]) -> StorageResult<usize>;

    /// Insert a single currency; fails with `Duplicate` if the code exists
    fn insert_currency(&self, code: &str) -> StorageResult<Currency>;

    /// Insert a single category; fails with `Duplicate` if the name exists
    fn insert_category(&self, name: &str) -> StorageResult<Category>;

    fn find_currency_by_code(&self, code: &str) -> StorageResult<Option<Currency>>;

    fn find_category_by_name(&self, name: &str) -> StorageResult<Option<Category>>;

    fn find_all_currencies(&self) -> StorageResult<Vec<Currency>>;

    fn find_all_categories(&self) -> StorageResult<Vec<Category>>;

    /// Insert a product; fails with `Duplicate` on a taken material id and
    /// `MissingReference` if its currency/category row does not exist
    fn insert_product(&self, product: NewProduct) -> StorageResult<Product>;

    /// Overwrite an existing product row (same constraints as insert)
    fn save_product(&self, product: &Product) -> StorageResult<Product>;

    /// Product row only, without joining references
    fn find_product_row(&self, id: i64) -> StorageResult<Option<Product>>;

    /// Product joined with its currency and category
    fn find_product_by_id(&self, id: i64) -> StorageResult<Option<ProductFull>>;

    /// All products joined with their references, ordered by id
    fn find_all_products(&self) -> StorageResult<Vec<ProductFull>>;
}
