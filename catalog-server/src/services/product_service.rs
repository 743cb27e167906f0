//! Product Service - breaker-guarded product reads and writes
//!
//! Every public operation dispatches its storage work to the
//! [`BlockingExecutor`] and runs as one call of the shared
//! `product_service` circuit breaker. Request validation and reference
//! errors are returned as [`ServiceError`]; infrastructure trouble becomes a
//! [`Guarded::Fallback`].

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
use super::error::{ServiceError, ServiceResult};
use super::executor::BlockingExecutor;
use super::guarded::{FallbackReason, Guarded, guard};
use crate::db::{CatalogStore, StorageError};
use crate::utils::validation::validate_product_request;
use futures::stream::{self, BoxStream, StreamExt};
use shared::models::{Category, Currency, NewProduct, Product, ProductFull, ProductRequest};
use shared::util::{next_stamp, now_millis};
use std::sync::Arc;

/// Breaker group shared by all product operations
pub const PRODUCT_SERVICE_GROUP: &str = "product_service";

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn CatalogStore>,
    executor: BlockingExecutor,
    breaker: Arc<CircuitBreaker>,
}

impl ProductService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        executor: BlockingExecutor,
        breakers: &CircuitBreakerRegistry,
    ) -> Self {
        Self {
            store,
            executor,
            breaker: breakers.breaker(PRODUCT_SERVICE_GROUP),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Lazy product stream; each poll of a fresh stream runs a fresh query.
    /// Yields nothing on fallback.
    pub fn get_all(&self) -> BoxStream<'static, ProductFull> {
        let service = self.clone();
        stream::once(async move { service.list().await.into_value() })
            .flat_map(stream::iter)
            .boxed()
    }

    /// All products, keeping the fallback reason
    pub async fn list(&self) -> Guarded<Vec<ProductFull>> {
        let result = self
            .breaker
            .call(|| self.blocking(|store| Ok(store.find_all_products()?)))
            .await;
        read_guard(result)
    }

    pub async fn get_by_id(&self, id: i64) -> Guarded<Option<ProductFull>> {
        let result = self
            .breaker
            .call(|| self.blocking(move |store| Ok(store.find_product_by_id(id)?)))
            .await;
        read_guard(result)
    }

    /// Create a product
    ///
    /// The category must exist; an unseen currency code is created on the fly.
    pub async fn create(&self, req: ProductRequest) -> ServiceResult<Guarded<ProductFull>> {
        validate_product_request(&req)?;
        guard(self.breaker.call(|| self.create_inner(req)).await)
    }

    async fn create_inner(&self, req: ProductRequest) -> ServiceResult<ProductFull> {
        let category = self.find_category(req.category_name).await?;
        let currency = self.find_or_create_currency(req.currency_code).await?;

        let new_product = NewProduct {
            material_id: req.material_id,
            name: req.name,
            price: req.price,
            currency_id: currency.id,
            category_id: category.id,
            last_modified_at: now_millis(),
        };

        let full = self
            .blocking(move |store| {
                let material_id = new_product.material_id.clone();
                let product = store
                    .insert_product(new_product)
                    .map_err(|e| material_conflict(e, material_id))?;
                Ok(ProductFull::from_parts(product, currency, category))
            })
            .await?;

        tracing::info!(
            product_id = full.id,
            material_id = %full.material_id,
            "Product created"
        );
        Ok(full)
    }

    /// Replace every mutable field of an existing product
    ///
    /// `Completed(None)` when no product has this id (nothing is written).
    pub async fn update(
        &self,
        id: i64,
        req: ProductRequest,
    ) -> ServiceResult<Guarded<Option<ProductFull>>> {
        validate_product_request(&req)?;
        guard(self.breaker.call(|| self.update_inner(id, req)).await)
    }

    async fn update_inner(&self, id: i64, req: ProductRequest) -> ServiceResult<Option<ProductFull>> {
        let Some(existing) = self
            .blocking(move |store| Ok(store.find_product_row(id)?))
            .await?
        else {
            return Ok(None);
        };

        // References resolve independently; both must finish before the overwrite
        let (currency, category) = tokio::try_join!(
            self.find_or_create_currency(req.currency_code),
            self.find_category(req.category_name),
        )?;

        let updated = Product {
            id: existing.id,
            material_id: req.material_id,
            name: req.name,
            price: req.price,
            currency_id: currency.id,
            category_id: category.id,
            last_modified_at: next_stamp(existing.last_modified_at),
        };

        let full = self
            .blocking(move |store| {
                let material_id = updated.material_id.clone();
                let saved = store
                    .save_product(&updated)
                    .map_err(|e| material_conflict(e, material_id))?;
                Ok(ProductFull::from_parts(saved, currency, category))
            })
            .await?;

        tracing::info!(
            product_id = full.id,
            material_id = %full.material_id,
            "Product updated"
        );
        Ok(Some(full))
    }

    /// Categories are a closed set: a miss is a client error
    async fn find_category(&self, name: String) -> ServiceResult<Category> {
        self.blocking(move |store| match store.find_category_by_name(&name)? {
            Some(category) => Ok(category),
            None => Err(ServiceError::CategoryNotFound(name)),
        })
        .await
    }

    /// Find-or-create; the store's unique key decides concurrent inserts
    async fn find_or_create_currency(&self, code: String) -> ServiceResult<Currency> {
        self.blocking(move |store| {
            if let Some(currency) = store.find_currency_by_code(&code)? {
                return Ok(currency);
            }
            match store.insert_currency(&code) {
                Ok(currency) => {
                    tracing::info!(currency_id = currency.id, code = %currency.code, "Currency created");
                    Ok(currency)
                }
                Err(e) if e.is_duplicate() => {
                    // Lost the race: the winner's row is the one to use
                    store
                        .find_currency_by_code(&code)?
                        .ok_or_else(|| ServiceError::Conflict(format!("currency code {code}")))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&dyn CatalogStore) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        self.executor.run(move || f(store.as_ref())).await
    }
}

fn material_conflict(err: StorageError, material_id: String) -> ServiceError {
    if err.is_duplicate() {
        ServiceError::DuplicateMaterialId(material_id)
    } else {
        err.into()
    }
}

/// Reads have no client-class errors; anything unexpected still falls back
fn read_guard<T>(result: ServiceResult<T>) -> Guarded<T> {
    guard(result).unwrap_or_else(|e| Guarded::Fallback(FallbackReason::Failure(e.to_string())))
}
