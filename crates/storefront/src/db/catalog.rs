//! Catalog repository.
//!
//! Batch lookups are split into chunks of [`LOOKUP_BATCH_SIZE`] ids so a
//! large cart never turns into one unbounded `ANY($1)` query.

use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use ballerz_core::{CatalogItem, ItemId, Money};

use super::RepositoryError;

/// Maximum number of ids resolved per query.
pub const LOOKUP_BATCH_SIZE: usize = 10;

#[derive(FromRow)]
struct CatalogRow {
    id: String,
    description: String,
    category: String,
    price: Decimal,
    material: Option<String>,
    images: Vec<String>,
}

impl From<CatalogRow> for CatalogItem {
    fn from(row: CatalogRow) -> Self {
        Self {
            id: ItemId::new(row.id),
            description: row.description,
            category: row.category,
            price: Money::new(row.price),
            material: row.material,
            images: row.images,
        }
    }
}

/// Repository for catalog items.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All items in merchant order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<CatalogItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r"
            SELECT id, description, category, price, material, images
            FROM catalog_item
            ORDER BY position ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }

    /// Get one item by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: &ItemId) -> Result<Option<CatalogItem>, RepositoryError> {
        let row = sqlx::query_as::<_, CatalogRow>(
            r"
            SELECT id, description, category, price, material, images
            FROM catalog_item
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(CatalogItem::from))
    }

    /// Resolve a set of ids, [`LOOKUP_BATCH_SIZE`] at a time.
    ///
    /// Unknown ids are simply absent from the result. Duplicate ids are
    /// queried once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any batch fails.
    pub async fn get_many(&self, ids: &[ItemId]) -> Result<Vec<CatalogItem>, RepositoryError> {
        let mut wanted: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();
        wanted.sort_unstable();
        wanted.dedup();

        let mut items = Vec::with_capacity(wanted.len());
        for batch in wanted.chunks(LOOKUP_BATCH_SIZE) {
            let rows = sqlx::query_as::<_, CatalogRow>(
                r"
                SELECT id, description, category, price, material, images
                FROM catalog_item
                WHERE id = ANY($1)
                ",
            )
            .bind(batch)
            .fetch_all(self.pool)
            .await?;
            items.extend(rows.into_iter().map(CatalogItem::from));
        }

        Ok(items)
    }

    /// Insert an item or overwrite the one with the same id.
    ///
    /// Existing items keep their position in the listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another item already uses the
    /// description. Returns `RepositoryError::Database` for other errors.
    pub async fn upsert(&self, item: &CatalogItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog_item (id, description, category, price, material, images)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET description = EXCLUDED.description,
                category    = EXCLUDED.category,
                price       = EXCLUDED.price,
                material    = EXCLUDED.material,
                images      = EXCLUDED.images,
                updated_at  = now()
            ",
        )
        .bind(item.id.as_str())
        .bind(&item.description)
        .bind(&item.category)
        .bind(item.price.amount())
        .bind(item.material.as_deref())
        .bind(&item.images)
        .execute(self.pool)
        .await
        .map_err(|e| super::conflict_on_unique(e, "item description"))?;

        Ok(())
    }
}
