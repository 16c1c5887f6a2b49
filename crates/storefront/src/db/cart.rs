//! Cart repository for signed-in users.
//!
//! Every statement is scoped by the owner's email, so one user can never
//! address another user's lines even with a guessed line id. Compound
//! mutations (size changes, guest merges) run in a single transaction with
//! the affected rows locked.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use ballerz_core::{
    CartLineId, Customization, Email, GuestCart, ItemId, LineItem, MAX_LINE_QUANTITY, MergeStep,
    Money, Size, plan_guest_merge,
};

use super::RepositoryError;
use crate::models::CartLine;

#[derive(FromRow)]
struct CartRow {
    id: i32,
    item_id: String,
    quantity: i32,
    size: Option<String>,
    customization_text: Option<String>,
    custom_price: Option<Decimal>,
    added_on: DateTime<Utc>,
}

impl TryFrom<CartRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let size = row
            .size
            .as_deref()
            .map(str::parse::<Size>)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("cart line {}: {e}", row.id)))?;
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("cart line {}: negative quantity", row.id))
        })?;

        let customization = match (row.customization_text, row.custom_price) {
            (None, None) => None,
            (text, price) => Some(Customization {
                text: text.unwrap_or_default(),
                surcharge: price.map_or(Money::ZERO, Money::new),
            }),
        };

        Ok(Self {
            id: CartLineId::new(row.id),
            item: LineItem {
                item_id: ItemId::new(row.item_id),
                quantity,
                size,
                customization,
                added_on: Some(row.added_on),
            },
        })
    }
}

/// Quantities are written capped at [`MAX_LINE_QUANTITY`], and increments
/// use `LEAST(.., $max)` so a line can never overflow the column.
fn to_db_quantity(quantity: u32) -> i32 {
    i32::try_from(quantity.min(MAX_LINE_QUANTITY)).unwrap_or(0)
}

fn max_db_quantity() -> i32 {
    to_db_quantity(MAX_LINE_QUANTITY)
}

/// Repository for stored cart lines.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All lines owned by `owner`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, owner: &Email) -> Result<Vec<CartLine>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        list_lines(&mut conn, owner, false).await
    }

    /// Total number of pieces in the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, owner: &Email) -> Result<u32, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM cart_item WHERE user_email = $1",
        )
        .bind(owner.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    /// Add a line, or increase the quantity of the owner's line with the
    /// same `(item, size)`.
    ///
    /// A customization on the new line replaces the stored one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add(&self, owner: &Email, line: &LineItem) -> Result<CartLine, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        upsert_line(&mut conn, owner, line).await
    }

    /// Get one of the owner's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        owner: &Email,
        id: CartLineId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, item_id, quantity, size, customization_text, custom_price, added_on
            FROM cart_item
            WHERE id = $1 AND user_email = $2
            ",
        )
        .bind(id.as_i32())
        .bind(owner.as_str())
        .fetch_optional(self.pool)
        .await?
        .map(CartLine::try_from)
        .transpose()
    }

    /// Change a line's quantity by `delta`, flooring at zero.
    ///
    /// A line that reaches zero is deleted. Returns the new quantity, or
    /// `None` when the owner has no such line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn change_quantity(
        &self,
        owner: &Email,
        id: CartLineId,
        delta: i64,
    ) -> Result<Option<u32>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM cart_item WHERE id = $1 AND user_email = $2 FOR UPDATE",
        )
        .bind(id.as_i32())
        .bind(owner.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(None);
        };

        let next = i64::from(current).saturating_add(delta).max(0);
        let next = u32::try_from(next).unwrap_or(MAX_LINE_QUANTITY).min(MAX_LINE_QUANTITY);
        write_quantity(&mut tx, owner, id, next).await?;
        tx.commit().await?;

        Ok(Some(next))
    }

    /// Set a line's quantity. Zero deletes the line.
    ///
    /// Returns `false` when the owner has no such line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_quantity(
        &self,
        owner: &Email,
        id: CartLineId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        write_quantity(&mut conn, owner, id, quantity).await
    }

    /// Move a line to another size, merging with the owner's existing line
    /// of that size when there is one.
    ///
    /// Returns the id of the line that now holds the quantity, or `None`
    /// when the owner has no such line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn change_size(
        &self,
        owner: &Email,
        id: CartLineId,
        size: Option<Size>,
    ) -> Result<Option<CartLineId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let lines = list_lines(&mut tx, owner, true).await?;
        let Some(moving) = lines.iter().find(|l| l.id == id) else {
            return Ok(None);
        };
        if moving.item.size == size {
            return Ok(Some(id));
        }

        let target = lines
            .iter()
            .find(|l| l.id != id && l.item.item_id == moving.item.item_id && l.item.size == size);

        let result = if let Some(target) = target {
            sqlx::query(
                r"
                UPDATE cart_item
                SET quantity = LEAST(quantity + $3, $6),
                    customization_text = COALESCE(customization_text, $4),
                    custom_price = COALESCE(custom_price, $5)
                WHERE id = $1 AND user_email = $2
                ",
            )
            .bind(target.id.as_i32())
            .bind(owner.as_str())
            .bind(to_db_quantity(moving.item.quantity))
            .bind(moving.item.customization.as_ref().map(|c| c.text.as_str()))
            .bind(moving.item.customization.as_ref().map(|c| c.surcharge.amount()))
            .bind(max_db_quantity())
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM cart_item WHERE id = $1 AND user_email = $2")
                .bind(id.as_i32())
                .bind(owner.as_str())
                .execute(&mut *tx)
                .await?;

            target.id
        } else {
            sqlx::query("UPDATE cart_item SET size = $3 WHERE id = $1 AND user_email = $2")
                .bind(id.as_i32())
                .bind(owner.as_str())
                .bind(size.map(|s| s.as_str()))
                .execute(&mut *tx)
                .await?;

            id
        };

        tx.commit().await?;
        Ok(Some(result))
    }

    /// Delete a line. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove(&self, owner: &Email, id: CartLineId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE id = $1 AND user_email = $2")
            .bind(id.as_i32())
            .bind(owner.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fold a guest cart into the owner's stored cart.
    ///
    /// Lines matching an existing `(item, size)` are incremented, the rest
    /// are inserted. Returns the number of writes performed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any write fails; nothing is
    /// merged in that case.
    pub async fn merge_guest(&self, owner: &Email, guest: GuestCart) -> Result<usize, RepositoryError> {
        if guest.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let stored: Vec<_> = list_lines(&mut tx, owner, true)
            .await?
            .iter()
            .map(CartLine::to_pair)
            .collect();

        let steps = plan_guest_merge(&stored, guest);
        for step in &steps {
            match step {
                MergeStep::Increment { line_id, by } => {
                    sqlx::query(
                        r"
                        UPDATE cart_item SET quantity = LEAST(quantity + $3, $4)
                        WHERE id = $1 AND user_email = $2
                        ",
                    )
                    .bind(line_id.as_i32())
                    .bind(owner.as_str())
                    .bind(to_db_quantity(*by))
                    .bind(max_db_quantity())
                    .execute(&mut *tx)
                    .await?;
                }
                MergeStep::Insert(line) => {
                    upsert_line(&mut tx, owner, line).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(steps.len())
    }
}

pub(crate) async fn list_lines(
    conn: &mut PgConnection,
    owner: &Email,
    lock: bool,
) -> Result<Vec<CartLine>, RepositoryError> {
    let sql = if lock {
        r"
        SELECT id, item_id, quantity, size, customization_text, custom_price, added_on
        FROM cart_item
        WHERE user_email = $1
        ORDER BY added_on ASC, id ASC
        FOR UPDATE
        "
    } else {
        r"
        SELECT id, item_id, quantity, size, customization_text, custom_price, added_on
        FROM cart_item
        WHERE user_email = $1
        ORDER BY added_on ASC, id ASC
        "
    };

    sqlx::query_as::<_, CartRow>(sql)
        .bind(owner.as_str())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CartLine::try_from)
        .collect()
}

async fn upsert_line(
    conn: &mut PgConnection,
    owner: &Email,
    line: &LineItem,
) -> Result<CartLine, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(
        r"
        INSERT INTO cart_item
            (user_email, item_id, quantity, size, customization_text, custom_price, added_on)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()))
        ON CONFLICT (user_email, item_id, (COALESCE(size, ''))) DO UPDATE
        SET quantity = LEAST(cart_item.quantity + EXCLUDED.quantity, $8),
            customization_text = COALESCE(EXCLUDED.customization_text, cart_item.customization_text),
            custom_price = COALESCE(EXCLUDED.custom_price, cart_item.custom_price)
        RETURNING id, item_id, quantity, size, customization_text, custom_price, added_on
        ",
    )
    .bind(owner.as_str())
    .bind(line.item_id.as_str())
    .bind(to_db_quantity(line.quantity))
    .bind(line.size.map(|s| s.as_str()))
    .bind(line.customization.as_ref().map(|c| c.text.as_str()))
    .bind(line.customization.as_ref().map(|c| c.surcharge.amount()))
    .bind(line.added_on)
    .bind(max_db_quantity())
    .fetch_one(&mut *conn)
    .await?;

    CartLine::try_from(row)
}

async fn write_quantity(
    conn: &mut PgConnection,
    owner: &Email,
    id: CartLineId,
    quantity: u32,
) -> Result<bool, RepositoryError> {
    let result = if quantity == 0 {
        sqlx::query("DELETE FROM cart_item WHERE id = $1 AND user_email = $2")
            .bind(id.as_i32())
            .bind(owner.as_str())
            .execute(&mut *conn)
            .await?
    } else {
        sqlx::query("UPDATE cart_item SET quantity = $3 WHERE id = $1 AND user_email = $2")
            .bind(id.as_i32())
            .bind(owner.as_str())
            .bind(to_db_quantity(quantity))
            .execute(&mut *conn)
            .await?
    };

    Ok(result.rows_affected() > 0)
}

/// Delete the given lines of `owner` on an existing connection.
pub(crate) async fn delete_lines(
    conn: &mut PgConnection,
    owner: &Email,
    ids: &[CartLineId],
) -> Result<u64, RepositoryError> {
    let ids: Vec<i32> = ids.iter().map(|id| id.as_i32()).collect();
    let result = sqlx::query("DELETE FROM cart_item WHERE user_email = $1 AND id = ANY($2)")
        .bind(owner.as_str())
        .bind(ids)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_quantity_is_capped() {
        assert_eq!(to_db_quantity(3), 3);
        assert_eq!(to_db_quantity(u32::MAX), max_db_quantity());
        assert_eq!(max_db_quantity(), 999);
    }
}
