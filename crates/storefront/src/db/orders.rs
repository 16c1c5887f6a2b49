//! Order repository.
//!
//! Order lines and customer details are stored as JSONB so the product
//! snapshot taken at checkout survives later catalog changes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use ballerz_core::{
    CartLineId, CustomerDetails, Email, Money, NewOrder, Order, OrderId, OrderLine, OrderStatus,
};

use super::RepositoryError;
use crate::models::CartLine;

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_email: String,
    items: Json<Vec<OrderLine>>,
    total: Decimal,
    status: String,
    customer: Option<Json<CustomerDetails>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let user_email = Email::parse(&row.user_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: invalid email: {e}", row.id))
        })?;
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", row.id)))?;

        Ok(Self {
            id: OrderId::from_uuid(row.id),
            user_email,
            items: row.items.0,
            total: Money::new(row.total),
            status,
            customer: row.customer.map(|c| c.0),
            created_at: row.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_email, items, total, status, customer, created_at";

/// Repository for orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order and remove the cart lines it was priced from, in one
    /// transaction.
    ///
    /// `priced` are the cart lines the order was built from. The buyer's
    /// lines are locked and compared with them first; if the cart changed
    /// in between, nothing is written. Only the priced lines are deleted,
    /// so a line added while the order commits stays in the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart changed since it was
    /// priced, or if the order id is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn place(&self, order: &NewOrder, priced: &[CartLine]) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = super::cart::list_lines(&mut tx, &order.user_email, true).await?;
        if !same_lines(&current, priced) {
            return Err(RepositoryError::Conflict(
                "cart changed during checkout".to_owned(),
            ));
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (id, user_email, items, total, status, customer)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.id.as_uuid())
        .bind(order.user_email.as_str())
        .bind(Json(&order.items))
        .bind(order.total.amount())
        .bind(OrderStatus::Placed.as_str())
        .bind(order.customer.as_ref().map(Json))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| super::conflict_on_unique(e, "order"))?;

        let ids: Vec<CartLineId> = priced.iter().map(|line| line.id).collect();
        super::cart::delete_lines(&mut tx, &order.user_email, &ids).await?;
        tx.commit().await?;

        Order::try_from(row)
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_email = $1 ORDER BY created_at DESC"
        ))
        .bind(email.as_str())
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    /// Set an order's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no order has that id.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
        .and_then(Order::try_from)
    }
}

/// Whether two views of a cart hold the same lines, ignoring order.
fn same_lines(current: &[CartLine], priced: &[CartLine]) -> bool {
    current.len() == priced.len()
        && priced
            .iter()
            .all(|line| current.iter().any(|c| c.id == line.id && c.item == line.item))
}

#[cfg(test)]
mod tests {
    use ballerz_core::{LineItem, Size};

    use super::*;

    fn line(id: i32, item: &str, quantity: u32) -> CartLine {
        CartLine {
            id: CartLineId::new(id),
            item: LineItem::new(item, quantity, Some(Size::M)),
        }
    }

    #[test]
    fn test_same_lines_ignores_order() {
        let priced = [line(1, "A", 2), line(2, "B", 1)];
        let current = [line(2, "B", 1), line(1, "A", 2)];
        assert!(same_lines(&current, &priced));
    }

    #[test]
    fn test_added_or_changed_line_is_detected() {
        let priced = [line(1, "A", 2)];
        assert!(!same_lines(&[line(1, "A", 2), line(2, "B", 1)], &priced));
        assert!(!same_lines(&[line(1, "A", 3)], &priced));
        assert!(!same_lines(&[], &priced));
    }
}
