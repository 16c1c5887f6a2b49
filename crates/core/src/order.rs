//! Orders: immutable snapshots of a cart taken at checkout.
//!
//! Each order line carries a copy of the product as it was when the order
//! was placed, so later catalog edits (price changes, deletions) never
//! alter what a customer was charged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{LineItem, MAX_LINE_QUANTITY, MAX_SURCHARGE};
use crate::catalog::{CatalogItem, CatalogLookup};
use crate::types::{Email, ItemId, Money, OrderId, OrderStatus, Size};

/// Errors raised while turning a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// There is nothing to order.
    #[error("cart is empty")]
    EmptyCart,
    /// A cart line refers to an item that is no longer sold.
    #[error("item {0} is no longer available")]
    ItemUnavailable(ItemId),
    /// The cart was modified while the order was being placed.
    #[error("cart changed during checkout, please review it and try again")]
    CartChanged,
}

/// Product details copied into an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Product", default)]
    pub category: String,
    #[serde(rename = "Price", default)]
    pub price: Money,
    #[serde(rename = "ImageUrl1", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&CatalogItem> for ProductSnapshot {
    fn from(item: &CatalogItem) -> Self {
        Self {
            description: item.description.clone(),
            category: item.category.clone(),
            price: item.price,
            image: item.images.first().cloned(),
        }
    }
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "ID")]
    pub item_id: ItemId,
    #[serde(rename = "Quantity", default = "one")]
    pub quantity: u32,
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(
        rename = "customizationText",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub customization_text: Option<String>,
    /// Per-piece customization surcharge.
    #[serde(rename = "customPrice", default)]
    pub surcharge: Money,
    #[serde(default)]
    pub product: Option<ProductSnapshot>,
}

const fn one() -> u32 {
    1
}

impl OrderLine {
    /// Snapshot a cart line against its catalog item.
    #[must_use]
    pub fn snapshot(line: &LineItem, item: &CatalogItem) -> Self {
        Self {
            item_id: line.item_id.clone(),
            quantity: line.quantity,
            size: line.size,
            customization_text: line.customization.as_ref().map(|c| c.text.clone()),
            surcharge: line.surcharge(),
            product: Some(ProductSnapshot::from(item)),
        }
    }

    /// Name shown on invoices and order pages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.product
            .as_ref()
            .map(|p| {
                if p.description.is_empty() {
                    p.category.as_str()
                } else {
                    p.description.as_str()
                }
            })
            .filter(|name| !name.is_empty())
            .unwrap_or("Item")
    }

    /// Price of one piece including customization.
    ///
    /// Zero when the line has no product snapshot.
    #[must_use]
    pub fn unit_price(&self) -> Money {
        self.product
            .as_ref()
            .map_or(Money::ZERO, |p| p.price + self.surcharge)
    }

    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price().times(self.quantity)
    }

    /// Whether quantity, price and surcharge are within what a cart can
    /// hold. Lines posted by clients are checked before they are priced.
    #[must_use]
    pub fn is_within_limits(&self) -> bool {
        self.quantity <= MAX_LINE_QUANTITY
            && self.surcharge.is_within(MAX_SURCHARGE)
            && self
                .product
                .as_ref()
                .is_none_or(|p| p.price.is_within(Money::LIMIT))
    }
}

/// Contact and delivery details given at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl CustomerDetails {
    /// Drop blank fields.
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |s: Option<String>| s.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        Self {
            name: clean(self.name),
            email: clean(self.email),
            phone: clean(self.phone),
            address: clean(self.address),
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_email: Email,
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerDetails>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Customer-facing reference (last 8 id characters, upper-cased).
    #[must_use]
    pub fn short_reference(&self) -> String {
        self.id.short_reference()
    }

    /// Total number of pieces.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Address the invoice should go to when no explicit recipient is given.
    #[must_use]
    pub fn invoice_recipient(&self) -> &str {
        self.customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .unwrap_or_else(|| self.user_email.as_str())
    }
}

/// An order ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_email: Email,
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub customer: Option<CustomerDetails>,
}

impl NewOrder {
    /// Snapshot a user's cart into a new order with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::EmptyCart`] when `lines` is empty and
    /// [`OrderError::ItemUnavailable`] when a line's item is missing from
    /// the catalog.
    pub fn from_cart(
        user_email: Email,
        lines: &[LineItem],
        catalog: &impl CatalogLookup,
        customer: Option<CustomerDetails>,
    ) -> Result<Self, OrderError> {
        let items = lines
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| {
                catalog
                    .lookup(&line.item_id)
                    .map(|item| OrderLine::snapshot(line, item))
                    .ok_or_else(|| OrderError::ItemUnavailable(line.item_id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let total = items.iter().map(OrderLine::line_total).sum();
        Ok(Self {
            id: OrderId::generate(),
            user_email,
            items,
            total,
            customer: customer.map(CustomerDetails::normalized),
        })
    }

    /// The order as it will read back after insertion.
    #[must_use]
    pub fn placed_at(self, created_at: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            user_email: self.user_email,
            items: self.items,
            total: self.total,
            status: OrderStatus::Placed,
            customer: self.customer,
            created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::cart::{Customization, cart_totals};

    fn catalog() -> HashMap<ItemId, CatalogItem> {
        [
            CatalogItem {
                id: ItemId::from("1"),
                description: "Argentina 2022 Home".to_owned(),
                category: "Football".to_owned(),
                price: Money::from_rupees(1499),
                material: None,
                images: vec!["/img/arg.jpg".to_owned()],
            },
            CatalogItem {
                id: ItemId::from("2"),
                description: "Bulls 23".to_owned(),
                category: "Basketball".to_owned(),
                price: Money::from_rupees(1299),
                material: Some("Mesh".to_owned()),
                images: Vec::new(),
            },
        ]
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect()
    }

    fn email() -> Email {
        Email::parse("fan@ballerz.in").unwrap()
    }

    #[test]
    fn test_from_cart_snapshots_products() {
        let lines = vec![
            LineItem::new("1", 2, Some(Size::M)).with_customization(Customization {
                text: "MESSI 10".to_owned(),
                surcharge: Money::from_rupees(200),
            }),
            LineItem::new("2", 1, Some(Size::XL)),
        ];
        let catalog = catalog();
        let order = NewOrder::from_cart(email(), &lines, &catalog, None).unwrap();

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].product.as_ref().unwrap().image.as_deref(), Some("/img/arg.jpg"));
        assert_eq!(order.items[0].unit_price(), Money::from_rupees(1699));
        assert_eq!(order.total, Money::from_rupees(4697));
        assert_eq!(order.total, cart_totals(&lines, &catalog).total);
    }

    #[test]
    fn test_line_limits() {
        let catalog = catalog();
        let item = catalog.get(&ItemId::from("1")).unwrap();
        let mut line = OrderLine::snapshot(&LineItem::new("1", 2, None), item);
        assert!(line.is_within_limits());

        line.quantity = MAX_LINE_QUANTITY + 1;
        assert!(!line.is_within_limits());

        line.quantity = 1;
        line.surcharge = Money::from_rupees(-5);
        assert!(!line.is_within_limits());

        line.surcharge = Money::ZERO;
        if let Some(product) = line.product.as_mut() {
            product.price = Money::from_rupees(100_000_000_000);
        }
        assert!(!line.is_within_limits());
        assert!(line.line_total() > Money::ZERO);
    }

    #[test]
    fn test_from_cart_rejects_empty_and_missing() {
        let catalog = catalog();
        assert_eq!(
            NewOrder::from_cart(email(), &[], &catalog, None),
            Err(OrderError::EmptyCart)
        );
        assert_eq!(
            NewOrder::from_cart(email(), &[LineItem::new("99", 1, None)], &catalog, None),
            Err(OrderError::ItemUnavailable(ItemId::from("99")))
        );
    }

    #[test]
    fn test_order_json_shape() {
        let lines = vec![LineItem::new("2", 3, Some(Size::L))];
        let order = NewOrder::from_cart(
            email(),
            &lines,
            &catalog(),
            Some(CustomerDetails {
                name: Some(" Sunil ".to_owned()),
                phone: Some(String::new()),
                ..CustomerDetails::default()
            }),
        )
        .unwrap()
        .placed_at(Utc::now());

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["userEmail"], "fan@ballerz.in");
        assert_eq!(json["status"], "placed");
        assert_eq!(json["items"][0]["ID"], "2");
        assert_eq!(json["items"][0]["product"]["Description"], "Bulls 23");
        assert_eq!(json["customer"]["name"], "Sunil");
        assert!(json["customer"]["phone"].is_null());

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
        assert_eq!(back.invoice_recipient(), "fan@ballerz.in");
        assert_eq!(back.item_count(), 3);
    }

    #[test]
    fn test_loose_order_line() {
        let line: OrderLine = serde_json::from_str(r#"{"ID": 4}"#).unwrap();
        assert_eq!(line.quantity, 1);
        assert_eq!(line.display_name(), "Item");
        assert_eq!(line.line_total(), Money::ZERO);
    }
}
