//! The active cart of a request.
//!
//! A visitor who is not signed in has a guest cart held in a cookie; a
//! signed-in user has a stored cart in the database. [`ActiveCart`] gives
//! both the same operations so handlers never branch on where the cart
//! lives. Guest lines are addressed by `(item, size)`, stored lines by
//! their record id; a stored cart also accepts an `(item, size)` selector.
//!
//! Mutations of a stored cart publish a [`CartChange`](super::cart_events::CartChange).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ballerz_core::{
    CartLineId, CatalogItem, CatalogLookup, Email, GuestCart, ItemId, LineItem, LineKey, Money,
    Size, cart_totals,
};

use super::cart_events::CartEvents;
use super::catalog::CatalogService;
use crate::db::{CartRepository, RepositoryError};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No line matches the selector.
    #[error("cart line not found")]
    LineNotFound,

    /// A stored-line id was sent for a guest cart.
    #[error("line ids are only valid for signed-in carts")]
    LineIdForGuest,

    /// The item does not exist in the catalog.
    #[error("item {0} does not exist")]
    UnknownItem(ItemId),

    /// The guest cart no longer fits in its cookie.
    #[error("cart is full, sign in to add more items")]
    GuestCartFull,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Which line an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LineSelector {
    /// A stored line.
    Stored { line_id: CartLineId },
    /// A line by item and size.
    Key {
        id: ItemId,
        #[serde(default)]
        size: Option<Size>,
    },
}

/// A cart line plus its record id when stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<CartLineId>,
    #[serde(flatten)]
    pub item: LineItem,
}

/// The cart behind the current request.
pub enum ActiveCart<'a> {
    /// Cookie cart of an anonymous visitor.
    Guest(GuestCart),
    /// Database cart of a signed-in user.
    Stored {
        owner: Email,
        repo: CartRepository<'a>,
        events: &'a CartEvents,
    },
}

impl<'a> ActiveCart<'a> {
    /// The guest cart, if this is one. Handlers write it back to the cookie.
    #[must_use]
    pub const fn guest(&self) -> Option<&GuestCart> {
        match self {
            Self::Guest(cart) => Some(cart),
            Self::Stored { .. } => None,
        }
    }

    /// Every line, in the order it was added.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the stored cart cannot be read.
    pub async fn entries(&self) -> Result<Vec<CartEntry>, CartError> {
        match self {
            Self::Guest(cart) => Ok(cart
                .lines()
                .iter()
                .map(|line| CartEntry {
                    line_id: None,
                    item: line.clone(),
                })
                .collect()),
            Self::Stored { owner, repo, .. } => Ok(repo
                .list(owner)
                .await?
                .into_iter()
                .map(|line| CartEntry {
                    line_id: Some(line.id),
                    item: line.item,
                })
                .collect()),
        }
    }

    /// Total number of pieces.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the stored cart cannot be read.
    pub async fn count(&self) -> Result<u32, CartError> {
        match self {
            Self::Guest(cart) => Ok(cart.item_count()),
            Self::Stored { owner, repo, .. } => Ok(repo.count(owner).await?),
        }
    }

    /// Add a line, merging with an existing `(item, size)` line.
    ///
    /// Returns the resulting quantity of that line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the stored cart cannot be written.
    pub async fn add(&mut self, line: LineItem) -> Result<u32, CartError> {
        match self {
            Self::Guest(cart) => Ok(cart.add(line)),
            Self::Stored {
                owner,
                repo,
                events,
            } => {
                if line.quantity == 0 {
                    return Ok(0);
                }
                let stored = repo.add(owner, &line).await?;
                events.publish(owner);
                Ok(stored.item.quantity)
            }
        }
    }

    /// Change a line's quantity by `delta`, flooring at zero. A line that
    /// reaches zero is removed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` when nothing matches.
    pub async fn change_quantity(
        &mut self,
        selector: &LineSelector,
        delta: i64,
    ) -> Result<u32, CartError> {
        match self {
            Self::Guest(cart) => cart
                .change_quantity(&guest_key(selector)?, delta)
                .ok_or(CartError::LineNotFound),
            Self::Stored {
                owner,
                repo,
                events,
            } => {
                let id = resolve(repo, owner, selector).await?;
                let quantity = repo
                    .change_quantity(owner, id, delta)
                    .await?
                    .ok_or(CartError::LineNotFound)?;
                events.publish(owner);
                Ok(quantity)
            }
        }
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` when nothing matches.
    pub async fn set_quantity(
        &mut self,
        selector: &LineSelector,
        quantity: u32,
    ) -> Result<u32, CartError> {
        match self {
            Self::Guest(cart) => cart
                .set_quantity(&guest_key(selector)?, quantity)
                .ok_or(CartError::LineNotFound),
            Self::Stored {
                owner,
                repo,
                events,
            } => {
                let id = resolve(repo, owner, selector).await?;
                if !repo.set_quantity(owner, id, quantity).await? {
                    return Err(CartError::LineNotFound);
                }
                events.publish(owner);
                Ok(quantity)
            }
        }
    }

    /// Move a line to another size, merging with an existing line of that
    /// size.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` when nothing matches.
    pub async fn change_size(
        &mut self,
        selector: &LineSelector,
        size: Option<Size>,
    ) -> Result<(), CartError> {
        match self {
            Self::Guest(cart) => cart
                .change_size(&guest_key(selector)?, size)
                .map(|_| ())
                .ok_or(CartError::LineNotFound),
            Self::Stored {
                owner,
                repo,
                events,
            } => {
                let id = resolve(repo, owner, selector).await?;
                repo.change_size(owner, id, size)
                    .await?
                    .ok_or(CartError::LineNotFound)?;
                events.publish(owner);
                Ok(())
            }
        }
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` when nothing matches.
    pub async fn remove(&mut self, selector: &LineSelector) -> Result<(), CartError> {
        match self {
            Self::Guest(cart) => {
                if cart.remove(&guest_key(selector)?) {
                    Ok(())
                } else {
                    Err(CartError::LineNotFound)
                }
            }
            Self::Stored {
                owner,
                repo,
                events,
            } => {
                let id = resolve(repo, owner, selector).await?;
                if !repo.remove(owner, id).await? {
                    return Err(CartError::LineNotFound);
                }
                events.publish(owner);
                Ok(())
            }
        }
    }
}

fn guest_key(selector: &LineSelector) -> Result<LineKey, CartError> {
    match selector {
        LineSelector::Key { id, size } => Ok(LineKey::new(id.clone(), *size)),
        LineSelector::Stored { .. } => Err(CartError::LineIdForGuest),
    }
}

async fn resolve(
    repo: &CartRepository<'_>,
    owner: &Email,
    selector: &LineSelector,
) -> Result<CartLineId, CartError> {
    match selector {
        LineSelector::Stored { line_id } => Ok(*line_id),
        LineSelector::Key { id, size } => {
            let key = LineKey::new(id.clone(), *size);
            repo.list(owner)
                .await?
                .into_iter()
                .find(|line| line.item.matches(&key))
                .map(|line| line.id)
                .ok_or(CartError::LineNotFound)
        }
    }
}

/// One cart line resolved against the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<CartLineId>,
    pub item_id: ItemId,
    pub size: Option<Size>,
    pub quantity: u32,
    pub customization_text: Option<String>,
    /// `false` when the item has been removed from the catalog.
    pub available: bool,
    pub description: String,
    pub category: String,
    pub image: String,
    pub unit_price: Money,
    pub line_total: Money,
}

impl CartLineView {
    /// Link to the product page.
    #[must_use]
    pub fn product_url(&self) -> String {
        crate::filters::product_path(&self.description)
    }

    /// Size shown on the cart page.
    #[must_use]
    pub fn size_label(&self) -> &'static str {
        self.size.map_or("-", |size| size.as_str())
    }

    /// Value for the hidden `line` selector in the cart page markup.
    #[must_use]
    pub fn selector_json(&self) -> String {
        let value = self.line_id.map_or_else(
            || serde_json::json!({ "id": self.item_id, "size": self.size }),
            |line_id| serde_json::json!({ "line_id": line_id }),
        );
        value.to_string()
    }
}

/// A cart with catalog data and totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub total: Money,
}

impl CartView {
    /// Resolve entries against the catalog.
    ///
    /// Items missing from the catalog stay in the view, marked unavailable
    /// and priced at zero.
    #[must_use]
    pub fn build(entries: &[CartEntry], catalog: &impl CatalogLookup) -> Self {
        let totals = cart_totals(entries.iter().map(|entry| &entry.item), catalog);
        let lines = entries
            .iter()
            .map(|entry| line_view(entry, catalog.lookup(&entry.item.item_id)))
            .collect();

        Self {
            lines,
            item_count: totals.item_count,
            total: totals.total,
        }
    }

    /// Resolve entries against the live catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the catalog lookup fails.
    pub async fn load(
        entries: &[CartEntry],
        catalog: &CatalogService,
    ) -> Result<Self, RepositoryError> {
        let ids: Vec<ItemId> = entries.iter().map(|e| e.item.item_id.clone()).collect();
        let found = catalog.lookup(&ids).await?;
        Ok(Self::build(entries, &found))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Item ids present in the cart.
    #[must_use]
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.lines.iter().map(|line| line.item_id.clone()).collect()
    }
}

fn line_view(entry: &CartEntry, item: Option<&CatalogItem>) -> CartLineView {
    let line = &entry.item;
    let unit_price = item.map_or(Money::ZERO, |item| line.unit_price(item.price));
    CartLineView {
        line_id: entry.line_id,
        item_id: line.item_id.clone(),
        size: line.size,
        quantity: line.quantity,
        customization_text: line.customization.as_ref().map(|c| c.text.clone()),
        available: item.is_some(),
        description: item.map_or_else(|| "Unavailable item".to_owned(), |i| i.description.clone()),
        category: item.map(|i| i.category.clone()).unwrap_or_default(),
        image: item.map_or(ballerz_core::catalog::FALLBACK_IMAGE, CatalogItem::primary_image).to_owned(),
        unit_price,
        line_total: unit_price.times(line.quantity),
    }
}
