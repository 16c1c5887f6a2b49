//! Cart line items and the rules for mutating a cart.
//!
//! A cart is a list of [`LineItem`]s. Guests keep that list in a cookie and
//! signed-in users keep it in the database, but the meaning of each
//! mutation is the same in both places and lives here:
//!
//! - adding an `(item, size)` pair that is already present increments its
//!   quantity instead of creating a second line
//! - quantities never drop below zero, and a line whose quantity reaches
//!   zero is removed
//! - moving a line onto a size that the item already has merges the two
//!   lines
//! - a line never holds more than [`MAX_LINE_QUANTITY`] pieces
//!
//! Totals are computed against the catalog with [`cart_totals`]. A line
//! whose catalog entry no longer exists contributes nothing.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogLookup;
use crate::types::{CartLineId, ItemId, Money, Size};

/// Most pieces a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Highest per-piece customization surcharge accepted (₹10,000).
pub const MAX_SURCHARGE: Money = Money::new(Decimal::from_parts(10_000, 0, 0, false, 0));

/// Add to a line quantity without passing [`MAX_LINE_QUANTITY`].
#[must_use]
pub fn capped_quantity(current: u32, added: u32) -> u32 {
    current.saturating_add(added).min(MAX_LINE_QUANTITY)
}

/// Optional personalisation printed on an item (e.g. a name and number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customization {
    /// The text to print.
    pub text: String,
    /// Extra charge per piece on top of the catalog price.
    pub surcharge: Money,
}

/// Identity of a guest cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    /// Catalog item.
    pub item_id: ItemId,
    /// Size variant, if the line has one.
    pub size: Option<Size>,
}

impl LineKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(item_id: impl Into<ItemId>, size: Option<Size>) -> Self {
        Self {
            item_id: item_id.into(),
            size,
        }
    }
}

/// One entry in a cart.
///
/// Serializes using the field names guest cart cookies have always used
/// (`ID`, `Quantity`, `Size`, `AddedOn`, `isCustomized`,
/// `customizationText`, `customPrice`), so carts written by older clients
/// keep working. Unknown sizes and unparseable timestamps are dropped
/// rather than failing the whole cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireLine", into = "WireLine")]
pub struct LineItem {
    pub item_id: ItemId,
    pub quantity: u32,
    pub size: Option<Size>,
    pub customization: Option<Customization>,
    pub added_on: Option<DateTime<Utc>>,
}

impl LineItem {
    /// A plain line with no customization.
    #[must_use]
    pub fn new(item_id: impl Into<ItemId>, quantity: u32, size: Option<Size>) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            size,
            customization: None,
            added_on: None,
        }
    }

    /// Attach a customization.
    #[must_use]
    pub fn with_customization(mut self, customization: Customization) -> Self {
        self.customization = Some(customization);
        self
    }

    /// Stamp the time the line was first added, to the second.
    #[must_use]
    pub fn added_at(mut self, at: DateTime<Utc>) -> Self {
        self.added_on = Some(at.trunc_subsecs(0));
        self
    }

    /// The guest identity of this line.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            item_id: self.item_id.clone(),
            size: self.size,
        }
    }

    /// Whether this line has the given identity.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.item_id == key.item_id && self.size == key.size
    }

    /// Per-piece surcharge for customization (zero when not customized).
    #[must_use]
    pub fn surcharge(&self) -> Money {
        self.customization
            .as_ref()
            .map_or(Money::ZERO, |c| c.surcharge)
    }

    /// Price of one piece given the catalog unit price.
    #[must_use]
    pub fn unit_price(&self, catalog_price: Money) -> Money {
        catalog_price + self.surcharge()
    }

    /// Line total against the catalog.
    ///
    /// Returns zero when the item is missing from the catalog, including
    /// any customization surcharge.
    #[must_use]
    pub fn line_total(&self, catalog: &impl CatalogLookup) -> Money {
        catalog
            .lookup(&self.item_id)
            .map_or(Money::ZERO, |item| self.unit_price(item.price).times(self.quantity))
    }
}

#[derive(Serialize, Deserialize)]
struct WireLine {
    #[serde(rename = "ID")]
    id: ItemId,
    #[serde(rename = "Quantity", default)]
    quantity: i64,
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(rename = "AddedOn", default, skip_serializing_if = "Option::is_none")]
    added_on: Option<String>,
    #[serde(rename = "isCustomized", default, skip_serializing_if = "is_false")]
    is_customized: bool,
    #[serde(
        rename = "customizationText",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    customization_text: Option<String>,
    #[serde(rename = "customPrice", default, skip_serializing_if = "Option::is_none")]
    custom_price: Option<Money>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl From<WireLine> for LineItem {
    fn from(wire: WireLine) -> Self {
        let customization = wire.is_customized.then(|| Customization {
            text: wire.customization_text.unwrap_or_default(),
            surcharge: wire
                .custom_price
                .filter(|p| p.is_within(MAX_SURCHARGE))
                .unwrap_or(Money::ZERO),
        });

        Self {
            item_id: wire.id,
            quantity: u32::try_from(wire.quantity.clamp(0, i64::from(MAX_LINE_QUANTITY)))
                .unwrap_or(MAX_LINE_QUANTITY),
            size: wire.size.and_then(|s| s.parse().ok()),
            customization,
            added_on: wire
                .added_on
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<LineItem> for WireLine {
    fn from(line: LineItem) -> Self {
        let (is_customized, customization_text, custom_price) = match line.customization {
            Some(c) => (true, Some(c.text), Some(c.surcharge)),
            None => (false, None, None),
        };

        Self {
            id: line.item_id,
            quantity: i64::from(line.quantity),
            size: line.size.map(|s| s.as_str().to_owned()),
            added_on: line
                .added_on
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            is_customized,
            customization_text,
            custom_price,
        }
    }
}

/// A guest cart: an ordered list of lines unique by [`LineKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct GuestCart {
    lines: Vec<LineItem>,
}

impl GuestCart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from stored lines.
    ///
    /// Lines with an empty item id or a zero quantity are dropped, and
    /// duplicate keys are folded into the first occurrence.
    #[must_use]
    pub fn from_lines(lines: Vec<LineItem>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            if line.item_id.is_empty() || line.quantity == 0 {
                continue;
            }
            if let Some(existing) = cart.find_mut(&line.key()) {
                existing.quantity = capped_quantity(existing.quantity, line.quantity);
            } else {
                cart.lines.push(line);
            }
        }
        cart
    }

    /// Parse the JSON array stored in a guest cart cookie.
    ///
    /// Anything unreadable yields an empty cart.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str::<Vec<LineItem>>(json)
            .map(Self::from_lines)
            .unwrap_or_default()
    }

    /// Serialize to the JSON array stored in the cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.lines)
    }

    /// The lines, in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    /// Take the lines out of the cart.
    #[must_use]
    pub fn into_lines(self) -> Vec<LineItem> {
        self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of pieces across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0, |acc, l| acc.saturating_add(l.quantity))
    }

    /// Quantity stored for a key (zero when absent).
    #[must_use]
    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.find(key).map_or(0, |l| l.quantity)
    }

    /// Look up a line by key.
    #[must_use]
    pub fn find(&self, key: &LineKey) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.matches(key))
    }

    fn find_mut(&mut self, key: &LineKey) -> Option<&mut LineItem> {
        self.lines.iter_mut().find(|l| l.matches(key))
    }

    /// Add a line, or increase the quantity of the line with the same key.
    ///
    /// A customization on the incoming line replaces the stored one. Adding
    /// a zero quantity is a no-op. The quantity stops at
    /// [`MAX_LINE_QUANTITY`]. Returns the resulting quantity.
    pub fn add(&mut self, line: LineItem) -> u32 {
        let key = line.key();
        if line.quantity == 0 || key.item_id.is_empty() {
            return self.quantity_of(&key);
        }

        if let Some(existing) = self.find_mut(&key) {
            existing.quantity = capped_quantity(existing.quantity, line.quantity);
            if line.customization.is_some() {
                existing.customization = line.customization;
            }
            return existing.quantity;
        }

        let mut line = line;
        line.quantity = line.quantity.min(MAX_LINE_QUANTITY);
        let quantity = line.quantity;
        self.lines.push(line);
        quantity
    }

    /// Change a line's quantity by `delta`, flooring at zero.
    ///
    /// Returns the new quantity, or `None` when no line has that key. A
    /// line that reaches zero is removed.
    pub fn change_quantity(&mut self, key: &LineKey, delta: i64) -> Option<u32> {
        let current = self.find(key)?.quantity;
        let next = i64::from(current).saturating_add(delta).max(0);
        let next = u32::try_from(next).unwrap_or(MAX_LINE_QUANTITY);
        self.set_quantity(key, next.min(MAX_LINE_QUANTITY))
    }

    /// Set a line's quantity outright. Zero removes the line, and anything
    /// above [`MAX_LINE_QUANTITY`] is capped.
    ///
    /// Returns the new quantity, or `None` when no line has that key.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: u32) -> Option<u32> {
        if quantity == 0 {
            return self.remove(key).then_some(0);
        }
        let quantity = quantity.min(MAX_LINE_QUANTITY);
        let line = self.find_mut(key)?;
        line.quantity = quantity;
        Some(quantity)
    }

    /// Remove a line. Returns whether anything was removed.
    pub fn remove(&mut self, key: &LineKey) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| !l.matches(key));
        self.lines.len() != before
    }

    /// Move a line to another size.
    ///
    /// If the item already has a line in the target size, the two are
    /// merged into that line and the moved line disappears. Returns the key
    /// the line ended up under, or `None` when no line has `key`.
    pub fn change_size(&mut self, key: &LineKey, size: Option<Size>) -> Option<LineKey> {
        let target = LineKey {
            item_id: key.item_id.clone(),
            size,
        };
        if target == *key {
            return self.find(key).map(|_| target);
        }

        let index = self.lines.iter().position(|l| l.matches(key))?;
        if let Some(existing) = self.find(&target).map(|l| l.quantity) {
            let moved = self.lines.remove(index);
            if let Some(line) = self.find_mut(&target) {
                line.quantity = capped_quantity(existing, moved.quantity);
                if line.customization.is_none() {
                    line.customization = moved.customization;
                }
            }
        } else if let Some(line) = self.lines.get_mut(index) {
            line.size = size;
        }
        Some(target)
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl From<Vec<LineItem>> for GuestCart {
    fn from(lines: Vec<LineItem>) -> Self {
        Self::from_lines(lines)
    }
}

impl From<GuestCart> for Vec<LineItem> {
    fn from(cart: GuestCart) -> Self {
        cart.lines
    }
}

/// Item count and price total of a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub item_count: u32,
    pub total: Money,
}

/// Compute totals for any list of lines against the catalog.
#[must_use]
pub fn cart_totals<'a>(
    lines: impl IntoIterator<Item = &'a LineItem>,
    catalog: &impl CatalogLookup,
) -> CartTotals {
    lines
        .into_iter()
        .fold(CartTotals::default(), |mut totals, line| {
            totals.item_count = totals.item_count.saturating_add(line.quantity);
            totals.total += line.line_total(catalog);
            totals
        })
}

/// One database write needed to fold a guest cart into a user's cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStep {
    /// Increase an existing stored line.
    Increment {
        line_id: CartLineId,
        by: u32,
    },
    /// Insert a new stored line.
    Insert(LineItem),
}

/// Plan how to merge guest lines into a user's stored lines.
///
/// Lines are matched by `(item, size)`; matching stored lines have the
/// guest quantity added, everything else is inserted. Guest lines are
/// normalized first, so duplicates inside the cookie collapse into a
/// single step.
#[must_use]
pub fn plan_guest_merge(stored: &[(CartLineId, LineItem)], guest: GuestCart) -> Vec<MergeStep> {
    guest
        .into_lines()
        .into_iter()
        .map(|line| {
            let key = line.key();
            match stored.iter().find(|(_, s)| s.matches(&key)) {
                Some((line_id, _)) => MergeStep::Increment {
                    line_id: *line_id,
                    by: line.quantity,
                },
                None => MergeStep::Insert(line),
            }
        })
        .collect()
}
