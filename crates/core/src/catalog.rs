//! Catalog items and shop browsing.
//!
//! The catalog is read-only from the cart's point of view. This module
//! holds the item type, the seed record format used by the merchant's
//! spreadsheet export, and the pure filtering and sorting applied on the
//! shop page.

use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{ItemId, Money};

/// Categories always offered on the shop page, even before any item in
/// them is stocked.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["Football", "Basketball", "Anime", "Korean"];

/// Image shown when an item has none of its own.
pub const FALLBACK_IMAGE: &str = "/favicon.ico";

/// Material shown when an item does not specify one.
pub const DEFAULT_MATERIAL: &str = "Premium Fabric";

/// Maximum number of display images per item.
pub const MAX_IMAGES: usize = 3;

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    /// Display name. Unique, and used as the product page slug.
    pub description: String,
    /// Category shown in the shop filter (e.g. `Football`).
    pub category: String,
    /// Unit price.
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Up to [`MAX_IMAGES`] image URLs, in display order.
    #[serde(default)]
    pub images: Vec<String>,
}

impl CatalogItem {
    /// First image, or the site fallback.
    #[must_use]
    pub fn primary_image(&self) -> &str {
        self.images
            .iter()
            .map(String::as_str)
            .find(|url| !url.is_empty())
            .unwrap_or(FALLBACK_IMAGE)
    }

    /// Material label for the product page.
    #[must_use]
    pub fn material_label(&self) -> &str {
        self.material.as_deref().unwrap_or(DEFAULT_MATERIAL)
    }

    /// Case-insensitive substring match on the description.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty() || self.description.to_lowercase().contains(&needle)
    }
}

/// A catalog record in the merchant export format.
///
/// Field names follow the export (`ID`, `Description`, `Product`, `Price`,
/// `Material`, `ImageUrl1`..`ImageUrl3`). `Price` may be a number or a
/// numeric string.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "ID")]
    pub id: ItemId,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Price", default)]
    pub price: Money,
    #[serde(rename = "Material", default)]
    pub material: Option<String>,
    #[serde(rename = "ImageUrl1", default)]
    pub image_url1: Option<String>,
    #[serde(rename = "ImageUrl2", default)]
    pub image_url2: Option<String>,
    #[serde(rename = "ImageUrl3", default)]
    pub image_url3: Option<String>,
}

impl From<CatalogRecord> for CatalogItem {
    fn from(record: CatalogRecord) -> Self {
        let images = [record.image_url1, record.image_url2, record.image_url3]
            .into_iter()
            .flatten()
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .collect();

        Self {
            id: record.id,
            description: record.description.trim().to_owned(),
            category: record.product.trim().to_owned(),
            price: record.price,
            material: record
                .material
                .map(|m| m.trim().to_owned())
                .filter(|m| !m.is_empty()),
            images,
        }
    }
}

/// Read access to catalog items by id.
///
/// Implemented for in-memory maps so that cart totals and order snapshots
/// can be computed without touching the database.
pub trait CatalogLookup {
    /// Find an item by id.
    fn lookup(&self, id: &ItemId) -> Option<&CatalogItem>;
}

impl CatalogLookup for HashMap<ItemId, CatalogItem> {
    fn lookup(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.get(id)
    }
}

impl CatalogLookup for BTreeMap<ItemId, CatalogItem> {
    fn lookup(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.get(id)
    }
}

impl CatalogLookup for [CatalogItem] {
    fn lookup(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.iter().find(|item| &item.id == id)
    }
}

impl CatalogLookup for Vec<CatalogItem> {
    fn lookup(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.as_slice().lookup(id)
    }
}

/// Shop page sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Catalog order.
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    pub const ALL: [Self; 3] = [Self::Relevance, Self::PriceAsc, Self::PriceDesc];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::PriceAsc => "price-asc",
            Self::PriceDesc => "price-desc",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Relevance => "Relevance",
            Self::PriceAsc => "Price: Low to High",
            Self::PriceDesc => "Price: High to Low",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = core::convert::Infallible;

    /// Unknown values fall back to [`SortOrder::Relevance`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "price-asc" => Self::PriceAsc,
            "price-desc" => Self::PriceDesc,
            _ => Self::Relevance,
        })
    }
}

/// Filters and ordering for a catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Exact category match.
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive substring of the description.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl CatalogQuery {
    /// Drop blank filters so that `?category=&search=` means "everything".
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |s: Option<String>| s.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        Self {
            category: clean(self.category),
            search: clean(self.search).map(|s| s.to_lowercase()),
            sort: self.sort,
        }
    }

    /// Filter and sort `items`.
    ///
    /// Relevance keeps catalog order. Price sorts are stable, so items with
    /// equal prices also keep catalog order.
    #[must_use]
    pub fn apply<'a>(&self, items: &'a [CatalogItem]) -> Vec<&'a CatalogItem> {
        let mut out: Vec<&CatalogItem> = items
            .iter()
            .filter(|item| {
                self.category
                    .as_deref()
                    .is_none_or(|category| item.category == category)
            })
            .filter(|item| {
                self.search
                    .as_deref()
                    .is_none_or(|needle| item.matches_search(needle))
            })
            .collect();

        match self.sort {
            SortOrder::Relevance => {}
            SortOrder::PriceAsc => out.sort_by_key(|item| item.price),
            SortOrder::PriceDesc => out.sort_by(|a, b| b.price.cmp(&a.price)),
        }
        out
    }
}

/// Category list for the shop filter: the defaults, then any other
/// categories present in the catalog, without duplicates.
#[must_use]
pub fn categories(items: &[CatalogItem]) -> Vec<String> {
    let mut out: Vec<String> = DEFAULT_CATEGORIES.iter().map(|c| (*c).to_owned()).collect();
    for item in items {
        if !item.category.is_empty() && !out.contains(&item.category) {
            out.push(item.category.clone());
        }
    }
    out
}

/// Items in the same category as `item`, excluding `item` itself.
///
/// The caller picks and shuffles from these.
#[must_use]
pub fn related_candidates<'a>(item: &CatalogItem, items: &'a [CatalogItem]) -> Vec<&'a CatalogItem> {
    items
        .iter()
        .filter(|other| other.category == item.category && other.description != item.description)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn item(id: i64, description: &str, category: &str, price: i64) -> CatalogItem {
        CatalogItem {
            id: ItemId::from(id),
            description: description.to_owned(),
            category: category.to_owned(),
            price: Money::from_rupees(price),
            material: None,
            images: Vec::new(),
        }
    }

    fn sample() -> Vec<CatalogItem> {
        vec![
            item(1, "Barcelona Home 24/25", "Football", 1299),
            item(2, "Lakers Icon Jersey", "Basketball", 1499),
            item(3, "Naruto Hokage Tee", "Anime", 799),
            item(4, "Real Madrid Away", "Football", 1199),
            item(5, "Seoul Streetwear Hoodie", "Streetwear", 1999),
        ]
    }

    #[test]
    fn test_filter_by_category_and_search() {
        let items = sample();
        let query = CatalogQuery {
            category: Some("Football".to_owned()),
            search: Some("MADRID".to_owned()),
            sort: SortOrder::Relevance,
        }
        .normalized();
        let found = query.apply(&items);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "Real Madrid Away");
    }

    #[test]
    fn test_blank_filters_match_everything() {
        let items = sample();
        let query = CatalogQuery {
            category: Some("  ".to_owned()),
            search: Some(String::new()),
            sort: SortOrder::Relevance,
        }
        .normalized();
        assert_eq!(query, CatalogQuery::default());
        assert_eq!(query.apply(&items).len(), items.len());
    }

    #[test]
    fn test_sort_orders() {
        let items = sample();
        let asc = CatalogQuery {
            sort: SortOrder::PriceAsc,
            ..CatalogQuery::default()
        };
        let prices: Vec<Money> = asc.apply(&items).iter().map(|i| i.price).collect();
        assert!(prices.windows(2).all(|w| w[0] <= w[1]));

        let desc = CatalogQuery {
            sort: SortOrder::PriceDesc,
            ..CatalogQuery::default()
        };
        assert_eq!(desc.apply(&items)[0].description, "Seoul Streetwear Hoodie");
    }

    #[test]
    fn test_sort_order_parse_falls_back() {
        assert_eq!("price-desc".parse::<SortOrder>().unwrap(), SortOrder::PriceDesc);
        assert_eq!("cheapest".parse::<SortOrder>().unwrap(), SortOrder::Relevance);
    }

    #[test]
    fn test_categories_defaults_first() {
        let cats = categories(&sample());
        assert_eq!(
            cats,
            vec!["Football", "Basketball", "Anime", "Korean", "Streetwear"]
        );
    }

    #[test]
    fn test_related_candidates_excludes_self() {
        let items = sample();
        let related = related_candidates(&items[0], &items);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].description, "Real Madrid Away");
    }

    #[test]
    fn test_record_conversion() {
        let record: CatalogRecord = serde_json::from_str(
            r#"{"ID": 12, "Description": " Jordan 23 ", "Product": "Basketball",
                "Price": "1599", "ImageUrl1": "", "ImageUrl2": "/img/j23.jpg"}"#,
        )
        .unwrap();
        let item = CatalogItem::from(record);
        assert_eq!(item.id.as_str(), "12");
        assert_eq!(item.description, "Jordan 23");
        assert_eq!(item.price, Money::from_rupees(1599));
        assert_eq!(item.images, vec!["/img/j23.jpg".to_owned()]);
        assert_eq!(item.primary_image(), "/img/j23.jpg");
        assert_eq!(item.material_label(), DEFAULT_MATERIAL);
    }

    #[test]
    fn test_primary_image_fallback() {
        assert_eq!(sample()[0].primary_image(), FALLBACK_IMAGE);
    }
}
