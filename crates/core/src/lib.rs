//! Ballerz Core - Shared domain types and cart logic.
//!
//! This crate provides the types and pure logic used across the Ballerz
//! components:
//! - `storefront` - Public shop, cart, checkout and order management
//! - `cli` - Command-line tools for migrations, seeding and user roles
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. The storefront decides where a cart lives
//! (cookie or database); this crate decides what a cart mutation means.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, money, sizes and statuses
//! - [`cart`] - Cart line items, the guest cart and cart totals
//! - [`catalog`] - Catalog items and shop browsing (filter, search, sort)
//! - [`order`] - Order snapshots taken from a cart at checkout

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod order;
pub mod types;

pub use cart::{
    CartTotals, Customization, GuestCart, LineItem, LineKey, MAX_LINE_QUANTITY, MAX_SURCHARGE, MergeStep,
    capped_quantity, cart_totals, plan_guest_merge,
};
pub use catalog::{
    CatalogItem, CatalogLookup, CatalogQuery, CatalogRecord, SortOrder, categories, related_candidates,
};
pub use order::{CustomerDetails, NewOrder, Order, OrderError, OrderLine, ProductSnapshot};
pub use types::*;
