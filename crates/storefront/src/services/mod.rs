//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Email and password accounts
//! - `cart` - The active cart of a request (guest cookie or stored)
//! - `cart_events` - Change notifications for stored carts
//! - `catalog` - Cached catalog reads
//! - `email` - Contact relay and invoice delivery over SMTP
//! - `guest_cookie` - Reading and writing the guest cart cookie
//! - `invoice` - PDF invoice rendering

pub mod auth;
pub mod cart;
pub mod cart_events;
pub mod catalog;
pub mod email;
pub mod guest_cookie;
pub mod invoice;
