//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from the `FromRow` row
//! types private to each repository.

pub mod cart;
pub mod session;
pub mod user;

pub use cart::CartLine;
pub use session::CurrentUser;
pub use user::User;
