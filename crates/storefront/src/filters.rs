//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Link to a product page. Products are addressed by their description.
///
/// Usage in templates: `{{ item.description|product_url }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn product_url(description: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(product_path(&description.to_string()))
}

/// Path of the product page for `description`.
#[must_use]
pub fn product_path(description: &str) -> String {
    format!("/product/{}", urlencoding::encode(description))
}
