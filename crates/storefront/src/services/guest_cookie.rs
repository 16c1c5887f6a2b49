//! The guest cart cookie.
//!
//! Visitors who are not signed in keep their cart client-side in the
//! `guest_cart` cookie: a URL-encoded JSON array of line items. The cookie
//! is readable by the browser's own scripts, so it is not `HttpOnly`.
//!
//! A missing or unreadable cookie is an empty cart. Writing an empty cart
//! removes the cookie. A cart whose cookie would pass the browser limit of
//! 4096 bytes is refused instead of written, since browsers drop such
//! cookies without notice.

use axum::http::{HeaderMap, header};
use thiserror::Error;
use tower_sessions::cookie::time::{Duration, OffsetDateTime};
use tower_sessions::cookie::{Cookie, SameSite};

use ballerz_core::GuestCart;

/// Cookie name.
pub const GUEST_CART_COOKIE: &str = "guest_cart";

/// Largest `Set-Cookie` value browsers are guaranteed to keep.
pub const MAX_COOKIE_BYTES: usize = 4096;

/// Errors raised while writing the cookie.
#[derive(Debug, Error)]
pub enum GuestCookieError {
    #[error("failed to encode guest cart: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("guest cart cookie would be {0} bytes")]
    TooLarge(usize),
}

/// Read the guest cart from request headers.
#[must_use]
pub fn read(headers: &HeaderMap) -> GuestCart {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == GUEST_CART_COOKIE)
        .and_then(|cookie| {
            urlencoding::decode(cookie.value())
                .ok()
                .map(|json| GuestCart::from_json(&json))
        })
        .unwrap_or_default()
}

/// Build the `Set-Cookie` header value that stores `cart`.
///
/// # Errors
///
/// Returns `GuestCookieError::Encode` if the cart cannot be serialized and
/// `GuestCookieError::TooLarge` if the cookie would exceed
/// [`MAX_COOKIE_BYTES`].
pub fn write(cart: &GuestCart, days: u32) -> Result<String, GuestCookieError> {
    if cart.is_empty() {
        return Ok(clear());
    }

    let json = cart.to_json()?;
    let max_age = Duration::days(i64::from(days));
    let cookie = Cookie::build((GUEST_CART_COOKIE, urlencoding::encode(&json).into_owned()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .expires(OffsetDateTime::now_utc() + max_age)
        .build();

    let value = cookie.to_string();
    if value.len() > MAX_COOKIE_BYTES {
        return Err(GuestCookieError::TooLarge(value.len()));
    }
    Ok(value)
}

/// Build the `Set-Cookie` header value that deletes the cookie.
#[must_use]
pub fn clear() -> String {
    Cookie::build((GUEST_CART_COOKIE, ""))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;
    use ballerz_core::{LineItem, Size};

    use super::*;

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_written_cookie_reads_back() {
        let mut cart = GuestCart::new();
        cart.add(LineItem::new("7", 2, Some(Size::M)));
        cart.add(LineItem::new("9", 1, None));

        let set_cookie = write(&cart, 30).unwrap();
        assert!(set_cookie.starts_with("guest_cart="));
        assert!(set_cookie.contains("Path=/"));
        assert!(set_cookie.contains("Max-Age=2592000"));
        assert!(!set_cookie.contains("HttpOnly"));

        let pair = set_cookie.split(';').next().unwrap();
        let read_back = read(&headers_with(&format!("theme=dark; {pair}")));
        assert_eq!(read_back, cart);
    }

    #[test]
    fn test_missing_or_garbled_cookie_is_empty() {
        assert!(read(&HeaderMap::new()).is_empty());
        assert!(read(&headers_with("guest_cart=%7Bnot-json")).is_empty());
        assert!(read(&headers_with("other=1")).is_empty());
    }

    #[test]
    fn test_reads_cookie_written_by_browser_scripts() {
        let json = r#"[{"ID":"3","Quantity":2,"Size":"L"},{"ID":3,"Quantity":1,"Size":"L"}]"#;
        let cart = read(&headers_with(&format!(
            "guest_cart={}",
            urlencoding::encode(json)
        )));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_full_cart_is_refused() {
        let mut cart = GuestCart::new();
        let mut lines = 0;
        loop {
            let mut next = cart.clone();
            next.add(LineItem::new(lines.to_string(), 1, Some(Size::M)).added_at(chrono::Utc::now()));
            match write(&next, 30) {
                Ok(set_cookie) => {
                    assert!(set_cookie.len() <= MAX_COOKIE_BYTES);
                    let pair = set_cookie.split(';').next().unwrap();
                    assert_eq!(read(&headers_with(pair)), next);
                    cart = next;
                    lines += 1;
                }
                Err(GuestCookieError::TooLarge(size)) => {
                    assert!(size > MAX_COOKIE_BYTES);
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(lines >= 25, "only {lines} lines fit");
    }

    #[test]
    fn test_empty_cart_clears_cookie() {
        let set_cookie = write(&GuestCart::new(), 30).unwrap();
        assert!(set_cookie.starts_with("guest_cart=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
