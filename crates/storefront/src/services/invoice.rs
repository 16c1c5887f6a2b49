//! PDF invoices.
//!
//! Invoices are laid out on A4 with the built-in Helvetica faces, which only
//! cover Windows-1252. Amounts are therefore written as `Rs. 1299` and any
//! character outside that range is replaced before it reaches the page.

use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use ballerz_core::{CustomerDetails, Money, Order, OrderLine, OrderStatus};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const ROW_HEIGHT: f32 = 7.0;
const BOTTOM_LIMIT: f32 = 30.0;

/// Column x-positions of the items table (mm).
const COL_PRODUCT: f32 = MARGIN;
const COL_QTY: f32 = 120.0;
const COL_PRICE: f32 = 140.0;
const COL_TOTAL: f32 = 170.0;

/// Product names longer than this are cut to keep the table aligned.
const MAX_PRODUCT_CHARS: usize = 48;

/// Errors raised while rendering an invoice.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] printpdf::Error),

    #[error("{0}")]
    OutOfRange(&'static str),
}

/// Order date printed on an invoice.
///
/// Clients post whatever their order record holds: an RFC 3339 string, a
/// `{seconds, nanoseconds}` timestamp, epoch milliseconds, or free text.
/// Free text is printed as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderDate {
    At(DateTime<Utc>),
    Text(String),
}

impl OrderDate {
    fn printed(&self) -> String {
        match self {
            Self::At(at) => at.format("%d %b %Y").to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PostedDate {
    Text(String),
    Millis(i64),
    Timestamp {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    Other(IgnoredAny),
}

impl PostedDate {
    fn into_date(self) -> Option<OrderDate> {
        match self {
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else if let Ok(at) = DateTime::parse_from_rfc3339(text) {
                    Some(OrderDate::At(at.with_timezone(&Utc)))
                } else {
                    Some(OrderDate::Text(text.to_owned()))
                }
            }
            Self::Millis(millis) => DateTime::from_timestamp_millis(millis).map(OrderDate::At),
            Self::Timestamp {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(seconds, nanoseconds).map(OrderDate::At),
            Self::Other(_) => None,
        }
    }
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OrderDate>, D::Error> {
    Ok(Option::<PostedDate>::deserialize(deserializer)?.and_then(PostedDate::into_date))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PostedStatus {
    Text(String),
    Other(IgnoredAny),
}

/// Unknown or malformed statuses read as absent.
fn lenient_status<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<OrderStatus>, D::Error> {
    Ok(match Option::<PostedStatus>::deserialize(deserializer)? {
        Some(PostedStatus::Text(text)) => text.parse().ok(),
        Some(PostedStatus::Other(_)) | None => None,
    })
}

/// Everything printed on an invoice.
///
/// Built from a stored [`Order`] or from the loose order object a client
/// posts to `/api/send-invoice`; missing fields print as `-`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub created_at: Option<OrderDate>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub total: Option<Money>,
}

impl InvoiceData {
    /// Reference printed as the order id.
    #[must_use]
    pub fn reference(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    /// Grand total: the stored total, or the sum of the lines.
    #[must_use]
    pub fn grand_total(&self) -> Money {
        self.total
            .unwrap_or_else(|| self.items.iter().map(OrderLine::line_total).sum())
    }

    /// Status printed on the invoice.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.unwrap_or(OrderStatus::Completed).as_str()
    }

    /// Check that the amounts can be priced.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::OutOfRange` when a line has a quantity,
    /// price or surcharge no cart could hold, or the posted total is
    /// negative or above [`Money::LIMIT`].
    pub fn check_limits(&self) -> Result<(), InvoiceError> {
        if !self.items.iter().all(OrderLine::is_within_limits) {
            return Err(InvoiceError::OutOfRange("Order line out of range"));
        }
        if self.total.is_some_and(|total| !total.is_within(Money::LIMIT)) {
            return Err(InvoiceError::OutOfRange("Order total out of range"));
        }
        Ok(())
    }
}

impl From<&Order> for InvoiceData {
    fn from(order: &Order) -> Self {
        Self {
            id: Some(order.id.to_string()),
            created_at: Some(OrderDate::At(order.created_at)),
            status: Some(order.status),
            customer: order.customer.clone(),
            items: order.items.clone(),
            total: Some(order.total),
        }
    }
}

/// Page writer that moves to a new page when the cursor nears the bottom.
struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor<'_> {
    fn text(&self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer.use_text(pdf_safe(text), size, Mm(x), Mm(self.y), font);
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
        if self.y < BOTTOM_LIMIT {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }
}

/// Render an invoice to PDF bytes.
///
/// # Errors
///
/// Returns `InvoiceError::Pdf` if a font cannot be embedded or the document
/// cannot be written.
pub fn render_invoice(data: &InvoiceData) -> Result<Vec<u8>, InvoiceError> {
    let (doc, page, layer) =
        PdfDocument::new("Ballerz Invoice", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut cursor = Cursor {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT - MARGIN,
    };

    cursor.text("Ballerz Invoice", 20.0, MARGIN, &bold);
    cursor.advance(12.0);

    let date = data
        .created_at
        .as_ref()
        .map_or_else(|| "-".to_owned(), OrderDate::printed);
    for line in [
        format!("Order ID: {}", data.reference()),
        format!("Date: {date}"),
        format!("Status: {}", data.status_label()),
    ] {
        cursor.text(&line, 11.0, MARGIN, &regular);
        cursor.advance(ROW_HEIGHT);
    }

    cursor.advance(4.0);
    cursor.text("Customer", 13.0, MARGIN, &bold);
    cursor.advance(ROW_HEIGHT + 1.0);

    let customer = data.customer.clone().unwrap_or_default();
    let or_dash = |value: Option<String>| {
        value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "-".to_owned())
    };
    for (label, value) in [
        ("Name", customer.name),
        ("Email", customer.email),
        ("Phone", customer.phone),
        ("Address", customer.address),
    ] {
        cursor.text(&format!("{label}: {}", or_dash(value)), 11.0, MARGIN, &regular);
        cursor.advance(ROW_HEIGHT);
    }

    cursor.advance(4.0);
    for (heading, x) in [
        ("Product", COL_PRODUCT),
        ("Qty", COL_QTY),
        ("Price", COL_PRICE),
        ("Total", COL_TOTAL),
    ] {
        cursor.text(heading, 11.0, x, &bold);
    }
    cursor.advance(ROW_HEIGHT);

    for item in &data.items {
        let name: String = item.display_name().chars().take(MAX_PRODUCT_CHARS).collect();
        let name = match item.size {
            Some(size) => format!("{name} ({size})"),
            None => name,
        };
        cursor.text(&name, 10.0, COL_PRODUCT, &regular);
        cursor.text(&item.quantity.to_string(), 10.0, COL_QTY, &regular);
        cursor.text(&item.unit_price().display_ascii(), 10.0, COL_PRICE, &regular);
        cursor.text(&item.line_total().display_ascii(), 10.0, COL_TOTAL, &regular);
        cursor.advance(ROW_HEIGHT);

        if let Some(text) = item.customization_text.as_deref().filter(|t| !t.is_empty()) {
            cursor.text(&format!("Custom: {text}"), 9.0, COL_PRODUCT + 4.0, &regular);
            cursor.advance(ROW_HEIGHT);
        }
    }

    cursor.advance(4.0);
    cursor.text(
        &format!("Grand Total: {}", data.grand_total().display_ascii()),
        13.0,
        MARGIN,
        &bold,
    );
    cursor.advance(ROW_HEIGHT * 2.0);
    cursor.text("Thank you for shopping with Ballerz.", 11.0, MARGIN, &regular);

    Ok(doc.save_to_bytes()?)
}

/// Replace characters the built-in fonts cannot draw.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{20b9}' => 'R',
            '\n' | '\r' | '\t' => ' ',
            c if (' '..='~').contains(&c) || ('\u{a0}'..='\u{ff}').contains(&c) => c,
            _ => '?',
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ballerz_core::{ItemId, ProductSnapshot, Size};

    use super::*;

    fn line(description: &str, quantity: u32, price: i64) -> OrderLine {
        OrderLine {
            item_id: ItemId::from("1"),
            quantity,
            size: Some(Size::M),
            customization_text: None,
            surcharge: Money::ZERO,
            product: Some(ProductSnapshot {
                description: description.to_owned(),
                category: "Football".to_owned(),
                price: Money::from_rupees(price),
                image: None,
            }),
        }
    }

    #[test]
    fn test_renders_pdf() {
        let data = InvoiceData {
            id: Some("5f0c2d1e-aaaa-bbbb-cccc-1234567890ab".to_owned()),
            created_at: Some(OrderDate::At(Utc::now())),
            status: Some(OrderStatus::Placed),
            customer: Some(CustomerDetails {
                name: Some("Priya".to_owned()),
                ..CustomerDetails::default()
            }),
            items: vec![line("Real Madrid Home", 2, 1499)],
            total: None,
        };

        let bytes = render_invoice(&data).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_orders_span_pages() {
        let data = InvoiceData {
            items: (0..80).map(|i| line(&format!("Jersey {i}"), 1, 999)).collect(),
            ..InvoiceData::default()
        };
        assert!(render_invoice(&data).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_defaults() {
        let data: InvoiceData = serde_json::from_str(
            r#"{"items": [{"ID": "1", "Quantity": 2, "product": {"Description": "X", "Price": 500}}]}"#,
        )
        .unwrap();
        assert_eq!(data.reference(), "-");
        assert_eq!(data.status_label(), "completed");
        assert_eq!(data.grand_total(), Money::from_rupees(1000));
    }

    #[test]
    fn test_loose_dates() {
        let parse = |json: &str| -> InvoiceData { serde_json::from_str(json).unwrap() };

        let timestamp = parse(r#"{"createdAt": {"seconds": 1760608800, "nanoseconds": 5}}"#);
        assert_eq!(
            timestamp.created_at,
            DateTime::from_timestamp(1_760_608_800, 5).map(OrderDate::At)
        );

        let admin_sdk = parse(r#"{"createdAt": {"_seconds": 1760608800, "_nanoseconds": 0}}"#);
        assert!(matches!(admin_sdk.created_at, Some(OrderDate::At(_))));

        let rfc3339 = parse(r#"{"createdAt": "2026-10-16T10:00:00.123Z"}"#);
        assert_eq!(rfc3339.created_at.unwrap().printed(), "16 Oct 2026");

        let text = parse(r#"{"createdAt": "Fri Oct 16 2026 15:30:00 GMT+0530"}"#);
        assert_eq!(
            text.created_at,
            Some(OrderDate::Text("Fri Oct 16 2026 15:30:00 GMT+0530".to_owned()))
        );

        let millis = parse(r#"{"createdAt": 1760608800000}"#);
        assert!(matches!(millis.created_at, Some(OrderDate::At(_))));

        assert_eq!(parse(r#"{"createdAt": [1, 2]}"#).created_at, None);
        assert_eq!(parse(r#"{"createdAt": null}"#).created_at, None);
    }

    #[test]
    fn test_loose_status() {
        let parse = |json: &str| -> InvoiceData { serde_json::from_str(json).unwrap() };
        assert_eq!(parse(r#"{"status": "Out_For_Delivery"}"#).status, Some(OrderStatus::OutForDelivery));
        assert_eq!(parse(r#"{"status": "pending payment"}"#).status_label(), "completed");
        assert_eq!(parse(r#"{"status": 3}"#).status_label(), "completed");
    }

    #[test]
    fn test_check_limits() {
        let ok = InvoiceData {
            items: vec![line("Real Madrid Home", 2, 1499)],
            ..InvoiceData::default()
        };
        assert!(ok.check_limits().is_ok());

        let huge: InvoiceData = serde_json::from_str(
            r#"{"items": [{"ID": "1", "Quantity": 3, "product": {"Price": "79228162514264337593543950335"}}]}"#,
        )
        .unwrap();
        assert!(huge.check_limits().is_err());
        assert_eq!(huge.grand_total(), Money::new(rust_decimal::Decimal::MAX));

        let many = InvoiceData {
            items: vec![line("X", 1_000_000, 100)],
            ..InvoiceData::default()
        };
        assert!(many.check_limits().is_err());

        let negative_total = InvoiceData {
            total: Some(Money::from_rupees(-1)),
            ..InvoiceData::default()
        };
        assert!(negative_total.check_limits().is_err());
    }

    #[test]
    fn test_pdf_safe() {
        assert_eq!(pdf_safe("₹ 10\nJosé 東"), "R 10 José ?");
    }
}
