//! Contact form and FAQ.
//!
//! Messages are relayed to the shop's inbox by email with the visitor's
//! address as `Reply-To`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use tracing::instrument;

use ballerz_core::Email;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::services::email::{ContactMessage, EmailError};
use crate::state::AppState;

/// One question on the FAQ page.
pub struct Faq {
    pub question: &'static str,
    pub answer: &'static str,
}

/// Questions shown on the FAQ page.
pub const FAQS: &[Faq] = &[
    Faq {
        question: "What is the material of the clothing?",
        answer: "Our clothing is made from a blend of breathable cotton and polyester for comfort and durability.",
    },
    Faq {
        question: "What are the available sizes?",
        answer: "We offer sizes S, M, L, and XL. Check each product page for exact measurements.",
    },
    Faq {
        question: "What is the return policy?",
        answer: "You can return items within 14 days of delivery in original condition for a refund.",
    },
    Faq {
        question: "How long does shipping take?",
        answer: "Standard shipping typically takes 3-7 business days depending on your location.",
    },
    Faq {
        question: "Do you offer international shipping?",
        answer: "Yes, we ship internationally. Shipping costs and times vary by country.",
    },
];

/// FAQ page template, with the contact form.
#[derive(Template, WebTemplate)]
#[template(path = "faq.html")]
pub struct FaqTemplate {
    pub user: Option<CurrentUser>,
    pub faqs: &'static [Faq],
}

/// Body of `POST /api/send-contact`.
///
/// Every field is optional here so that a missing field and a blank one
/// get the same answer.
#[derive(Debug, Default, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

impl ContactRequest {
    /// Check that every field is present and the address is valid.
    fn validate(self) -> Result<ContactMessage> {
        let present = |value: Option<String>| {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let (Some(name), Some(subject), Some(email), Some(message)) = (
            present(self.name),
            present(self.subject),
            present(self.email),
            present(self.message),
        ) else {
            return Err(AppError::BadRequest("Missing fields".to_owned()));
        };

        let email = Email::parse(&email)
            .map_err(|_| AppError::Email(EmailError::InvalidAddress(email)))?;

        Ok(ContactMessage {
            name,
            email,
            subject,
            message,
        })
    }
}

/// Display the FAQ page.
pub async fn faq(OptionalAuth(user): OptionalAuth) -> FaqTemplate {
    FaqTemplate { user, faqs: FAQS }
}

/// Relay a contact form message.
///
/// Returns `{"ok": true}` once the message has been handed to the SMTP
/// server.
#[instrument(skip(state, body))]
pub async fn send_contact(
    State(state): State<AppState>,
    body: std::result::Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable contact request");
        AppError::BadRequest("Missing fields".to_owned())
    })?;
    let contact = request.validate()?;

    let mailer = state.mailer().ok_or(EmailError::NotConfigured)?;

    add_breadcrumb("contact", "Contact message submitted", None);
    mailer.send_contact(&contact).await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}
