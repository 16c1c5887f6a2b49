//! Outgoing mail: contact form relay and order invoices.
//!
//! Uses SMTP via lettre with implicit TLS (port 465 by default) and Askama
//! templates for the bodies. Everything a visitor typed is escaped by the
//! HTML templates before it reaches an inbox.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        Error as SmtpError,
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};
use secrecy::ExposeSecret;
use thiserror::Error;

use ballerz_core::Email;

use crate::config::EmailConfig;

#[derive(Template)]
#[template(path = "email/contact.html")]
struct ContactEmailHtml<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    lines: Vec<&'a str>,
}

#[derive(Template)]
#[template(path = "email/contact.txt")]
struct ContactEmailText<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    message: &'a str,
}

#[derive(Template)]
#[template(path = "email/invoice.html")]
struct InvoiceEmailHtml<'a> {
    reference: &'a str,
}

#[derive(Template)]
#[template(path = "email/invoice.txt")]
struct InvoiceEmailText<'a> {
    reference: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// No SMTP credentials were configured.
    #[error("email is not configured")]
    NotConfigured,

    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

/// A message sent through the contact form.
#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub subject: String,
    pub message: String,
}

/// SMTP mailer.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    contact_receiver: Mailbox,
}

impl Mailer {
    /// Create a mailer from configuration.
    ///
    /// No connection is made until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS parameters or addresses are invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_owned(),
        );

        let builder = if config.allow_insecure {
            tracing::warn!("SMTP certificate verification is disabled");
            let tls = TlsParameters::builder(config.smtp_host.clone())
                .dangerous_accept_invalid_certs(true)
                .build()?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .tls(Tls::Wrapper(tls))
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: mailbox(Some(&config.sender_name), &config.username)?,
            contact_receiver: mailbox(None, &config.contact_receiver)?,
        })
    }

    /// Relay a contact form message to the shop's inbox.
    ///
    /// The visitor's address is set as `Reply-To`.
    ///
    /// # Errors
    ///
    /// Returns error if the message fails to render or send.
    pub async fn send_contact(&self, contact: &ContactMessage) -> Result<(), EmailError> {
        let html = ContactEmailHtml {
            name: &contact.name,
            email: contact.email.as_str(),
            subject: &contact.subject,
            lines: contact.message.lines().collect(),
        }
        .render()?;
        let text = ContactEmailText {
            name: &contact.name,
            email: contact.email.as_str(),
            subject: &contact.subject,
            message: &contact.message,
        }
        .render()?;

        let message = Message::builder()
            .from(self.from.clone())
            .reply_to(mailbox(Some(&contact.name), contact.email.as_str())?)
            .to(self.contact_receiver.clone())
            .subject(contact_subject(&contact.subject))
            .multipart(alternative(text, html))?;

        self.transport.send(message).await?;
        tracing::info!(from = %contact.email, "Contact message relayed");
        Ok(())
    }

    /// Send an order invoice as a PDF attachment.
    ///
    /// # Errors
    ///
    /// Returns error if the recipient is invalid or sending fails.
    pub async fn send_invoice(
        &self,
        to: &str,
        order_id: &str,
        pdf: Vec<u8>,
    ) -> Result<(), EmailError> {
        let html = InvoiceEmailHtml { reference: order_id }.render()?;
        let text = InvoiceEmailText { reference: order_id }.render()?;

        let attachment = Attachment::new(invoice_filename(order_id)).body(pdf, pdf_content_type());

        let message = Message::builder()
            .from(self.from.clone())
            .to(mailbox(None, to)?)
            .subject(format!("Your Ballerz Order {order_id}"))
            .multipart(
                MultiPart::mixed()
                    .multipart(alternative(text, html))
                    .singlepart(attachment),
            )?;

        self.transport.send(message).await?;
        tracing::info!(to = %to, order_id = %order_id, "Invoice sent");
        Ok(())
    }

    /// Send a short plain-text message, used to check the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the recipient is invalid or sending fails.
    pub async fn send_test(&self, to: &str) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mailbox(None, to)?)
            .subject("Ballerz mail test")
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body("SMTP settings are working.".to_owned()),
            )?;

        self.transport.send(message).await?;
        Ok(())
    }
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, EmailError> {
    let address = address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_owned()))?;
    Ok(Mailbox::new(name.map(str::to_owned), address))
}

fn alternative(text: String, html: String) -> MultiPart {
    MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text),
        )
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html),
        )
}

fn pdf_content_type() -> ContentType {
    ContentType::parse("application/pdf").unwrap_or(ContentType::TEXT_PLAIN)
}

/// Subject line of a relayed contact message.
#[must_use]
pub fn contact_subject(subject: &str) -> String {
    format!("Contact form: {subject}")
}

/// File name of an invoice attachment.
#[must_use]
pub fn invoice_filename(order_id: &str) -> String {
    format!("Ballerz_Order_{order_id}.pdf")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.gmail.com".to_owned(),
            smtp_port: 465,
            username: "orders@ballerz.in".to_owned(),
            password: SecretString::from("app-password"),
            sender_name: "Ballerz".to_owned(),
            contact_receiver: "support@ballerz.in".to_owned(),
            allow_insecure: false,
        }
    }

    #[test]
    fn test_contact_html_escapes_input() {
        let html = ContactEmailHtml {
            name: "<b>Rohit</b>",
            email: "rohit@example.com",
            subject: "Sizes & fits",
            lines: "first line\n<script>alert(1)</script>".lines().collect(),
        }
        .render()
        .unwrap();

        assert!(html.contains("&lt;b&gt;Rohit&lt;/b&gt;"));
        assert!(html.contains("Sizes &amp; fits"));
        assert!(html.contains("first line<br"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_invoice_naming() {
        assert_eq!(invoice_filename("A1B2"), "Ballerz_Order_A1B2.pdf");
        assert_eq!(contact_subject("Returns"), "Contact form: Returns");
    }

    #[test]
    fn test_invoice_text_body() {
        let text = InvoiceEmailText { reference: "A1B2" }.render().unwrap();
        assert!(text.contains("Thank you for your order. Attached is your invoice."));
    }

    #[tokio::test]
    async fn test_mailer_builds_without_connecting() {
        let mailer = Mailer::new(&config()).unwrap();
        assert_eq!(mailer.from.to_string(), "Ballerz <orders@ballerz.in>");

        let insecure = EmailConfig {
            allow_insecure: true,
            ..config()
        };
        assert!(Mailer::new(&insecure).is_ok());

        let bad = EmailConfig {
            contact_receiver: "not an address".to_owned(),
            ..config()
        };
        assert!(matches!(
            Mailer::new(&bad),
            Err(EmailError::InvalidAddress(_))
        ));
    }
}
