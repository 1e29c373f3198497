//! Email rendering and SMTP delivery.
//!
//! Uses SMTP via lettre for delivery with Askama plain text templates.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;

use atelier_core::Money;

use super::{Notifier, NotifyError};
use crate::config::SmtpConfig;
use crate::models::Notification;

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_number: &'a str,
    total: String,
}

#[derive(Template)]
#[template(path = "email/custom_order_received.txt")]
struct CustomOrderReceivedText<'a> {
    name: &'a str,
    friendly_id: &'a str,
}

#[derive(Template)]
#[template(path = "email/quote_ready.txt")]
struct QuoteReadyText<'a> {
    name: &'a str,
    friendly_id: &'a str,
    price: String,
}

#[derive(Template)]
#[template(path = "email/custom_order_paid.txt")]
struct CustomOrderPaidText<'a> {
    name: &'a str,
    friendly_id: &'a str,
}

#[derive(Template)]
#[template(path = "email/admin_new_order.txt")]
struct AdminNewOrderText<'a> {
    reference: &'a str,
    customer_email: &'a str,
    total: String,
}

/// A rendered message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Render the subject and body for a notification.
///
/// # Errors
///
/// Returns `NotifyError::Template` if rendering fails.
pub fn render(notification: &Notification) -> Result<RenderedEmail, NotifyError> {
    let rendered = match notification {
        Notification::OrderConfirmation {
            order_number,
            name,
            total_minor,
            currency,
            ..
        } => RenderedEmail {
            subject: format!("Your order {order_number}"),
            body: OrderConfirmationText {
                name,
                order_number: order_number.as_str(),
                total: Money::from_minor(*total_minor, *currency).display(),
            }
            .render()?,
        },
        Notification::CustomOrderReceived {
            friendly_id, name, ..
        } => RenderedEmail {
            subject: format!("We received your custom order {friendly_id}"),
            body: CustomOrderReceivedText {
                name,
                friendly_id: friendly_id.as_str(),
            }
            .render()?,
        },
        Notification::QuoteReady {
            friendly_id,
            name,
            price,
            currency,
            ..
        } => RenderedEmail {
            subject: format!("Your quote for {friendly_id} is ready"),
            body: QuoteReadyText {
                name,
                friendly_id: friendly_id.as_str(),
                price: format!("{}{:.2}", currency.symbol(), price),
            }
            .render()?,
        },
        Notification::CustomOrderPaid {
            friendly_id, name, ..
        } => RenderedEmail {
            subject: format!("Payment received for {friendly_id}"),
            body: CustomOrderPaidText {
                name,
                friendly_id: friendly_id.as_str(),
            }
            .render()?,
        },
        Notification::AdminNewOrder {
            reference,
            customer_email,
            total_minor,
            currency,
        } => RenderedEmail {
            subject: format!("New paid order {reference}"),
            body: AdminNewOrderText {
                reference,
                customer_email: customer_email.as_str(),
                total: Money::from_minor(*total_minor, *currency).display(),
            }
            .render()?,
        },
    };
    Ok(rendered)
}

/// Delivers notifications by SMTP.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_email: Option<String>,
}

impl EmailNotifier {
    /// Create a new email notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &SmtpConfig, admin_email: Option<String>) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            admin_email,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let to = notification
            .recipient(self.admin_email.as_deref())
            .ok_or(NotifyError::NoRecipient(notification.kind()))?;
        let email = render(notification)?;

        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.mailer.send(message).await?;

        tracing::info!(to = %to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::{CurrencyCode, CustomOrderId, Email, FriendlyId, OrderId, OrderNumber};
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_render_order_confirmation() {
        let email = render(&Notification::OrderConfirmation {
            order_id: OrderId::generate(),
            order_number: OrderNumber::from_string("ORD-20261016-ABCDEF".to_owned()),
            email: Email::parse("ada@shop.example").unwrap(),
            name: "Ada".to_owned(),
            total_minor: 24000,
            currency: CurrencyCode::USD,
        })
        .unwrap();
        assert_eq!(email.subject, "Your order ORD-20261016-ABCDEF");
        assert!(email.body.contains("Hi Ada,"));
        assert!(email.body.contains("$240.00"));
    }

    #[test]
    fn test_render_quote_ready() {
        let email = render(&Notification::QuoteReady {
            custom_order_id: CustomOrderId::generate(),
            friendly_id: FriendlyId::parse("CO-ABCDEF").unwrap(),
            email: Email::parse("ada@shop.example").unwrap(),
            name: "Ada".to_owned(),
            price: Decimal::new(200, 0),
            currency: CurrencyCode::USD,
        })
        .unwrap();
        assert!(email.subject.contains("CO-ABCDEF"));
        assert!(email.body.contains("$200.00"));
    }
}
