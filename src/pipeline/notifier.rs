//! Notification channels
//!
//! The console channel is the only shipped implementation; the trait
//! seam exists so email or webhook channels can slot in without
//! touching the alert manager.

use async_trait::async_trait;

use crate::domain::alert::ThresholdPolicy;
use crate::pipeline::WatchError;

/// Everything a channel needs to render one price drop alert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub book_title: Option<String>,
    pub isbn: String,
    pub tracked_price: f64,
    pub competing_price: f64,
    pub competing_source: String,
    pub difference: f64,
    pub percentage: f64,
    pub policy: ThresholdPolicy,
}

/// A delivery channel for price drop alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, message: &AlertMessage) -> Result<(), WatchError>;
}

/// Writes alerts to the terminal and the structured log
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn dispatch(&self, message: &AlertMessage) -> Result<(), WatchError> {
        tracing::info!(
            alert_type = "price_drop",
            isbn = %message.isbn,
            tracked_price = message.tracked_price,
            competing_price = message.competing_price,
            competing_source = %message.competing_source,
            difference = message.difference,
            percentage = message.percentage,
            "PRICE DROP ALERT"
        );

        println!("\n{}", format_alert(message));
        Ok(())
    }
}

const BANNER: &str =
    "================================================================================";

fn format_alert(message: &AlertMessage) -> String {
    let title = message.book_title.as_deref().unwrap_or("Unknown");
    format!(
        "{BANNER}\n\
         PRICE DROP ALERT\n\
         {BANNER}\n\
         Book: {title}\n\
         ISBN: {isbn}\n\
         Tracked price: ${tracked:.2}\n\
         {source} price: ${competing:.2}\n\
         Savings: ${difference:.2} ({percentage:.2}%)\n\
         Threshold: {policy_type} ({policy_value})\n\
         {BANNER}\n",
        isbn = message.isbn,
        tracked = message.tracked_price,
        source = message.competing_source,
        competing = message.competing_price,
        difference = message.difference,
        percentage = message.percentage,
        policy_type = message.policy.type_name(),
        policy_value = message.policy.value(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> AlertMessage {
        AlertMessage {
            book_title: Some("Effective Java".to_string()),
            isbn: "9780134685991".to_string(),
            tracked_price: 29.99,
            competing_price: 21.00,
            competing_source: "alibris".to_string(),
            difference: 8.99,
            percentage: 29.98,
            policy: ThresholdPolicy::Absolute(5.0),
        }
    }

    #[test]
    fn formatted_alert_carries_every_field() {
        let text = format_alert(&sample_message());

        assert!(text.contains("Book: Effective Java"));
        assert!(text.contains("ISBN: 9780134685991"));
        assert!(text.contains("Tracked price: $29.99"));
        assert!(text.contains("alibris price: $21.00"));
        assert!(text.contains("Savings: $8.99 (29.98%)"));
        assert!(text.contains("Threshold: absolute (5)"));
    }

    #[test]
    fn missing_title_renders_a_placeholder() {
        let mut message = sample_message();
        message.book_title = None;

        let text = format_alert(&message);
        assert!(text.contains("Book: Unknown"));
    }

    #[tokio::test]
    async fn console_dispatch_always_succeeds() {
        let notifier = ConsoleNotifier;
        assert_eq!(notifier.name(), "console");
        assert!(notifier.dispatch(&sample_message()).await.is_ok());
    }
}
