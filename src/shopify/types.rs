// Minimal Shopify Admin API DTOs.

use serde::{Deserialize, Serialize};

use crate::shopify::ShopifyApiError;

// ---- checkout read --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutEnvelope {
    pub checkout: CheckoutDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutDto {
    pub token: String,
    pub total_price: String,
    pub currency: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authoritative checkout facts, in cents. The widget is never trusted with
/// the total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub total_cents: i64,
    pub currency: String,
    pub email: Option<String>,
}

impl CheckoutDto {
    pub fn into_summary(self) -> Result<CheckoutSummary, ShopifyApiError> {
        let total_cents = parse_price_cents(&self.total_price).ok_or_else(|| {
            ShopifyApiError::Decode(format!("unparseable checkout total: {}", self.total_price))
        })?;
        Ok(CheckoutSummary {
            total_cents,
            currency: self.currency,
            email: self.email,
        })
    }
}

/// "150.00" -> 15000. Decimal prices with at most two fraction digits.
pub fn parse_price_cents(price: &str) -> Option<i64> {
    let (dollars, fraction) = match price.split_once('.') {
        Some((d, f)) => (d, f),
        None => (price, ""),
    };
    if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let dollars: i64 = dollars.parse().ok()?;
    if dollars < 0 {
        return None;
    }
    let cents: i64 = if fraction.is_empty() {
        0
    } else if fraction.len() == 1 {
        fraction.parse::<i64>().ok()? * 10
    } else {
        fraction.parse().ok()?
    };
    dollars.checked_mul(100)?.checked_add(cents)
}

/// 15000 -> "150.00", the Admin API's decimal-string convention.
pub fn format_price(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

// ---- order create ---------------------------------------------------------

/// Everything the submitter needs to record the order platform-side.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub transaction_id: i64,
    pub total_cents: i64,
    pub currency: String,
    pub email: Option<String>,
    pub payment_count: usize,
    pub checkout_token: String,
}

#[derive(Debug, Serialize)]
pub struct OrderCreateEnvelope {
    pub order: OrderCreateDto,
}

#[derive(Debug, Serialize)]
pub struct OrderCreateDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub currency: String,
    pub financial_status: String,
    pub note: String,
    pub tags: String,
    pub line_items: Vec<OrderLineItemDto>,
    pub metafields: Vec<OrderMetafieldDto>,
}

#[derive(Debug, Serialize)]
pub struct OrderLineItemDto {
    pub title: String,
    pub price: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderMetafieldDto {
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl OrderCreateEnvelope {
    pub fn from_draft(draft: &OrderDraft) -> Self {
        let meta = |key: &str, type_: &str, value: String| OrderMetafieldDto {
            namespace: "splitpay".to_string(),
            key: key.to_string(),
            type_: type_.to_string(),
            value,
        };
        OrderCreateEnvelope {
            order: OrderCreateDto {
                email: draft.email.clone(),
                currency: draft.currency.clone(),
                financial_status: "paid".to_string(),
                note: format!(
                    "Paid with split payment across {} cards (checkout {})",
                    draft.payment_count, draft.checkout_token
                ),
                tags: "split-payment".to_string(),
                line_items: vec![OrderLineItemDto {
                    title: "Order total".to_string(),
                    price: format_price(draft.total_cents),
                    quantity: 1,
                }],
                metafields: vec![
                    meta("split_payment", "boolean", "true".to_string()),
                    meta("transaction_id", "number_integer", draft.transaction_id.to_string()),
                    meta("payment_count", "number_integer", draft.payment_count.to_string()),
                ],
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEnvelope {
    pub order: OrderDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDto {
    pub id: i64,
    #[serde(default)]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Order identity written back onto the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub order_number: String,
}

impl OrderDto {
    pub fn into_created(self) -> CreatedOrder {
        let order_number = self
            .name
            .unwrap_or_else(|| format!("#{}", self.order_number.unwrap_or(self.id)));
        CreatedOrder {
            order_id: self.id.to_string(),
            order_number,
        }
    }
}

// Shopify error envelope: {"errors": ...} with free-form shape
#[derive(Debug, Clone, Deserialize)]
pub struct ShopifyErrorEnvelope {
    pub errors: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_cents() {
        assert_eq!(parse_price_cents("150.00"), Some(15000));
        assert_eq!(parse_price_cents("0.99"), Some(99));
        assert_eq!(parse_price_cents("12"), Some(1200));
        assert_eq!(parse_price_cents("12.5"), Some(1250));
        assert_eq!(parse_price_cents("12.505"), None);
        assert_eq!(parse_price_cents("-1.00"), None);
        assert_eq!(parse_price_cents("abc"), None);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(15000), "150.00");
        assert_eq!(format_price(99), "0.99");
        assert_eq!(format_price(1250), "12.50");
    }

    #[test]
    fn test_order_payload_carries_split_markers() {
        let draft = OrderDraft {
            transaction_id: 7,
            total_cents: 15000,
            currency: "USD".to_string(),
            email: Some("buyer@example.com".to_string()),
            payment_count: 3,
            checkout_token: "tok".to_string(),
        };
        let env = OrderCreateEnvelope::from_draft(&draft);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["order"]["tags"], "split-payment");
        assert_eq!(json["order"]["financial_status"], "paid");
        assert!(json["order"]["note"].as_str().unwrap().contains("3 cards"));
        let metafields = json["order"]["metafields"].as_array().unwrap();
        assert_eq!(metafields.len(), 3);
        assert_eq!(metafields[0]["key"], "split_payment");
        assert_eq!(metafields[1]["value"], "7");
        assert_eq!(metafields[2]["value"], "3");
    }

    #[test]
    fn test_order_number_prefers_name() {
        let dto = OrderDto { id: 42, order_number: Some(1001), name: Some("#1001".to_string()) };
        assert_eq!(
            dto.into_created(),
            CreatedOrder { order_id: "42".to_string(), order_number: "#1001".to_string() }
        );
    }
}
