// Structural validation. Pure functions, no I/O; failures here never touch
// state and map to HTTP 400 at the surface.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use thiserror::Error;

pub const MIN_CARDS: usize = 2;
pub const MAX_CARDS: usize = 5;
pub const MIN_AMOUNT_CENTS: i64 = 100;

static SHOP_DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+\.myshopify\.com$").unwrap());
static CHECKOUT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]{32,64}$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid shop domain")]
    InvalidShopDomain,
    #[error("invalid checkout token")]
    InvalidCheckoutToken,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("split must use between {MIN_CARDS} and {MAX_CARDS} cards, got {0}")]
    InvalidCardCount(usize),
    #[error("split amounts sum to {sum} but the transaction total is {total}")]
    AmountSumMismatch { sum: i64, total: i64 },
    #[error("invalid email address")]
    InvalidEmail,
    #[error("invalid ip address")]
    InvalidIp,
    #[error("invalid provider id: expected {expected} prefix")]
    InvalidProviderId { expected: &'static str },
}

pub fn shop_domain(domain: &str) -> Result<(), ValidationError> {
    if SHOP_DOMAIN_RE.is_match(domain) {
        Ok(())
    } else {
        Err(ValidationError::InvalidShopDomain)
    }
}

pub fn checkout_token(token: &str) -> Result<(), ValidationError> {
    if CHECKOUT_TOKEN_RE.is_match(token) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCheckoutToken)
    }
}

/// Amount bounds: positive, at least `min`, at most `max` when given.
pub fn amount(amount_cents: i64, min: i64, max: Option<i64>) -> Result<(), ValidationError> {
    if amount_cents <= 0 {
        return Err(ValidationError::InvalidAmount("must be positive".into()));
    }
    if amount_cents < min {
        return Err(ValidationError::InvalidAmount(format!(
            "must be at least {min} cents"
        )));
    }
    if let Some(max) = max {
        if amount_cents > max {
            return Err(ValidationError::InvalidAmount(format!(
                "must not exceed {max} cents"
            )));
        }
    }
    Ok(())
}

/// A full split: 2..=5 cards, each amount individually valid, exact total.
pub fn payment_amounts(
    total: i64,
    amounts: &[i64],
    min_amount: i64,
) -> Result<(), ValidationError> {
    if amounts.len() < MIN_CARDS || amounts.len() > MAX_CARDS {
        return Err(ValidationError::InvalidCardCount(amounts.len()));
    }
    for &a in amounts {
        amount(a, min_amount, None)?;
    }
    let sum = crate::money::checked_sum(amounts)
        .ok_or_else(|| ValidationError::InvalidAmount("amount overflow".to_string()))?;
    if sum != total {
        return Err(ValidationError::AmountSumMismatch { sum, total });
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn ip_address(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidIp)
}

pub fn payment_intent_id(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("pi_") && value.len() > 3 {
        Ok(())
    } else {
        Err(ValidationError::InvalidProviderId { expected: "pi_" })
    }
}

pub fn payment_method_id(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("pm_") && value.len() > 3 {
        Ok(())
    } else {
        Err(ValidationError::InvalidProviderId { expected: "pm_" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shop_domain() {
        assert!(shop_domain("dev-shop.myshopify.com").is_ok());
        assert!(shop_domain("Shop123.myshopify.com").is_ok());
        assert!(shop_domain("shop.example.com").is_err());
        assert!(shop_domain("shop_x.myshopify.com").is_err());
        assert!(shop_domain(".myshopify.com").is_err());
        assert!(shop_domain("evil.com/x.myshopify.com").is_err());
    }

    #[test]
    fn test_checkout_token() {
        assert!(checkout_token(&"a".repeat(32)).is_ok());
        assert!(checkout_token(&"Z9".repeat(32)).is_ok());
        assert!(checkout_token(&"a".repeat(31)).is_err());
        assert!(checkout_token(&"a".repeat(65)).is_err());
        assert!(checkout_token(&format!("{}-", "a".repeat(33))).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(amount(100, 100, None).is_ok());
        assert!(amount(99, 100, None).is_err());
        assert!(amount(0, 100, None).is_err());
        assert!(amount(-5, 100, None).is_err());
        assert!(amount(5000, 100, Some(4000)).is_err());
        assert!(amount(4000, 100, Some(4000)).is_ok());
    }

    #[test]
    fn test_payment_amounts_card_count() {
        assert_eq!(
            payment_amounts(1000, &[1000], 100),
            Err(ValidationError::InvalidCardCount(1))
        );
        assert_eq!(
            payment_amounts(600, &[100; 6], 100),
            Err(ValidationError::InvalidCardCount(6))
        );
    }

    #[test]
    fn test_payment_amounts_sum() {
        assert!(payment_amounts(15000, &[10000, 5000], 100).is_ok());
        assert_eq!(
            payment_amounts(15000, &[10000, 4000], 100),
            Err(ValidationError::AmountSumMismatch { sum: 14000, total: 15000 })
        );
    }

    #[test]
    fn test_email_and_ip() {
        assert!(email("buyer@example.com").is_ok());
        assert!(email("not-an-email").is_err());
        assert!(ip_address("203.0.113.9").is_ok());
        assert!(ip_address("2001:db8::1").is_ok());
        assert!(ip_address("999.1.1.1").is_err());
    }

    #[test]
    fn test_provider_id_prefixes() {
        assert!(payment_intent_id("pi_3Abc").is_ok());
        assert!(payment_intent_id("pm_3Abc").is_err());
        assert!(payment_method_id("pm_3Abc").is_ok());
        assert!(payment_method_id("pm_").is_err());
    }
}
