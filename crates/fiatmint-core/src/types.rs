use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Longest payment reference accepted from a bank or payment processor.
pub const MAX_REFERENCE_LEN: usize = 128;

/// Bank-side identifier of a fiat payment. Unique per mint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Validate and wrap a payment reference. Surrounding whitespace is trimmed.
    pub fn new(reference: &str) -> Result<Self, CoreError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidReference(
                "payment reference is required".into(),
            ));
        }
        if trimmed.len() > MAX_REFERENCE_LEN {
            return Err(CoreError::InvalidReference(format!(
                "longer than {} characters",
                MAX_REFERENCE_LEN
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
            return Err(CoreError::InvalidReference(
                "only printable ASCII characters are allowed".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentReference {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PaymentReference> for String {
    fn from(value: PaymentReference) -> Self {
        value.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 20-byte EVM account that receives released tokens.
///
/// Accepts 40 hex characters with an optional `0x` prefix. Mixed-case input
/// must carry a valid EIP-55 checksum. Displayed in checksummed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipientAddress(Address);

impl RecipientAddress {
    pub fn address(&self) -> Address {
        self.0
    }
}

impl FromStr for RecipientAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes)
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        let address = Address::from(bytes);

        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            Address::parse_checksummed(format!("0x{}", body), None)
                .map_err(|_| CoreError::InvalidAddress(format!("{}: bad checksum", s)))?;
        }

        if address == Address::ZERO {
            return Err(CoreError::InvalidAddress("zero address".into()));
        }

        Ok(Self(address))
    }
}

impl TryFrom<String> for RecipientAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecipientAddress> for String {
    fn from(value: RecipientAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_checksum(None))
    }
}

/// A strictly positive fiat amount, expressed in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiatAmount(Decimal);

impl FiatAmount {
    /// Validate an amount against the currency's minor units (e.g. 2 for cents).
    pub fn new(value: Decimal, minor_units: u32) -> Result<Self, CoreError> {
        if value <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "{} is not a positive amount",
                value
            )));
        }
        let normalized = value.normalize();
        if normalized.scale() > minor_units {
            return Err(CoreError::InvalidAmount(format!(
                "{} has more than {} fractional digits",
                value, minor_units
            )));
        }
        Ok(Self(normalized))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Scale to the token's smallest unit: `amount * 10^decimals`, truncated.
    pub fn to_raw_units(&self, decimals: u8) -> Result<u128, CoreError> {
        let overflow = || CoreError::AmountOverflow { decimals };
        let mantissa = u128::try_from(self.0.mantissa()).map_err(|_| overflow())?;
        let scale = self.0.scale();
        let decimals_u32 = u32::from(decimals);

        if decimals_u32 >= scale {
            let factor = 10u128
                .checked_pow(decimals_u32 - scale)
                .ok_or_else(overflow)?;
            mantissa.checked_mul(factor).ok_or_else(overflow)
        } else {
            let divisor = 10u128
                .checked_pow(scale - decimals_u32)
                .ok_or_else(overflow)?;
            Ok(mantissa / divisor)
        }
    }
}

impl fmt::Display for FiatAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated request to mint tokens for a settled fiat payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub payment_reference: PaymentReference,
    pub amount: FiatAmount,
    pub recipient: RecipientAddress,
}

impl MintRequest {
    /// Validate raw inbound fields. Checks amount, then address, then reference.
    pub fn new(
        payment_reference: &str,
        amount: Decimal,
        recipient: &str,
        minor_units: u32,
    ) -> Result<Self, CoreError> {
        let amount = FiatAmount::new(amount, minor_units)?;
        let recipient = recipient.parse()?;
        let payment_reference = PaymentReference::new(payment_reference)?;
        Ok(Self {
            payment_reference,
            amount,
            recipient,
        })
    }
}
