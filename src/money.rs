// src/money.rs

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// Why a present monetary string could not be turned into an amount.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("'{0}' is negative")]
    Negative(String),

    #[error("'{0}' is too large to keep two decimal places")]
    OutOfRange(String),
}

/// Standard NFS-e convention: `.` groups thousands, `,` is the decimal mark.
pub fn try_parse_standard_amount(raw: &str) -> Result<Decimal, AmountError> {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    to_amount(raw, &normalized)
}

/// The INSS field is written with `.` as the decimal mark; stray commas are dropped.
pub fn try_parse_social_contribution_amount(raw: &str) -> Result<Decimal, AmountError> {
    let normalized = raw.trim().replace(',', "");
    to_amount(raw, &normalized)
}

/// Tolerant variant: anything unparsable becomes `0.00`.
pub fn parse_standard_amount(raw: &str) -> Decimal {
    try_parse_standard_amount(raw).unwrap_or_else(|_| zero())
}

/// Tolerant variant: anything unparsable becomes `0.00`.
pub fn parse_social_contribution_amount(raw: &str) -> Decimal {
    try_parse_social_contribution_amount(raw).unwrap_or_else(|_| zero())
}

/// Which decimal convention a monetary field is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountConvention {
    Standard,
    SocialContribution,
}

impl AmountConvention {
    pub fn try_parse(self, raw: &str) -> Result<Decimal, AmountError> {
        match self {
            AmountConvention::Standard => try_parse_standard_amount(raw),
            AmountConvention::SocialContribution => try_parse_social_contribution_amount(raw),
        }
    }

    pub fn parse(self, raw: &str) -> Decimal {
        match self {
            AmountConvention::Standard => parse_standard_amount(raw),
            AmountConvention::SocialContribution => parse_social_contribution_amount(raw),
        }
    }
}

/// `0.00` with the two fractional digits every stored amount carries.
pub fn zero() -> Decimal {
    Decimal::new(0, 2)
}

fn to_amount(raw: &str, normalized: &str) -> Result<Decimal, AmountError> {
    if normalized.is_empty() {
        return Err(AmountError::Empty);
    }
    let value = Decimal::from_str(normalized)
        .map_err(|_| AmountError::NotANumber(raw.to_string()))?;
    if value.is_zero() {
        return Ok(zero());
    }
    if value.is_sign_negative() {
        return Err(AmountError::Negative(raw.to_string()));
    }
    let mut value = value.round_dp(2);
    value.rescale(2);
    if value.scale() != 2 {
        return Err(AmountError::OutOfRange(raw.to_string()));
    }
    Ok(value)
}

/// Explicit currency layout used by every report renderer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CurrencyFormat {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_thousands_separator")]
    pub thousands_separator: String,
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: String,
}

fn default_symbol() -> String {
    "R$".to_string()
}

fn default_thousands_separator() -> String {
    ".".to_string()
}

fn default_decimal_separator() -> String {
    ",".to_string()
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::brl()
    }
}

impl CurrencyFormat {
    /// Brazilian real: `R$ 1.234,56`
    pub fn brl() -> Self {
        Self {
            symbol: default_symbol(),
            thousands_separator: default_thousands_separator(),
            decimal_separator: default_decimal_separator(),
        }
    }

    pub fn format(&self, amount: Decimal) -> String {
        let rounded = amount.round_dp(2);
        let digits = format!("{:.2}", rounded.abs());
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(ch);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        format!(
            "{sign}{} {grouped}{}{frac_part}",
            self.symbol, self.decimal_separator
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_standard_amount() {
        assert_eq!(parse_standard_amount("1.234,56"), dec("1234.56"));
        assert_eq!(parse_standard_amount("15,00"), dec("15.00"));
        assert_eq!(parse_standard_amount("1.000.000,10"), dec("1000000.10"));
        assert_eq!(parse_standard_amount("0"), dec("0.00"));
    }

    #[test]
    fn test_standard_amount_tolerates_garbage() {
        assert_eq!(parse_standard_amount(""), dec("0.00"));
        assert_eq!(parse_standard_amount("abc"), dec("0.00"));
        assert_eq!(parse_standard_amount("12,34,56"), dec("0.00"));
        assert_eq!(parse_standard_amount("-5,00"), dec("0.00"));
    }

    #[test]
    fn test_social_contribution_amount() {
        assert_eq!(parse_social_contribution_amount("123.45"), dec("123.45"));
        assert_eq!(parse_social_contribution_amount("1,234.56"), dec("1234.56"));
        assert_eq!(parse_social_contribution_amount(""), dec("0.00"));
        assert_eq!(parse_social_contribution_amount("1.2.3"), dec("0.00"));
    }

    #[test]
    fn test_strict_errors() {
        assert_eq!(try_parse_standard_amount("  "), Err(AmountError::Empty));
        assert!(matches!(
            try_parse_standard_amount("R$ 10"),
            Err(AmountError::NotANumber(_))
        ));
        assert!(matches!(
            try_parse_social_contribution_amount("-1.00"),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn test_oversized_amount_is_rejected() {
        let huge = "50.000.000.000.000.000.000.000.000.000,00";
        assert_eq!(
            try_parse_standard_amount(huge),
            Err(AmountError::OutOfRange(huge.to_string()))
        );
        assert_eq!(parse_standard_amount(huge), dec("0.00"));
        assert!(try_parse_standard_amount("790.000.000.000.000.000.000.000.000,00").is_ok());
    }

    #[test]
    fn test_amounts_carry_two_digits() {
        assert_eq!(parse_standard_amount("7").to_string(), "7.00");
        assert_eq!(parse_social_contribution_amount("1.005").to_string(), "1.00");
        assert_eq!(zero().to_string(), "0.00");
    }

    #[test]
    fn test_brl_format() {
        let brl = CurrencyFormat::brl();
        assert_eq!(brl.format(dec("1234.56")), "R$ 1.234,56");
        assert_eq!(brl.format(dec("0")), "R$ 0,00");
        assert_eq!(brl.format(dec("999.9")), "R$ 999,90");
        assert_eq!(brl.format(dec("1234567.891")), "R$ 1.234.567,89");
        assert_eq!(brl.format(dec("-10.5")), "-R$ 10,50");
    }

    #[test]
    fn test_custom_format() {
        let usd = CurrencyFormat {
            symbol: "US$".to_string(),
            thousands_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
        };
        assert_eq!(usd.format(dec("1234.5")), "US$ 1,234.50");
    }
}
