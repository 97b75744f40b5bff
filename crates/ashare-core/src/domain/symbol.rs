use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const CODE_LEN: usize = 6;

/// Exchange a canonical code is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Shanghai,
    Shenzhen,
}

impl Market {
    /// Two-letter tag used in prefixed/suffixed spellings (`sz000001`, `000001.SZ`).
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SH" | "SS" => Some(Self::Shanghai),
            "SZ" => Some(Self::Shenzhen),
            _ => None,
        }
    }

    fn infer(code: &str) -> Option<Self> {
        match code.as_bytes().first() {
            Some(b'6') => Some(Self::Shanghai),
            Some(b'0') | Some(b'3') => Some(Self::Shenzhen),
            _ => None,
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Canonical A-share symbol: a 6-digit code plus its market.
///
/// Accepted spellings cover the formats seen in the wild: bare codes
/// (`000001`, padded from 5 digits when needed), market-prefixed codes
/// (`sz000001`), and suffixed codes (`000001.SZ`, `600000.SS`). Parsing is
/// pure and idempotent: the canonical display form always re-parses to the
/// same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    code: String,
    market: Market,
}

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let spelled = trimmed.to_ascii_uppercase();
        let mut body = spelled.as_str();
        let mut explicit: Option<Market> = None;

        if let Some((head, tag)) = body.rsplit_once('.') {
            let market = Market::from_tag(tag).ok_or_else(|| ValidationError::UnknownMarketTag {
                value: spelled.clone(),
                tag: tag.to_owned(),
            })?;
            explicit = Some(market);
            body = head;
        }

        // Both tag bytes must be ASCII before splitting; a multi-byte
        // character at position 1 would land the split mid-character.
        if body.len() >= 2 && body.as_bytes()[..2].iter().all(u8::is_ascii_alphabetic) {
            let (tag, rest) = body.split_at(2);
            let market = Market::from_tag(tag).ok_or_else(|| ValidationError::UnknownMarketTag {
                value: spelled.clone(),
                tag: tag.to_owned(),
            })?;
            if explicit.is_some_and(|suffix| suffix != market) {
                return Err(ValidationError::MarketMismatch {
                    value: spelled.clone(),
                });
            }
            explicit = Some(market);
            body = rest;
        }

        let numeric = (5..=CODE_LEN).contains(&body.len())
            && body.bytes().all(|byte| byte.is_ascii_digit());
        if !numeric {
            return Err(ValidationError::SymbolNotNumeric {
                value: spelled.clone(),
            });
        }

        let code = format!("{body:0>width$}", width = CODE_LEN);
        let inferred = Market::infer(&code);

        let market = match (explicit, inferred) {
            (Some(explicit), Some(inferred)) if explicit != inferred => {
                return Err(ValidationError::MarketMismatch { value: spelled });
            }
            (Some(market), _) => market,
            (None, Some(market)) => market,
            (None, None) => return Err(ValidationError::UnknownMarket { value: code }),
        };

        Ok(Self { code, market })
    }

    /// The 6-digit numeric code.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn market(&self) -> Market {
        self.market
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.code, self.market.tag())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.to_string()
    }
}
