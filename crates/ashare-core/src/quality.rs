//! Post-fetch validation of provider payloads.
//!
//! A provider call that "succeeds" with implausible numbers is worth no more
//! than a failed one: the gate rejects such payloads before they are cached
//! or returned, and the unified source fails over to the next provider.

use crate::{Bar, Quote, ValidationError};

fn check_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

/// Accept or reject a realtime quote.
pub fn check_quote(quote: &Quote) -> Result<(), ValidationError> {
    check_positive("price", quote.price)?;
    check_positive("open", quote.open)?;
    check_positive("high", quote.high)?;
    check_positive("low", quote.low)?;
    check_positive("pre_close", quote.pre_close)?;
    check_finite("change", quote.change)?;
    check_finite("change_percent", quote.change_percent)?;
    check_non_negative("amount", quote.amount)?;

    if quote.high < quote.low {
        return Err(ValidationError::InvalidQuoteRange);
    }

    Ok(())
}

/// Accept or reject a history series: every bar plausible, dates strictly
/// ascending, no duplicates, series non-empty.
pub fn check_bars(bars: &[Bar]) -> Result<(), ValidationError> {
    if bars.is_empty() {
        return Err(ValidationError::EmptyHistory);
    }

    for (index, bar) in bars.iter().enumerate() {
        check_positive("open", bar.open)?;
        check_positive("high", bar.high)?;
        check_positive("low", bar.low)?;
        check_positive("close", bar.close)?;
        check_non_negative("amount", bar.amount)?;

        if bar.high < bar.low {
            return Err(ValidationError::InvalidBarRange);
        }

        if index > 0 {
            let previous = &bars[index - 1];
            if bar.date == previous.date {
                return Err(ValidationError::DuplicateBarDate { date: bar.date });
            }
            if bar.date < previous.date {
                return Err(ValidationError::UnsortedBars { index });
            }
        }
    }

    Ok(())
}
