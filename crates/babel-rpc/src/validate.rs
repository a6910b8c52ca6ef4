//! Parameter validators used by route wrappers
//!
//! Each validator returns `Err(ValidationError)` describing the first
//! violated constraint. Wrappers turn that into a `BadInput` call error
//! without touching the network.

use std::fmt::{Debug, Display};

use regex::Regex;

use crate::error::ValidationError;

pub type ValidationResult = Result<(), ValidationError>;

pub fn string_validator(
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<&str>,
    value: &str,
) -> ValidationResult {
    let length = value.chars().count();
    if let Some(min) = min_length
        && length < min
    {
        return Err(ValidationError(format!(
            "\"{value}\" must be at least {min} characters"
        )));
    }
    if let Some(max) = max_length
        && length > max
    {
        return Err(ValidationError(format!(
            "\"{value}\" must be at most {max} characters"
        )));
    }
    if let Some(pat) = pattern {
        // Patterns must match the entire input
        let anchored = format!(r"\A(?:{pat})\z");
        let re = Regex::new(&anchored)
            .map_err(|e| ValidationError(format!("invalid pattern \"{pat}\": {e}")))?;
        if !re.is_match(value) {
            return Err(ValidationError(format!(
                "\"{value}\" must match pattern \"{anchored}\""
            )));
        }
    }
    Ok(())
}

pub fn array_validator<T: Debug>(
    min_items: Option<usize>,
    max_items: Option<usize>,
    item_validator: impl Fn(&T) -> ValidationResult,
    value: &[T],
) -> ValidationResult {
    if let Some(min) = min_items
        && value.len() < min
    {
        return Err(ValidationError(format!(
            "{value:?} must have at least {min} items"
        )));
    }
    if let Some(max) = max_items
        && value.len() > max
    {
        return Err(ValidationError(format!(
            "{value:?} must have at most {max} items"
        )));
    }
    value.iter().try_for_each(item_validator)
}

pub fn comparable_validator<T: PartialOrd + Display>(
    min_value: Option<T>,
    max_value: Option<T>,
    value: T,
) -> ValidationResult {
    if let Some(min) = min_value
        && value < min
    {
        return Err(ValidationError(format!("{value} must be at least {min}")));
    }
    if let Some(max) = max_value
        && value > max
    {
        return Err(ValidationError(format!("{value} must be at most {max}")));
    }
    Ok(())
}

pub fn nullable_validator<T>(
    internal_validator: impl Fn(&T) -> ValidationResult,
    value: Option<&T>,
) -> ValidationResult {
    match value {
        Some(v) => internal_validator(v),
        None => Ok(()),
    }
}

pub fn binary_validator(
    min_length: Option<usize>,
    max_length: Option<usize>,
    value: &[u8],
) -> ValidationResult {
    if let Some(min) = min_length
        && value.len() < min
    {
        return Err(ValidationError(format!("value must be at least {min} bytes")));
    }
    if let Some(max) = max_length
        && value.len() > max
    {
        return Err(ValidationError(format!("value must be at most {max} bytes")));
    }
    Ok(())
}
