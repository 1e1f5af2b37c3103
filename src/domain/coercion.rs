//! Scalar coercions for values the charger reports as strings.

use crate::shared::CoercionError;

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "on", "enable", "enabled"];
const FALSE_WORDS: &[&str] = &["false", "0", "no", "off", "disable", "disabled"];

/// Parse a finite floating point number. Surrounding whitespace is ignored.
pub fn to_f64(raw: &str) -> Result<f64, CoercionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoercionError::Missing);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CoercionError::NotANumber {
            value: raw.to_string(),
        }),
    }
}

/// Parse an integer. `"16.0"` is accepted, `"16.5"` is not.
pub fn to_i64(raw: &str) -> Result<i64, CoercionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoercionError::Missing);
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(CoercionError::NotAnInteger {
            value: raw.to_string(),
        }),
    }
}

/// Parse a boolean from the set of words chargers use for flags.
pub fn to_bool(raw: &str) -> Result<bool, CoercionError> {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(CoercionError::Missing);
    }
    if TRUE_WORDS.contains(&lowered.as_str()) {
        Ok(true)
    } else if FALSE_WORDS.contains(&lowered.as_str()) {
        Ok(false)
    } else {
        Err(CoercionError::NotABoolean {
            value: raw.to_string(),
        })
    }
}

/// Assign `value` to `slot` if it differs. Returns whether anything changed.
pub fn set_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(to_f64("16.5"), Ok(16.5));
        assert_eq!(to_f64(" 230 "), Ok(230.0));
        assert!(matches!(to_f64("not-a-number"), Err(CoercionError::NotANumber { .. })));
        assert!(matches!(to_f64("NaN"), Err(CoercionError::NotANumber { .. })));
        assert_eq!(to_f64(""), Err(CoercionError::Missing));
    }

    #[test]
    fn integers() {
        assert_eq!(to_i64("3"), Ok(3));
        assert_eq!(to_i64("16.0"), Ok(16));
        assert!(matches!(to_i64("16.5"), Err(CoercionError::NotAnInteger { .. })));
    }

    #[test]
    fn booleans() {
        assert_eq!(to_bool("TRUE"), Ok(true));
        assert_eq!(to_bool("1"), Ok(true));
        assert_eq!(to_bool("Disabled"), Ok(false));
        assert!(matches!(to_bool("maybe"), Err(CoercionError::NotABoolean { .. })));
    }

    #[test]
    fn set_if_changed_reports_diff() {
        let mut slot = None;
        assert!(set_if_changed(&mut slot, 1.0));
        assert!(!set_if_changed(&mut slot, 1.0));
        assert!(set_if_changed(&mut slot, 2.0));
        assert_eq!(slot, Some(2.0));
    }
}
