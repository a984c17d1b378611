//! Range checks shared by the section validators.

use std::fmt::Display;

/// Record an error when `value` falls outside `min..=max`.
pub(crate) fn validate_range<T>(errors: &mut Vec<String>, name: &str, value: T, min: T, max: T)
where
    T: PartialOrd + Display + Copy,
{
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
