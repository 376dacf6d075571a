//! Topic filter matching.
//!
//! Implements the MQTT 3.1.1 wildcard rules for subscription filters: `+`
//! matches exactly one topic level, `#` matches the remainder of the name and
//! must be the last level of the filter. Filter syntax is assumed to have
//! been validated at registration time.

/// Returns whether `filter` matches the topic `name`.
///
/// Both strings are walked one `/`-separated level at a time. A `+` level
/// consumes exactly one level of the name (which may be empty); a `#` level
/// consumes everything that remains, provided at least one level remains;
/// any other level must match literally. The match succeeds only when filter
/// and name are exhausted together.
pub fn matches(filter: &str, name: &str) -> bool {
    if filter == name {
        return true;
    }

    let mut filter_levels = filter.split('/');
    let mut name_levels = name.split('/');

    loop {
        match (filter_levels.next(), name_levels.next()) {
            (Some("#"), Some(_)) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(n)) if f == n => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
