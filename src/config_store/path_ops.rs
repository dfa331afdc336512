/// Checks if a config key matches a subscription pattern
///
/// Keys are compared segment by segment on `.`; a `*` segment matches any
/// single segment, and a trailing `*` matches everything below it.
///
/// # Arguments
/// * `key` - The actual config key
/// * `pattern` - The pattern to match against (supports "*" as wildcard)
///
/// # Examples
/// * `"db.port"` matches `"db.port"`
/// * `"db.port"` matches `"db.*"`
/// * `"db.port"` matches `"*"`
/// * `"db"` does not match `"db.*"`
pub(crate) fn path_matches(key: &str, pattern: &str) -> bool {
    const WILDCARD: &str = "*";

    if pattern == WILDCARD {
        return true;
    };

    let key_parts: Vec<&str> = key.split('.').collect();
    let pattern_parts: Vec<&str> = pattern.split('.').collect();

    let trailing_wildcard = pattern_parts.last() == Some(&WILDCARD);
    if key_parts.len() < pattern_parts.len()
        || (key_parts.len() > pattern_parts.len() && !trailing_wildcard)
    {
        return false;
    }

    for (key_part, pattern_part) in key_parts.iter().zip(pattern_parts.iter()) {
        if pattern_part == &WILDCARD {
            continue;
        }

        if key_part != pattern_part {
            return false;
        }
    }

    true
}
