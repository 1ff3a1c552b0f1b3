//! Profile-based inclusion of blueprint items.
//!
//! A profile is a bare tag. Items with no tags are base items and are always
//! included; `"all"` in the active set includes everything.

/// Active profile that matches every item.
pub const ALL_PROFILES: &str = "all";

/// Anything that carries profile tags.
pub trait Profiled {
    /// Profile tags declared on the item.
    fn profiles(&self) -> &[String];
}

/// Whether an item tagged with `item_profiles` is included for `active`.
///
/// Includes base items, everything when no profiles are active, everything
/// when `"all"` is active, and otherwise items sharing at least one tag.
#[must_use]
pub fn should_include(item_profiles: &[String], active: &[String]) -> bool {
    if item_profiles.is_empty() || active.is_empty() {
        return true;
    }
    if active.iter().any(|p| p == ALL_PROFILES) {
        return true;
    }
    item_profiles.iter().any(|p| active.contains(p))
}

/// Keep the items included for `active`, preserving order.
#[must_use]
pub fn filter_by_profiles<T: Profiled>(items: Vec<T>, active: &[String]) -> Vec<T> {
    if active.is_empty() || active.iter().any(|p| p == ALL_PROFILES) {
        return items;
    }
    items
        .into_iter()
        .filter(|item| should_include(item.profiles(), active))
        .collect()
}

/// Distinct non-empty profile tags across `items`, sorted ascending.
#[must_use]
pub fn unique_profiles<'a, T, I>(items: I) -> Vec<String>
where
    T: Profiled + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let set: std::collections::BTreeSet<&str> = items
        .into_iter()
        .flat_map(|item| item.profiles().iter())
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .collect();
    set.into_iter().map(String::from).collect()
}

/// Active profiles that are not declared anywhere in `available`.
///
/// `"all"` is never reported.
#[must_use]
pub fn validate_profiles(active: &[String], available: &[String]) -> Vec<String> {
    active
        .iter()
        .filter(|p| p.as_str() != ALL_PROFILES && !available.contains(p))
        .cloned()
        .collect()
}

/// Split comma-separated `--profile` values into a trimmed, non-empty list.
#[must_use]
pub fn parse_active(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
