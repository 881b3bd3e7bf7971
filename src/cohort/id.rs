/// Joins the normalized components of a cohort id
pub const COHORT_ID_DELIMITER: &str = ":";

/// Stands in for a missing component
pub const COHORT_PLACEHOLDER: &str = "unknown";

/// Lowercase, keep `[a-z0-9_]`, fall back to the placeholder when nothing is left
pub fn normalize_component(component: Option<&str>) -> String {
    let normalized: String = component
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    if normalized.is_empty() {
        COHORT_PLACEHOLDER.to_string()
    } else {
        normalized
    }
}

/// Build the stable cohort id for a set of category attributes
pub fn derive_cohort_id(
    platform: Option<&str>,
    city_cluster: Option<&str>,
    spend_tier: Option<&str>,
    frequency_tier: Option<&str>,
) -> String {
    [platform, city_cluster, spend_tier, frequency_tier]
        .into_iter()
        .map(normalize_component)
        .collect::<Vec<_>>()
        .join(COHORT_ID_DELIMITER)
}
