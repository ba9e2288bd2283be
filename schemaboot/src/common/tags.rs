use std::collections::BTreeSet;

/// Splits a comma separated tag list into trimmed, non-empty tags.
///
/// Used for changeset contexts and labels, where `"dev, test,,"` means the
/// two tags `dev` and `test`.
pub fn split_tags(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// Collects every tag of every value into a fresh set.
pub fn collect_tags<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = BTreeSet::new();
    for value in values {
        tags.extend(split_tags(value.as_ref()));
    }
    tags
}
