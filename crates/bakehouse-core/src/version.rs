use semver::Version;

/// Manifest versions are free-form ("1.0", "v2.3.1", "0.9"). Pad missing
/// components and strip a leading 'v' so ordinary tags order correctly;
/// callers fall back to string comparison when this returns `None`.
pub fn parse_loose_version(input: &str) -> Option<Version> {
    let trimmed = input.trim().trim_start_matches(['v', 'V']);
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let dots = trimmed.split('.').count();
    if dots >= 3 {
        return None;
    }

    let mut padded = trimmed.to_string();
    for _ in dots..3 {
        padded.push_str(".0");
    }
    Version::parse(&padded).ok()
}
