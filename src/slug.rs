use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    static ref SLUG_RE: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

/// Lower-cases `input` and collapses every run of non-alphanumerics into `-`.
pub fn slugify(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let slug = NON_SLUG.replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "user".to_string()
    } else {
        slug.to_string()
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    slug.len() <= 200 && SLUG_RE.is_match(slug)
}

/// `base`, then `base-1`, `base-2`, ...
pub fn candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}
