use chrono::Utc;

/// Turn a title into a URL slug: lowercase alphanumerics joined by hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Disambiguate a colliding slug by suffixing the current unix timestamp.
pub fn with_timestamp_suffix(slug: &str) -> String {
    format!("{}-{}", slug, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("How to Reset Your WiFi Password"), "how-to-reset-your-wifi-password");
        assert_eq!(slugify("USB-C vs. Thunderbolt: what's the difference?"), "usb-c-vs-thunderbolt-what-s-the-difference");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  a   b  "), "a-b");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn timestamp_suffix_extends_slug() {
        let suffixed = with_timestamp_suffix("fix-slow-laptop");
        assert!(suffixed.starts_with("fix-slow-laptop-"));
        assert!(suffixed.len() > "fix-slow-laptop-".len());
    }
}
