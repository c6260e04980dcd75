/// Normalize a user-provided identifier (game title, save slot) into a filesystem-safe slug.
pub fn sanitize_slug(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "game".to_string();
    }

    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else if ch == '-' || ch == '_' {
            if !slug.is_empty() {
                slug.push(ch);
            }
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    let trimmed = slug.trim_matches(&['-', '_'][..]).to_string();
    if trimmed.is_empty() { "game".to_string() } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(sanitize_slug("  Carrot Quest #2 "), "carrot-quest-2");
        assert_eq!(sanitize_slug("--save_01"), "save_01");
        assert_eq!(sanitize_slug("???"), "game");
        assert_eq!(sanitize_slug(""), "game");
    }
}
