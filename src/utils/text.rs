/// Convert a store key into a safe filesystem slug.
pub fn sanitize_store_key(key: &str) -> Option<String> {
    let mut slug = String::new();

    for ch in key.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if matches!(ch, ' ' | '-' | '_' | '.') {
            slug.push(if ch == ' ' || ch == '.' { '_' } else { ch });
        }
    }

    if slug.is_empty() {
        None
    } else {
        Some(slug.to_lowercase())
    }
}
