use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use html_escape::{decode_html_entities, encode_double_quoted_attribute};
use rand::rngs::OsRng;
use regex::Regex;
use uuid::Uuid;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Plain text only: every tag is stripped and the entities ammonia escapes on output
/// are decoded again, so `a < b & c` is stored as typed. Clients render it as text.
pub fn sanitize_text(text: &str) -> String {
    let stripped = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();
    decode_html_entities(&stripped).into_owned()
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<]+").expect("Regex should compile"))
}

/// Post bodies keep safe markup and get bare URLs turned into links.
pub fn filter_post_content(content: &str) -> String {
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // ammonia leaves existing anchors intact; only rewrite text without one
    if clean.contains("<a ") {
        return clean;
    }

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[0];
            let escaped_url = encode_double_quoted_attribute(url);
            format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn sanitize_strips_tags() {
        assert_eq!(sanitize_text("<b>hi</b><script>x()</script>"), "hi");
    }

    #[test]
    fn sanitize_keeps_plain_text_verbatim() {
        assert_eq!(sanitize_text("a < b & c"), "a < b & c");
        assert_eq!(sanitize_text("fish & <i>chips</i>"), "fish & chips");
    }

    #[test]
    fn post_content_links_urls() {
        let out = filter_post_content("see https://example.com/a now");
        assert!(out.contains(r#"<a href="https://example.com/a" target="_blank">"#));
        assert!(!filter_post_content("<script>alert(1)</script>ok").contains("script"));
    }

    #[test]
    fn uuid_validation() {
        assert!(validate_uuid(&new_id()));
        assert!(!validate_uuid("nope"));
    }
}
