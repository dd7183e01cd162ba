//! Request body validation. Each validator returns the normalized input or the first
//! rule it breaks as a user-facing message.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::*;
use crate::core::images::decode;

fn image_ref_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(https?://\S+|data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/=]+)$")
            .expect("Regex should compile")
    })
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile")
    })
}

fn link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^https?://\S+$").expect("Regex should compile"))
}

pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An `http(s)` URL, or a `data:image` URI whose base64 payload actually decodes.
pub fn is_image_ref(value: &str) -> bool {
    image_ref_regex().is_match(value) && (!value.starts_with("data:") || decode(value).is_ok())
}

pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value)
}

pub fn is_link(value: &str) -> bool {
    link_regex().is_match(value)
}

#[derive(Debug, Default, Deserialize)]
pub struct PostInput {
    pub text: Option<String>,
    pub img: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct ValidPost {
    pub text: Option<String>,
    pub img: Option<String>,
}

pub fn validate_post_input(input: &PostInput) -> Result<ValidPost, String> {
    let text = non_empty(input.text.as_deref());
    let img = non_empty(input.img.as_deref());

    if text.is_none() && img.is_none() {
        return Err("Post must have text or image".to_string());
    }
    if let Some(text) = &text {
        if text.chars().count() > MAX_POST_LENGTH {
            return Err(format!("Post text must be at most {MAX_POST_LENGTH} characters"));
        }
    }
    if let Some(img) = &img {
        if !is_image_ref(img) {
            return Err("Image must be a valid URI".to_string());
        }
    }

    Ok(ValidPost { text, img })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupInput {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct ValidSignup {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(format!(
            "Username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        ));
    }
    if username.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err("Username must not contain spaces or slashes".to_string());
    }
    Ok(())
}

pub fn validate_full_name(full_name: &str) -> Result<(), String> {
    if full_name.chars().count() < MIN_FULL_NAME_LENGTH {
        return Err(format!(
            "Full name must be at least {MIN_FULL_NAME_LENGTH} characters"
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    Ok(())
}

pub fn validate_signup(input: &SignupInput) -> Result<ValidSignup, String> {
    let full_name = non_empty(input.full_name.as_deref()).ok_or("Full name is required")?;
    let username = non_empty(input.username.as_deref()).ok_or("Username is required")?;
    let email = non_empty(input.email.as_deref()).ok_or("Email is required")?;
    // passwords are not trimmed
    let password = input
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or("Password is required")?;

    validate_full_name(&full_name)?;
    validate_username(&username)?;
    if !is_email(&email) {
        return Err("Invalid email format".to_string());
    }
    validate_password(&password)?;

    Ok(ValidSignup {
        full_name,
        username,
        email,
        password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: Option<&str>, img: Option<&str>) -> PostInput {
        PostInput {
            text: text.map(String::from),
            img: img.map(String::from),
        }
    }

    #[test]
    fn post_requires_text_or_image() {
        assert!(validate_post_input(&post(None, None)).is_err());
        assert!(validate_post_input(&post(Some("  "), Some(""))).is_err());
        assert_eq!(
            validate_post_input(&post(Some(" hi "), None)).unwrap(),
            ValidPost { text: Some("hi".into()), img: None }
        );
        assert!(validate_post_input(&post(None, Some("https://cdn.example.com/a.png"))).is_ok());
    }

    #[test]
    fn post_image_must_be_uri() {
        assert!(validate_post_input(&post(None, Some("not a uri"))).is_err());
        assert!(validate_post_input(&post(None, Some("data:image/png;base64,iVBORw0KGgo="))).is_ok());
    }

    #[test]
    fn undecodable_data_uri_is_rejected() {
        assert!(!is_image_ref("data:image/png;base64,abcde"));
        assert_eq!(
            validate_post_input(&post(None, Some("data:image/png;base64,abcde"))).unwrap_err(),
            "Image must be a valid URI"
        );
    }

    #[test]
    fn post_text_length_is_capped() {
        let long = "a".repeat(MAX_POST_LENGTH + 1);
        assert!(validate_post_input(&post(Some(&long), None)).is_err());
    }

    #[test]
    fn signup_rules() {
        let ok = SignupInput {
            full_name: Some("Alice Liddell".into()),
            username: Some("alice".into()),
            email: Some("alice@example.com".into()),
            password: Some("secret1".into()),
        };
        assert!(validate_signup(&ok).is_ok());

        let short_pw = SignupInput { password: Some("abc".into()), ..ok_clone(&ok) };
        assert!(validate_signup(&short_pw).unwrap_err().contains("Password"));

        let bad_email = SignupInput { email: Some("alice-at-example".into()), ..ok_clone(&ok) };
        assert_eq!(validate_signup(&bad_email).unwrap_err(), "Invalid email format");

        let short_name = SignupInput { username: Some("al".into()), ..ok_clone(&ok) };
        assert!(validate_signup(&short_name).unwrap_err().contains("Username"));
    }

    fn ok_clone(input: &SignupInput) -> SignupInput {
        SignupInput {
            full_name: input.full_name.clone(),
            username: input.username.clone(),
            email: input.email.clone(),
            password: input.password.clone(),
        }
    }
}
