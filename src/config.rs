use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const MAX_POST_LENGTH: usize = 5000;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MIN_FULL_NAME_LENGTH: usize = 3;
pub const MAX_BIO_LENGTH: usize = 500;
pub const SUGGESTED_USERS_LIMIT: usize = 4;

pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn notification_key(notification_id: &str) -> String {
    format!("notification:{}", notification_id)
}

pub fn notifications_key(user_id: &str) -> String {
    format!("notifications:{}", user_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn tokens_key(user_id: &str) -> String {
    format!("tokens:{}", user_id)
}

pub fn image_key(image_id: &str) -> String {
    format!("image:{}", image_id)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub token_expiration_hours: i64,
    pub seed_demo_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            token_expiration_hours: 24,
            seed_demo_data: false,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("CHIRP_HOST").unwrap_or_else(|_| {
                info!("CHIRP_HOST not set, using default: {}", defaults.host);
                defaults.host
            }),
            port: try_load("CHIRP_PORT", defaults.port),
            token_expiration_hours: try_load(
                "CHIRP_TOKEN_EXPIRATION_HOURS",
                defaults.token_expiration_hours,
            ),
            seed_demo_data: try_load("CHIRP_SEED_DEMO_DATA", defaults.seed_demo_data),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(user_key("42"), "user:42");
        assert_eq!(post_key("7"), "post:7");
        assert_eq!(email_key("Alice@Example.com"), "email:alice@example.com");
    }

    #[test]
    fn unparsable_values_fall_back_to_default() {
        std::env::set_var("CHIRP_TEST_BAD_PORT", "not-a-port");
        assert_eq!(try_load::<u16>("CHIRP_TEST_BAD_PORT", 8080), 8080);
        std::env::set_var("CHIRP_TEST_GOOD_PORT", "9000");
        assert_eq!(try_load::<u16>("CHIRP_TEST_GOOD_PORT", 8080), 9000);
    }
}
