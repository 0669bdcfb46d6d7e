use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// When set, a user with this name is created at startup if missing.
    pub bootstrap_user: Option<String>,
    /// Lets create and add-slot requests start in the past.
    pub allow_past_slots: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            bootstrap_user: env::var("BOOTSTRAP_USER").ok().filter(|v| !v.is_empty()),
            allow_past_slots: env::var("ALLOW_PAST_SLOTS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
