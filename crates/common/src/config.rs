use serde::Deserialize;

/// Default icon and badge shown by web-push clients.
pub const DEFAULT_PUSH_ICON_URL: &str = "https://i.imgur.com/7D8u8h6.png";

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Raw service-account JSON used for both the database and FCM
    pub service_account_json: String,

    /// Realtime Database base URL (e.g. `https://<project>.firebasedatabase.app`)
    pub database_url: String,

    /// HTTP listen port (default: 3000)
    pub port: u16,

    /// Public base URL of this relay, used only for keep-alive self-pings
    pub public_url: Option<String>,

    /// Keep-alive ping interval in seconds (default: 840 = 14 minutes)
    pub keepalive_interval_secs: u64,

    /// Icon and badge URL attached to web-push notifications
    pub push_icon_url: String,

    /// Product name used in the fallback title and the liveness text
    pub app_name: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            service_account_json: std::env::var("FIREBASE_SERVICE_ACCOUNT").map_err(|_| {
                anyhow::anyhow!("FIREBASE_SERVICE_ACCOUNT environment variable is required")
            })?,
            database_url: std::env::var("FIREBASE_DATABASE_URL")
                .map_err(|_| {
                    anyhow::anyhow!("FIREBASE_DATABASE_URL environment variable is required")
                })?
                .trim_end_matches('/')
                .to_string(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid u16"))?,
            public_url: std::env::var("RELAY_PUBLIC_URL")
                .or_else(|_| std::env::var("RENDER_URL"))
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(|url| url.trim_end_matches('/').to_string()),
            keepalive_interval_secs: std::env::var("KEEPALIVE_INTERVAL_SECS")
                .unwrap_or_else(|_| "840".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("KEEPALIVE_INTERVAL_SECS must be a valid u64"))?,
            push_icon_url: std::env::var("PUSH_ICON_URL")
                .unwrap_or_else(|_| DEFAULT_PUSH_ICON_URL.to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Radio Bingo Live".to_string()),
        })
    }
}
