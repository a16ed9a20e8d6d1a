use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_hours: i64,
    pub refresh_token_ttl_days: i64,
    pub cors_origin: String,
    pub image_host_url: Option<String>,
    pub image_host_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let refresh_token_secret = env::var("REFRESH_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("REFRESH_TOKEN_SECRET is not set"))?;
        let access_token_ttl_hours = env::var("ACCESS_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);
        let refresh_token_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);
        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let image_host_url = env::var("IMAGE_HOST_URL").ok().filter(|v| !v.is_empty());
        let image_host_api_key = env::var("IMAGE_HOST_API_KEY").ok().filter(|v| !v.is_empty());

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            refresh_token_secret,
            access_token_ttl_hours,
            refresh_token_ttl_days,
            cors_origin,
            image_host_url,
            image_host_api_key,
        })
    }
}
