use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL the bucket is reachable at for clients, e.g. the public
    /// MinIO endpoint behind the reverse proxy.
    pub media_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    /// Directory holding the TTF font family used for the shopping list.
    /// The built-in PDF fonts cannot render non-Latin ingredient names.
    pub font_dir: PathBuf,
    pub font_family: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub pdf: PdfConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "foodgram".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "foodgram-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "media".into()),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            media_base_url: std::env::var("MEDIA_BASE_URL")
                .or_else(|_| std::env::var("S3_ENDPOINT"))?,
        };
        let pdf = PdfConfig {
            font_dir: std::env::var("PDF_FONT_DIR")
                .unwrap_or_else(|_| "fonts".into())
                .into(),
            font_family: std::env::var("PDF_FONT_FAMILY")
                .unwrap_or_else(|_| "LiberationSans".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            pdf,
        })
    }
}
