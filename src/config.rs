use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

const DEFAULT_PORT: u16 = 8091;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;
const DEFAULT_MAX_THUMBNAIL_BYTES: u64 = 10 << 20;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Local directory for thumbnails, served under `/assets`.
    pub assets_root: PathBuf,
    /// Directory for request-scoped upload buffers.
    pub staging_dir: PathBuf,
    /// Externally reachable base URL used to build asset links.
    pub public_base_url: String,
    pub max_upload_bytes: u64,
    pub max_thumbnail_bytes: u64,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub jwt_secret: String,
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("assets_root", &self.assets_root)
            .field("staging_dir", &self.staging_dir)
            .field("public_base_url", &self.public_base_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_thumbnail_bytes", &self.max_thumbnail_bytes)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("jwt_secret", &"<redacted>")
            .field("ffprobe_path", &self.ffprobe_path)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video and thumbnail ingestion service")]
pub struct Args {
    /// Host to bind to (overrides REELHOUSE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides REELHOUSE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides REELHOUSE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for locally served assets (overrides REELHOUSE_ASSETS_ROOT)
    #[arg(long)]
    pub assets_root: Option<PathBuf>,

    /// Directory for temporary upload files (overrides REELHOUSE_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Base URL clients use to reach this server (overrides REELHOUSE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Maximum video upload size in bytes (overrides REELHOUSE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Maximum thumbnail size in bytes (overrides REELHOUSE_MAX_THUMBNAIL_BYTES)
    #[arg(long)]
    pub max_thumbnail_bytes: Option<u64>,

    /// Bucket receiving processed videos (overrides REELHOUSE_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Bucket region (overrides REELHOUSE_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom endpoint for S3-compatible storage (overrides REELHOUSE_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// ffprobe executable (overrides REELHOUSE_FFPROBE)
    #[arg(long)]
    pub ffprobe: Option<String>,

    /// ffmpeg executable (overrides REELHOUSE_FFMPEG)
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read and parse an optional environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over `REELHOUSE_*` environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let port = match args.port {
            Some(port) => port,
            None => env_parse("REELHOUSE_PORT")?.unwrap_or(DEFAULT_PORT),
        };

        let max_upload_bytes = match args.max_upload_bytes {
            Some(v) => v,
            None => env_parse("REELHOUSE_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };
        let max_thumbnail_bytes = match args.max_thumbnail_bytes {
            Some(v) => v,
            None => env_parse("REELHOUSE_MAX_THUMBNAIL_BYTES")?
                .unwrap_or(DEFAULT_MAX_THUMBNAIL_BYTES),
        };
        if max_upload_bytes == 0 || max_thumbnail_bytes == 0 {
            bail!("upload size limits must be greater than zero");
        }

        let jwt_secret = env::var("REELHOUSE_JWT_SECRET")
            .context("REELHOUSE_JWT_SECRET must be set")?;
        if jwt_secret.is_empty() {
            bail!("REELHOUSE_JWT_SECRET must not be empty");
        }

        let s3_bucket = args
            .s3_bucket
            .or_else(|| env::var("REELHOUSE_S3_BUCKET").ok())
            .context("an S3 bucket is required (--s3-bucket or REELHOUSE_S3_BUCKET)")?;

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env::var("REELHOUSE_HOST").unwrap_or_else(|_| "0.0.0.0".into())),
            port,
            database_url: args.database_url.unwrap_or_else(|| {
                env::var("REELHOUSE_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://./data/reelhouse.db".into())
            }),
            assets_root: args.assets_root.unwrap_or_else(|| {
                env::var("REELHOUSE_ASSETS_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./assets"))
            }),
            staging_dir: args.staging_dir.unwrap_or_else(|| {
                env::var("REELHOUSE_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| env::temp_dir())
            }),
            public_base_url: args.public_base_url.unwrap_or_else(|| {
                env::var("REELHOUSE_PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| format!("http://localhost:{}", port))
            }),
            max_upload_bytes,
            max_thumbnail_bytes,
            s3_bucket,
            s3_region: args.s3_region.unwrap_or_else(|| {
                env::var("REELHOUSE_S3_REGION").unwrap_or_else(|_| "us-east-1".into())
            }),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| env::var("REELHOUSE_S3_ENDPOINT").ok()),
            jwt_secret,
            ffprobe_path: args
                .ffprobe
                .unwrap_or_else(|| env::var("REELHOUSE_FFPROBE").unwrap_or_else(|_| "ffprobe".into())),
            ffmpeg_path: args
                .ffmpeg
                .unwrap_or_else(|| env::var("REELHOUSE_FFMPEG").unwrap_or_else(|_| "ffmpeg".into())),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
