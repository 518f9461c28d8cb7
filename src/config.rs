use std::path::PathBuf;

/// Upper bounds enforced while reading an upload batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self { max_files: 10, max_file_bytes: 10 * 1024 * 1024 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentBackend {
    Fs,
    S3,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be at least 32 characters long")]
    WeakSecret(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub limits: UploadLimits,
    pub attachment_backend: AttachmentBackend,
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub frontend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        fn opt_env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        fn usize_env(name: &'static str, default: usize) -> Result<usize, ConfigError> {
            match opt_env(name) {
                None => Ok(default),
                Some(v) => match v.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::Invalid { name, value: v }),
                },
            }
        }

        // JWT_SECRET is read by the auth extractor; validate it up front.
        let secret = opt_env("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < 32 {
            return Err(ConfigError::WeakSecret("JWT_SECRET"));
        }

        let attachment_backend = match opt_env("ATTACHMENT_BACKEND").as_deref() {
            None | Some("fs") => AttachmentBackend::Fs,
            Some("s3") => AttachmentBackend::S3,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "ATTACHMENT_BACKEND", value: other.to_string() })
            }
        };
        let defaults = UploadLimits::default();

        Ok(Self {
            bind_addr: opt_env("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3001".into()),
            upload_dir: opt_env("UPLOAD_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("uploads")),
            limits: UploadLimits {
                max_files: usize_env("MAX_UPLOAD_FILES", defaults.max_files)?,
                max_file_bytes: usize_env("MAX_UPLOAD_BYTES", defaults.max_file_bytes)?,
            },
            attachment_backend,
            data_dir: opt_env("DATA_DIR").map(PathBuf::from),
            database_url: opt_env("DATABASE_URL"),
            frontend_url: opt_env("FRONTEND_URL"),
        })
    }
}
