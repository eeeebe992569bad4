use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where documents and hosted blobs live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataBackend {
    DynamoDb,
    Memory,
}

impl FromStr for DataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamodb" => Ok(DataBackend::DynamoDb),
            "memory" => Ok(DataBackend::Memory),
            other => Err(format!("unknown backend '{}', expected 'dynamodb' or 'memory'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TableNames {
    pub images: String,
    pub requests: String,
    pub config: String,
    pub users: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            images: "images".to_string(),
            requests: "requests".to_string(),
            config: "config".to_string(),
            users: "users".to_string(),
        }
    }
}

/// Settings for the server-side re-encode applied before repository commits.
#[derive(Clone, Copy, Debug)]
pub struct RecompressSettings {
    pub max_width: u32,
    pub quality: u8,
}

/// GitHub repository used as the secondary file store.
#[derive(Clone, Debug)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub upload_dir: String,
    pub quota_bytes: u64,
    pub api_base: String,
}

#[derive(Clone, Debug)] // Clone needed if passed around, Debug for logging
pub struct Config {
    pub bind_address: SocketAddr,
    pub data_backend: DataBackend,
    pub asset_bucket_name: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub tables: TableNames,
    /// Prefix for asset URLs handed back to clients, e.g. `https://imagi.example`.
    pub public_base_url: String,
    pub admin_token: Option<String>,
    pub admin_emails: Vec<String>,
    pub max_upload_bytes: usize,
    pub profile_edit_cooldown_days: i64,
    pub weekly_selection_size: usize,
    pub recompress: RecompressSettings,
    pub github: Option<GitHubConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_backend: DataBackend::Memory,
            asset_bucket_name: "imagi-assets".to_string(),
            aws_region: "ca-central-1".to_string(),
            localstack_endpoint: None,
            tables: TableNames::default(),
            public_base_url: "http://localhost:3000".to_string(),
            admin_token: None,
            admin_emails: Vec::new(),
            max_upload_bytes: 10 * 1024 * 1024,
            profile_edit_cooldown_days: 7,
            weekly_selection_size: 10,
            recompress: RecompressSettings { max_width: 1920, quality: 80 },
            github: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;
        let data_backend = parse_var("DATA_BACKEND", DataBackend::DynamoDb)?;

        let asset_bucket_name = match (env::var("ASSET_BUCKET_NAME"), data_backend) {
            (Ok(name), _) => name,
            (Err(_), DataBackend::Memory) => defaults.asset_bucket_name,
            (Err(_), DataBackend::DynamoDb) => {
                return Err(ConfigError::MissingVar("ASSET_BUCKET_NAME".into()));
            }
        };

        let aws_region = env::var("AWS_DEFAULT_REGION").unwrap_or(defaults.aws_region);

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok(); // Optional

        let tables = TableNames {
            images: env::var("IMAGES_TABLE").unwrap_or(defaults.tables.images),
            requests: env::var("REQUESTS_TABLE").unwrap_or(defaults.tables.requests),
            config: env::var("CONFIG_TABLE").unwrap_or(defaults.tables.config),
            users: env::var("USERS_TABLE").unwrap_or(defaults.tables.users),
        };

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or(defaults.public_base_url)
            .trim_end_matches('/')
            .to_string();

        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
        let admin_emails = env::var("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let recompress = RecompressSettings {
            max_width: parse_var("RECOMPRESS_MAX_WIDTH", defaults.recompress.max_width)?,
            quality: parse_var("RECOMPRESS_QUALITY", defaults.recompress.quality)?,
        };
        if recompress.max_width == 0 || recompress.quality == 0 || recompress.quality > 100 {
            return Err(ConfigError::InvalidVar(
                "RECOMPRESS_MAX_WIDTH/RECOMPRESS_QUALITY".into(),
                "width must be positive and quality within 1..=100".into(),
            ));
        }

        Ok(Config {
            bind_address,
            data_backend,
            asset_bucket_name,
            aws_region,
            localstack_endpoint,
            tables,
            public_base_url,
            admin_token,
            admin_emails,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            profile_edit_cooldown_days: cooldown_days(parse_var(
                "PROFILE_EDIT_COOLDOWN_DAYS",
                defaults.profile_edit_cooldown_days,
            )?)?,
            weekly_selection_size: parse_var("WEEKLY_SELECTION_SIZE", defaults.weekly_selection_size)?,
            recompress,
            github: load_github()?,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

// The repository store is optional; it is enabled only when all three of
// token, owner and repo are present.
fn load_github() -> Result<Option<GitHubConfig>, ConfigError> {
    let (Ok(token), Ok(owner), Ok(repo)) = (
        env::var("GITHUB_TOKEN"),
        env::var("GITHUB_OWNER"),
        env::var("GITHUB_REPO"),
    ) else {
        return Ok(None);
    };

    Ok(Some(GitHubConfig {
        token,
        owner,
        repo,
        branch: env::var("GITHUB_BRANCH").unwrap_or_else(|_| "main".to_string()),
        upload_dir: env::var("GITHUB_UPLOAD_DIR")
            .unwrap_or_else(|_| "uploads".to_string())
            .trim_matches('/')
            .to_string(),
        quota_bytes: parse_var("GITHUB_QUOTA_BYTES", 1024 * 1024 * 1024)?,
        api_base: env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string(),
    }))
}

pub const MAX_COOLDOWN_DAYS: i64 = 3650;

fn cooldown_days(days: i64) -> Result<i64, ConfigError> {
    if (0..=MAX_COOLDOWN_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::InvalidVar(
            "PROFILE_EDIT_COOLDOWN_DAYS".into(),
            format!("{} is outside 0..={}", days, MAX_COOLDOWN_DAYS),
        ))
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(name.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!("DynamoDB".parse::<DataBackend>(), Ok(DataBackend::DynamoDb));
        assert_eq!("memory".parse::<DataBackend>(), Ok(DataBackend::Memory));
        assert!("postgres".parse::<DataBackend>().is_err());
    }

    #[test]
    fn cooldown_days_are_bounded() {
        assert_eq!(cooldown_days(7).unwrap(), 7);
        assert_eq!(cooldown_days(0).unwrap(), 0);
        assert!(matches!(cooldown_days(-1), Err(ConfigError::InvalidVar(..))));
        assert!(cooldown_days(i64::MAX).is_err());
    }

    #[test]
    fn admin_emails_match_ignoring_case() {
        let config = Config {
            admin_emails: vec!["admin@imagi.gg".to_string()],
            ..Config::default()
        };
        assert!(config.is_admin_email(" Admin@IMAGI.gg "));
        assert!(!config.is_admin_email("player@imagi.gg"));
    }
}
