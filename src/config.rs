use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Session Guard - authenticated API client with transparent token refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API root, e.g. http://localhost:8000/api/v1
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = "http://localhost:8000/api/v1")]
    pub api_base_url: String,

    /// Path to the session SQLite database
    #[arg(short = 'd', long, env = "SESSION_DB_FILE")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub http_connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// HTTP max retries
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,

    /// Seconds before `exp` at which a token already counts as expired
    #[arg(long, env = "TOKEN_EXPIRY_LEEWAY", default_value = "10")]
    pub token_leeway: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sign in with email and password
    Login {
        email: String,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        email: String,
        #[arg(short, long)]
        first_name: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Revoke the refresh token and forget the session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Bypass the cached profile
        #[arg(long)]
        refresh: bool,
    },
    /// Show token expiry state
    Status,
    /// GET an API path with the session's credentials and print the body
    Get { path: String },
    /// Confirm an email address from the verification link
    VerifyEmail { uid: String, token: String },
    /// Send another verification email
    ResendVerification { email: String },
    /// Email a password reset link
    ResetPassword { email: String },
    /// Print the Google sign-in URL
    GoogleUrl,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub api_base_url: String,

    // Session storage
    pub session_db_file: PathBuf,

    // Token handling
    pub token_expiry_leeway: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let session_db_file = match args.db_file {
            Some(ref path) => expand_tilde(path),
            None => default_session_db_file()
                .context("No data directory found (use -d or set SESSION_DB_FILE env var)")?,
        };

        Ok(Config {
            api_base_url: args.api_base_url.trim_end_matches('/').to_string(),
            session_db_file,
            token_expiry_leeway: args.token_leeway,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            http_connect_timeout: args.http_connect_timeout,
            http_request_timeout: args.http_timeout,
            http_max_retries: args.http_retries,

            log_level: args.log_level.clone(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.api_base_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {}", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must be http or https: {}", self.api_base_url);
        }

        if self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP_CONNECT_TIMEOUT must be greater than zero");
        }
        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }
}

fn default_session_db_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["session-guard"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn config(api_base_url: &str) -> Config {
        Config {
            api_base_url: api_base_url.to_string(),
            session_db_file: PathBuf::from("/tmp/session.sqlite3"),
            token_expiry_leeway: 10,
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            http_max_retries: 3,
            log_level: "warn".to_string(),
        }
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_from_args_explicit_values() {
        let args = parse(&[
            "--api-base-url",
            "https://diagrams.example.com/api/v1/",
            "-d",
            "/var/lib/sg/session.sqlite3",
            "--token-leeway",
            "0",
            "--http-retries",
            "1",
            "status",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.api_base_url, "https://diagrams.example.com/api/v1");
        assert_eq!(
            config.session_db_file,
            PathBuf::from("/var/lib/sg/session.sqlite3")
        );
        assert_eq!(config.token_expiry_leeway, 0);
        assert_eq!(config.http_max_retries, 1);
        assert_eq!(args.command, Command::Status);
    }

    #[test]
    fn test_subcommands_parse() {
        assert_eq!(
            parse(&["-d", "/tmp/s.db", "login", "ada@example.com"]).command,
            Command::Login {
                email: "ada@example.com".to_string(),
                password: None
            }
        );
        assert_eq!(
            parse(&["-d", "/tmp/s.db", "get", "diagrams/"]).command,
            Command::Get {
                path: "diagrams/".to_string()
            }
        );
        assert_eq!(
            parse(&["-d", "/tmp/s.db", "verify-email", "MQ", "abc-123"]).command,
            Command::VerifyEmail {
                uid: "MQ".to_string(),
                token: "abc-123".to_string()
            }
        );
        assert_eq!(
            parse(&["-d", "/tmp/s.db", "whoami", "--refresh"]).command,
            Command::Whoami { refresh: true }
        );
    }

    #[test]
    fn test_missing_subcommand_rejected() {
        assert!(CliArgs::try_parse_from(["session-guard"]).is_err());
    }

    #[test]
    fn test_validate_accepts_http_urls() {
        assert!(config("http://localhost:8000/api/v1").validate().is_ok());
        assert!(config("https://diagrams.example.com/api/v1").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        assert!(config("not a url").validate().is_err());
        assert!(config("ftp://example.com/api").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut c = config("http://localhost:8000/api/v1");
        c.http_request_timeout = 0;
        assert!(c.validate().is_err());

        let mut c = config("http://localhost:8000/api/v1");
        c.http_connect_timeout = 0;
        assert!(c.validate().is_err());
    }
}
