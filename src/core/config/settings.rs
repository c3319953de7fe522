use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, JudgingSettings,
    RuntimeSettings, SandboxSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("SOLVIO_HOST", "0.0.0.0");
        let port = env_or_default("SOLVIO_PORT", "8000");

        let environment =
            parse_environment(env_optional("SOLVIO_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("SOLVIO_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Solvio API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "solviosuperuser");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "solvio_db");
        let database_url = env_optional("DATABASE_URL");

        let judge_base_url = env_or_default("JUDGE_SERVER_URL", "http://localhost:9050");
        let judge_token = env_or_default("JUDGE_SERVER_TOKEN", "");
        let judge_callback_token = env_or_default("JUDGE_CALLBACK_TOKEN", "");
        let judge_timeout_seconds =
            parse_u64("JUDGE_TIMEOUT_SECONDS", env_or_default("JUDGE_TIMEOUT_SECONDS", "30"))?;
        let judge_connect_timeout_seconds = parse_u64(
            "JUDGE_CONNECT_TIMEOUT_SECONDS",
            env_or_default("JUDGE_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;
        let max_dispatch_retries = parse_u32(
            "JUDGE_MAX_DISPATCH_RETRIES",
            env_or_default("JUDGE_MAX_DISPATCH_RETRIES", "3"),
        )?;
        let submission_retry_seconds = parse_u64(
            "JUDGE_SUBMISSION_RETRY_SECONDS",
            env_or_default("JUDGE_SUBMISSION_RETRY_SECONDS", "60"),
        )?;
        let custom_test_retry_seconds = parse_u64(
            "JUDGE_CUSTOM_TEST_RETRY_SECONDS",
            env_or_default("JUDGE_CUSTOM_TEST_RETRY_SECONDS", "30"),
        )?;
        let dispatch_lease_seconds = parse_u64(
            "JUDGE_DISPATCH_LEASE_SECONDS",
            env_or_default("JUDGE_DISPATCH_LEASE_SECONDS", "300"),
        )?;

        let default_time_limit_ms =
            parse_u32("DEFAULT_TIME_LIMIT_MS", env_or_default("DEFAULT_TIME_LIMIT_MS", "1000"))?;
        let default_memory_limit_mb = parse_u32(
            "DEFAULT_MEMORY_LIMIT_MB",
            env_or_default("DEFAULT_MEMORY_LIMIT_MB", "256"),
        )?;
        let max_source_bytes =
            parse_usize("MAX_SOURCE_BYTES", env_or_default("MAX_SOURCE_BYTES", "65536"))?;
        let dispatch_workers =
            parse_usize("DISPATCH_WORKERS", env_or_default("DISPATCH_WORKERS", "4"))?;
        let custom_test_workers =
            parse_usize("CUSTOM_TEST_WORKERS", env_or_default("CUSTOM_TEST_WORKERS", "2"))?;
        let plagiarism_stale_after_seconds = parse_u64(
            "PLAGIARISM_STALE_AFTER_SECONDS",
            env_or_default("PLAGIARISM_STALE_AFTER_SECONDS", "3600"),
        )?;

        let first_superuser_username = env_or_default("FIRST_SUPERUSER_USERNAME", "admin");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("SOLVIO_LOG_LEVEL", "info");
        let json = env_optional("SOLVIO_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled = env_optional("PROMETHEUS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            sandbox: SandboxSettings {
                base_url: judge_base_url.trim_end_matches('/').to_string(),
                token: judge_token,
                callback_token: judge_callback_token,
                timeout_seconds: judge_timeout_seconds,
                connect_timeout_seconds: judge_connect_timeout_seconds,
                max_dispatch_retries,
                submission_retry_seconds,
                custom_test_retry_seconds,
                dispatch_lease_seconds,
            },
            judging: JudgingSettings {
                default_time_limit_ms,
                default_memory_limit_mb,
                max_source_bytes,
                dispatch_workers,
                custom_test_workers,
                plagiarism_stale_after_seconds,
            },
            admin: AdminSettings { first_superuser_username, first_superuser_password },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn sandbox(&self) -> &SandboxSettings {
        &self.sandbox
    }

    pub(crate) fn judging(&self) -> &JudgingSettings {
        &self.judging
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "JUDGE_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.sandbox.submission_retry_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "JUDGE_SUBMISSION_RETRY_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.sandbox.custom_test_retry_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "JUDGE_CUSTOM_TEST_RETRY_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.judging.default_time_limit_ms == 0 || self.judging.default_memory_limit_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_TIME_LIMIT_MS/DEFAULT_MEMORY_LIMIT_MB",
                value: "0".to_string(),
            });
        }

        if self.judging.max_source_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_SOURCE_BYTES",
                value: "0".to_string(),
            });
        }

        if self.judging.dispatch_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DISPATCH_WORKERS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.sandbox.token.is_empty() {
            return Err(ConfigError::MissingSecret("JUDGE_SERVER_TOKEN"));
        }
        if self.sandbox.callback_token.is_empty() {
            return Err(ConfigError::MissingSecret("JUDGE_CALLBACK_TOKEN"));
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}
