use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_storage_backend, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, RuntimeSettings, SchedulerSettings,
    ScoringSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    StorageBackend, TelemetrySettings,
};

const DEV_SECRET_KEY: &str = "examflow-development-secret";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMFLOW_HOST", "0.0.0.0");
        let port = env_or_default("EXAMFLOW_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("EXAMFLOW_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examflow API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_optional("SECRET_KEY");
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let backend = parse_storage_backend(env_optional("STORAGE_BACKEND"))?;
        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examflow_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "30"))?;

        let scoring = ScoringSettings {
            api_key: env_or_default("SCORING_API_KEY", ""),
            base_url: env_or_default("SCORING_BASE_URL", "").trim_end_matches('/').to_string(),
            model: env_or_default("SCORING_MODEL", "gpt-4o-mini"),
            max_tokens: parse_u32(
                "SCORING_MAX_TOKENS",
                env_or_default("SCORING_MAX_TOKENS", "512"),
            )?,
            temperature: parse_f64(
                "SCORING_TEMPERATURE",
                env_or_default("SCORING_TEMPERATURE", "0.2"),
            )?,
            timeout_seconds: parse_u64(
                "SCORING_TIMEOUT_SECONDS",
                env_or_default("SCORING_TIMEOUT_SECONDS", "30"),
            )?,
            max_retries: parse_u32(
                "SCORING_MAX_RETRIES",
                env_or_default("SCORING_MAX_RETRIES", "2"),
            )?,
            retry_delay_ms: parse_u64(
                "SCORING_RETRY_DELAY_MS",
                env_or_default("SCORING_RETRY_DELAY_MS", "1500"),
            )?,
            answer_char_limit: parse_usize(
                "SCORING_ANSWER_CHAR_LIMIT",
                env_or_default("SCORING_ANSWER_CHAR_LIMIT", "6000"),
            )?,
        };

        let scheduler = SchedulerSettings {
            tick_seconds: parse_u64(
                "SCHEDULER_TICK_SECONDS",
                env_or_default("SCHEDULER_TICK_SECONDS", "60"),
            )?,
            draft_purge_interval_seconds: parse_u64(
                "DRAFT_PURGE_INTERVAL_SECONDS",
                env_or_default("DRAFT_PURGE_INTERVAL_SECONDS", "3600"),
            )?,
            draft_max_age_hours: parse_u64(
                "DRAFT_MAX_AGE_HOURS",
                env_or_default("DRAFT_MAX_AGE_HOURS", "24"),
            )?,
        };

        let log_level = env_or_default("EXAMFLOW_LOG_LEVEL", "info");
        let json =
            env_optional("EXAMFLOW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let secret_missing = secret_key.is_none();
        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings {
                secret_key: secret_key.unwrap_or_else(|| DEV_SECRET_KEY.to_string()),
                algorithm,
            },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                backend,
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            scoring,
            scheduler,
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate(secret_missing)?;

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

    pub(crate) fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    pub(crate) fn scheduler(&self) -> &SchedulerSettings {
        &self.scheduler
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self, secret_missing: bool) -> Result<(), ConfigError> {
        if self.scheduler.tick_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCHEDULER_TICK_SECONDS",
                value: "0".to_string(),
            });
        }
        if self.scoring.answer_char_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_ANSWER_CHAR_LIMIT",
                value: "0".to_string(),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if secret_missing {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }

        if self.database.backend == StorageBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl ScoringSettings {
    pub(crate) fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.base_url.is_empty()
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}
