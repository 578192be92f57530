use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub blob_backend: String,
    pub blob_root: String,
    pub max_upload_bytes: usize,
    pub max_upload_files: usize,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 5000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "precinct")?
            .set_default("surreal_db", "records")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("blob_backend", "memory")?
            .set_default("blob_root", "./data/media")?
            .set_default("max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("max_upload_files", 10)?
            .set_default("request_timeout_secs", 30)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    pub fn uses_fs_blobs(&self) -> bool {
        self.blob_backend.eq_ignore_ascii_case("fs")
    }
}
