//! Mart configuration

use crate::error::{MartError, MartResult};
use crate::etl::flatten::{FlattenPolicy, MartLayout, PaymentPolicy, ProductlessSales};
use crate::etl::pipeline::DEFAULT_CHUNK_SIZE;
use crate::query::compile::DEFAULT_LIMIT;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main salesmart configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MartConfig {
    /// Source database URL
    pub database_url: Option<String>,

    /// Path of the mart file
    pub mart_path: PathBuf,

    /// Rows per extracted batch
    pub chunk_size: usize,

    /// Which mart tables to build
    pub layout: MartLayout,

    /// LIMIT for generic queries that do not set one
    pub default_limit: u64,

    /// Sampling cap on sale ids
    pub max_sale_id: Option<i64>,

    pub payment_policy: PaymentPolicy,

    pub productless_sales: ProductlessSales,
}

impl Default for MartConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            mart_path: PathBuf::from("analytics.db"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            layout: MartLayout::default(),
            default_limit: DEFAULT_LIMIT,
            max_sale_id: None,
            payment_policy: PaymentPolicy::default(),
            productless_sales: ProductlessSales::default(),
        }
    }
}

impl MartConfig {
    /// Create a new configuration builder
    pub fn builder() -> MartConfigBuilder {
        MartConfigBuilder::default()
    }

    /// Default config file location: `<config dir>/salesmart/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("salesmart").join("config.toml"))
    }

    /// Load from `path`, or from [`MartConfig::default_path`] if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> MartResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| MartError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> MartResult<Self> {
        let config: MartConfig = toml::from_str(text).map_err(|e| MartError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MartResult<()> {
        if self.chunk_size == 0 {
            return Err(MartError::Config("chunk_size must be greater than zero".into()));
        }
        if self.default_limit == 0 {
            return Err(MartError::Config("default_limit must be greater than zero".into()));
        }
        Ok(())
    }

    /// Policy knobs for the flattening queries.
    pub fn flatten_policy(&self) -> FlattenPolicy {
        FlattenPolicy {
            payment: self.payment_policy,
            productless_sales: self.productless_sales,
            max_sale_id: self.max_sale_id,
        }
    }
}

/// Builder for MartConfig
#[derive(Debug, Default)]
pub struct MartConfigBuilder {
    config: MartConfig,
}

impl MartConfigBuilder {
    /// Set the source database URL
    pub fn database(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Set the mart file path
    pub fn mart(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mart_path = path.into();
        self
    }

    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.config.chunk_size = rows;
        self
    }

    pub fn layout(mut self, layout: MartLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn default_limit(mut self, limit: u64) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_sale_id(mut self, max: i64) -> Self {
        self.config.max_sale_id = Some(max);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> MartResult<MartConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = MartConfig::from_toml(
            r#"
            database_url = "postgres://localhost/sales"
            mart_path = "/tmp/mart.db"
            chunk_size = 5000
            layout = "flat"
            max_sale_id = 50000
            payment_policy = "lowest_payment_id"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/sales"));
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.layout, MartLayout::Flat);
        assert_eq!(config.default_limit, DEFAULT_LIMIT);
        assert_eq!(config.flatten_policy().payment, PaymentPolicy::LowestPaymentId);
        assert_eq!(config.flatten_policy().productless_sales, ProductlessSales::Drop);
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        assert!(matches!(MartConfig::from_toml("chunk_size = 0"), Err(MartError::Config(_))));
        assert!(MartConfig::builder().default_limit(0).build().is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(MartConfig::from_toml("chunk = 10").is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = MartConfig::load(Some(Path::new("/nonexistent/salesmart.toml"))).unwrap_err();
        assert!(matches!(err, MartError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = MartConfig::builder()
            .database("postgres://db")
            .mart("mart.db")
            .chunk_size(10)
            .layout(MartLayout::Flat)
            .max_sale_id(7)
            .build()
            .unwrap();
        assert_eq!(config.mart_path, PathBuf::from("mart.db"));
        assert_eq!(config.flatten_policy().max_sale_id, Some(7));
    }
}
