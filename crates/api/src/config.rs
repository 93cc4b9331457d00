//! Environment-driven server configuration.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// Comma-separated CORS origins; empty means localhost defaults.
    pub allowed_origins: Vec<String>,
    pub brand_name: String,
    /// Admin account seeded at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub enable_billing: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let jwt_expiry_hours = std::env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(168);

        let allowed_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let brand_name =
            std::env::var("BRAND_NAME").unwrap_or_else(|_| "Meridian Health".to_string());

        let admin_email = std::env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty());
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty());

        let enable_billing = std::env::var("ENABLE_BILLING")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            database_url,
            bind_address,
            jwt_secret,
            jwt_expiry_hours,
            allowed_origins,
            brand_name,
            admin_email,
            admin_password,
            enable_billing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "JWT_SECRET",
            "BIND_ADDRESS",
            "JWT_EXPIRY_HOURS",
            "CORS_ORIGINS",
            "BRAND_NAME",
            "ADMIN_EMAIL",
            "ADMIN_PASSWORD",
            "ENABLE_BILLING",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_applied() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/meridian");
        std::env::set_var("JWT_SECRET", "secret");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.jwt_expiry_hours, 168);
        assert!(config.allowed_origins.is_empty());
        assert!(config.enable_billing);
        assert!(config.admin_email.is_none());
    }

    #[test]
    #[serial]
    fn missing_required_vars_fail() {
        clear_env();
        assert!(Config::from_env().is_err());

        std::env::set_var("DATABASE_URL", "postgres://localhost/meridian");
        assert!(Config::from_env().is_err(), "JWT_SECRET still missing");
    }

    #[test]
    #[serial]
    fn cors_origins_parsed() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/meridian");
        std::env::set_var("JWT_SECRET", "secret");
        std::env::set_var(
            "CORS_ORIGINS",
            "https://example.com, https://admin.example.com ,",
        );

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.allowed_origins,
            vec![
                "https://example.com".to_string(),
                "https://admin.example.com".to_string()
            ]
        );
    }

    #[test]
    #[serial]
    fn billing_toggle() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/meridian");
        std::env::set_var("JWT_SECRET", "secret");
        std::env::set_var("ENABLE_BILLING", "false");

        let config = Config::from_env().unwrap();
        assert!(!config.enable_billing);
    }
}
