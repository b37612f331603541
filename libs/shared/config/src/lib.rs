use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Supabase,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StorageBackend::Supabase),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub storage_backend: StorageBackend,
    pub email_function_name: String,
    pub email_sender: String,
    pub email_enabled: bool,
    pub clinic_utc_offset_minutes: i32,
    pub reminder_hour: u32,
    pub lab_notify_on_completion: bool,
    pub documents_bucket: String,
    pub lab_results_bucket: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });

        let config = Self {
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, falling back to anon key");
                    supabase_anon_key.clone()
                }),
            storage_backend: parse_or("STORAGE_BACKEND", StorageBackend::Supabase),
            email_function_name: env::var("EMAIL_FUNCTION_NAME")
                .unwrap_or_else(|_| "send-email".to_string()),
            email_sender: env::var("EMAIL_SENDER")
                .unwrap_or_else(|_| "Health Consultation <no-reply@health-consultation.local>".to_string()),
            email_enabled: parse_or("EMAIL_ENABLED", !supabase_url.is_empty()),
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", 0),
            reminder_hour: parse_or("REMINDER_HOUR", 8u32).min(23),
            lab_notify_on_completion: parse_or("LAB_NOTIFY_ON_COMPLETION", false),
            documents_bucket: env::var("APPOINTMENT_DOCUMENTS_BUCKET")
                .unwrap_or_else(|_| "appointment-documents".to_string()),
            lab_results_bucket: env::var("LAB_RESULTS_BUCKET")
                .unwrap_or_else(|_| "lab-results".to_string()),
            port: parse_or("PORT", 3000u16),
            supabase_url,
            supabase_anon_key,
        };

        if !config.is_configured() && config.storage_backend == StorageBackend::Supabase {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Key used for server-side PostgREST and Storage calls.
    pub fn service_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: String::new(),
            storage_backend: StorageBackend::Supabase,
            email_function_name: "send-email".to_string(),
            email_sender: "Health Consultation <no-reply@health-consultation.local>".to_string(),
            email_enabled: false,
            clinic_utc_offset_minutes: 0,
            reminder_hour: 8,
            lab_notify_on_completion: false,
            documents_bucket: "appointment-documents".to_string(),
            lab_results_bucket: "lab-results".to_string(),
            port: 3000,
        }
    }
}

fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!("supabase".parse::<StorageBackend>(), Ok(StorageBackend::Supabase));
        assert!("postgres".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn service_key_falls_back_to_anon_key() {
        let config = AppConfig {
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.service_key(), "anon");

        let config = AppConfig {
            supabase_service_role_key: "service".to_string(),
            ..config
        };
        assert_eq!(config.service_key(), "service");
    }
}
