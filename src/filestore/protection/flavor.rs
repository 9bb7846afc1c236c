use std::sync::Arc;

use crate::config::Settings;

/// Answers "is the fronting web server Nginx?". Asked afresh on every
/// protection call, so a changed answer takes effect immediately.
pub trait ServerProbe: Send + Sync {
    fn is_nginx(&self) -> bool;
}

/// Probe over a server software banner such as `nginx/1.25.3` or `Apache/2.4`.
#[derive(Debug, Clone, Default)]
pub struct SoftwareStringProbe {
    software: Option<String>,
}

impl SoftwareStringProbe {
    pub fn new(software: Option<String>) -> Self { Self { software } }

    pub fn from_settings(settings: &Settings) -> Self { Self::new(settings.server_software.clone()) }
}

impl ServerProbe for SoftwareStringProbe {
    fn is_nginx(&self) -> bool {
        self.software.as_deref().map(|s| s.to_ascii_lowercase().contains("nginx")).unwrap_or(false)
    }
}

/// Reads `SERVER_SOFTWARE` from the process environment on each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvServerProbe;

impl ServerProbe for EnvServerProbe {
    fn is_nginx(&self) -> bool {
        SoftwareStringProbe::new(std::env::var("SERVER_SOFTWARE").ok()).is_nginx()
    }
}

/// Probe for the configured flavor: the settings banner when present, the environment otherwise.
pub fn probe_for(settings: &Settings) -> Arc<dyn ServerProbe> {
    if settings.server_software.is_some() {
        Arc::new(SoftwareStringProbe::from_settings(settings))
    } else {
        Arc::new(EnvServerProbe)
    }
}

/// Web-server specific representation of a protection artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionStrategy {
    Apache,
    Nginx,
}

impl ProtectionStrategy {
    pub fn select(probe: &dyn ServerProbe) -> Self {
        if probe.is_nginx() { ProtectionStrategy::Nginx } else { ProtectionStrategy::Apache }
    }

    /// Artifact file name inside the protected directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ProtectionStrategy::Apache => super::apache::FILE_NAME,
            ProtectionStrategy::Nginx => super::nginx::FILE_NAME,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionStrategy::Apache => "apache",
            ProtectionStrategy::Nginx => "nginx",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle(AtomicBool);
    impl ServerProbe for Toggle {
        fn is_nginx(&self) -> bool { self.0.load(Ordering::SeqCst) }
    }

    #[test]
    fn banner_detection() {
        assert!(SoftwareStringProbe::new(Some("nginx/1.25.3".into())).is_nginx());
        assert!(SoftwareStringProbe::new(Some("NGINX".into())).is_nginx());
        assert!(!SoftwareStringProbe::new(Some("Apache/2.4.58 (Unix)".into())).is_nginx());
        assert!(!SoftwareStringProbe::new(None).is_nginx());
    }

    #[test]
    fn selection_follows_probe_each_time() {
        let probe = Toggle(AtomicBool::new(false));
        assert_eq!(ProtectionStrategy::select(&probe), ProtectionStrategy::Apache);
        probe.0.store(true, Ordering::SeqCst);
        assert_eq!(ProtectionStrategy::select(&probe), ProtectionStrategy::Nginx);
        assert_eq!(ProtectionStrategy::Nginx.file_name(), "protected-files.nginx.conf");
        assert_eq!(ProtectionStrategy::Apache.file_name(), ".htaccess");
    }
}
