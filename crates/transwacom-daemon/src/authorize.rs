//! Host authorisation on the consumer side.
//!
//! Trusted hosts (matching name and id, auto-accept on) pass silently;
//! everyone else goes through the user prompt with a bounded wait.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use transwacom_types::DeviceDescriptor;

use crate::config::ConfigManager;

/// How long the user gets to answer before the request is rejected.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the user chose for an incoming share request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Accept for this session only.
    AcceptOnce,
    /// Accept and add the host to the trusted registry.
    AcceptAndTrust,
    Reject,
}

/// Asks the user whether to accept an incoming share.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn request(&self, host_name: &str, devices: &[DeviceDescriptor]) -> AuthDecision;
}

/// Decide whether to accept a handshake from `host_name`/`host_id`.
///
/// Returns `true` to accept. A prompt that does not answer within
/// `timeout` counts as a rejection.
pub async fn authorize_host(
    config: &Mutex<ConfigManager>,
    prompt: &dyn AuthorizationPrompt,
    host_name: &str,
    host_id: &str,
    devices: &[DeviceDescriptor],
    timeout: Duration,
) -> bool {
    {
        let config = config.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if config.should_auto_accept_host(host_name, host_id) {
            info!(host = %host_name, "auto-accepting trusted host");
            return true;
        }
    }

    let decision = match tokio::time::timeout(timeout, prompt.request(host_name, devices)).await {
        Ok(decision) => decision,
        Err(_) => {
            warn!(host = %host_name, "authorisation prompt timed out");
            AuthDecision::Reject
        }
    };

    match decision {
        AuthDecision::AcceptOnce => true,
        AuthDecision::AcceptAndTrust => {
            let mut config = config.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Err(e) = config.add_trusted_host(host_name, host_id, true) {
                warn!(host = %host_name, error = %e, "failed to persist trust");
            } else {
                info!(host = %host_name, "added to trusted hosts");
            }
            true
        }
        AuthDecision::Reject => {
            info!(host = %host_name, "connection rejected");
            false
        }
    }
}

/// Interactive terminal prompt (`[y/N/t]`, t = accept and trust).
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl AuthorizationPrompt for TerminalPrompt {
    async fn request(&self, host_name: &str, devices: &[DeviceDescriptor]) -> AuthDecision {
        let device_names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        eprintln!("\nIncoming connection from: {host_name}");
        eprintln!("Wants to share: {}", device_names.join(", "));
        eprint!("Accept connection? [y/N/t(rust)]: ");

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok();
            line.trim().to_lowercase()
        })
        .await
        .unwrap_or_default();

        match answer.as_str() {
            "y" | "yes" => AuthDecision::AcceptOnce,
            "t" | "trust" => AuthDecision::AcceptAndTrust,
            _ => AuthDecision::Reject,
        }
    }
}

/// Scripted prompt for tests and auto-accepting setups.
pub struct StaticPrompt(pub AuthDecision);

#[async_trait]
impl AuthorizationPrompt for StaticPrompt {
    async fn request(&self, _host_name: &str, _devices: &[DeviceDescriptor]) -> AuthDecision {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config() -> (Mutex<ConfigManager>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("transwacom-auth-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = ConfigManager::load_from(dir.clone()).unwrap();
        (Mutex::new(config), dir)
    }

    /// Prompt that never answers, for timeout coverage.
    struct SilentPrompt;

    #[async_trait]
    impl AuthorizationPrompt for SilentPrompt {
        async fn request(&self, _host: &str, _devices: &[DeviceDescriptor]) -> AuthDecision {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn trusted_host_accepted_without_prompt() {
        let (config, dir) = test_config();
        config
            .lock()
            .unwrap()
            .add_trusted_host("alpha", "id-one", true)
            .unwrap();

        // The silent prompt would hang if consulted.
        let accepted = authorize_host(
            &config,
            &SilentPrompt,
            "alpha",
            "id-one",
            &[],
            Duration::from_millis(100),
        )
        .await;
        assert!(accepted);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn wrong_id_forces_prompt() {
        let (config, dir) = test_config();
        config
            .lock()
            .unwrap()
            .add_trusted_host("alpha", "id-one", true)
            .unwrap();

        let accepted = authorize_host(
            &config,
            &StaticPrompt(AuthDecision::Reject),
            "alpha",
            "id-two",
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(!accepted);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn accept_and_trust_persists() {
        let (config, dir) = test_config();
        let accepted = authorize_host(
            &config,
            &StaticPrompt(AuthDecision::AcceptAndTrust),
            "alpha",
            "id-one",
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(accepted);
        assert!(config.lock().unwrap().is_host_trusted("alpha", "id-one"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn silent_prompt_times_out_to_reject() {
        let (config, dir) = test_config();
        let accepted = authorize_host(
            &config,
            &SilentPrompt,
            "alpha",
            "id-one",
            &[],
            Duration::from_millis(50),
        )
        .await;
        assert!(!accepted);
        std::fs::remove_dir_all(dir).ok();
    }
}
