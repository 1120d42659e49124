use super::{Stage, StageHealth};
use std::sync::{PoisonError, RwLock};

/// Credential value used to simulate a provider outage
pub const DISABLED_SENTINEL: &str = "DISABLED_FOR_TESTING";

/// Swappable provider credential shared by an adapter's request path and
/// the administrative surface.
#[derive(Debug, Default)]
pub struct CredentialCell {
    value: RwLock<Option<String>>,
}

impl CredentialCell {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub fn set(&self, value: Option<String>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// The usable credential, if any
    pub fn get(&self) -> Option<String> {
        let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty() && *v != DISABLED_SENTINEL)
            .map(str::to_string)
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    pub fn is_disabled(&self) -> bool {
        let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
        value.as_deref() == Some(DISABLED_SENTINEL)
    }

    pub fn health(&self, stage: Stage, provider: &str) -> StageHealth {
        let present = self.is_present();
        StageHealth {
            stage,
            provider: provider.to_string(),
            available: present,
            credential_present: present,
            administratively_disabled: self.is_disabled(),
            max_text_length: None,
        }
    }
}
