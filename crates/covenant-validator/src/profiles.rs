//! Profile activation.
//!
//! A check declaring no profiles belongs to the `default` profile. A check
//! runs when any of its profiles is enabled.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::check::Check;

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProfileMode {
    /// Everything runs except the listed profiles.
    AllEnabled { disabled: HashSet<String> },
    /// Nothing runs except the listed profiles.
    AllDisabled { enabled: HashSet<String> },
}

impl ProfileMode {
    fn is_enabled(&self, profile: &str) -> bool {
        match self {
            Self::AllEnabled { disabled } => !disabled.contains(profile),
            Self::AllDisabled { enabled } => enabled.contains(profile),
        }
    }
}

/// Which profiles are active. Shared by every validation on a validator;
/// each call works from a copy taken when it starts.
#[derive(Debug)]
pub struct Profiles {
    mode: RwLock<ProfileMode>,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            mode: RwLock::new(ProfileMode::AllEnabled {
                disabled: HashSet::new(),
            }),
        }
    }
}

impl Profiles {
    /// Enable exactly `profiles`.
    pub fn set_enabled<S: Into<String>>(&self, profiles: impl IntoIterator<Item = S>) {
        *self.write() = ProfileMode::AllDisabled {
            enabled: profiles.into_iter().map(Into::into).collect(),
        };
    }

    pub fn enable(&self, profile: &str) {
        match &mut *self.write() {
            ProfileMode::AllEnabled { disabled } => {
                disabled.remove(profile);
            }
            ProfileMode::AllDisabled { enabled } => {
                enabled.insert(profile.to_string());
            }
        }
    }

    pub fn disable(&self, profile: &str) {
        match &mut *self.write() {
            ProfileMode::AllEnabled { disabled } => {
                disabled.insert(profile.to_string());
            }
            ProfileMode::AllDisabled { enabled } => {
                enabled.remove(profile);
            }
        }
    }

    pub fn enable_all(&self) {
        *self.write() = ProfileMode::AllEnabled {
            disabled: HashSet::new(),
        };
    }

    pub fn disable_all(&self) {
        *self.write() = ProfileMode::AllDisabled {
            enabled: HashSet::new(),
        };
    }

    pub fn is_enabled(&self, profile: &str) -> bool {
        self.mode
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_enabled(profile)
    }

    pub(crate) fn filter(&self) -> ProfileFilter {
        ProfileFilter::Mode(
            self.mode
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ProfileMode> {
        self.mode.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Profile decision for one validation call.
#[derive(Clone, Debug)]
pub(crate) enum ProfileFilter {
    Mode(ProfileMode),
    /// Explicit per-call selection.
    Only(HashSet<String>),
}

impl ProfileFilter {
    pub(crate) fn only<S: Into<String>>(profiles: impl IntoIterator<Item = S>) -> Self {
        Self::Only(profiles.into_iter().map(Into::into).collect())
    }

    pub(crate) fn admits(&self, check: &Check) -> bool {
        let enabled = |profile: &str| match self {
            Self::Mode(mode) => mode.is_enabled(profile),
            Self::Only(set) => set.contains(profile),
        };
        if check.profiles().is_empty() {
            enabled(DEFAULT_PROFILE)
        } else {
            check.profiles().iter().any(|p| enabled(p))
        }
    }
}
