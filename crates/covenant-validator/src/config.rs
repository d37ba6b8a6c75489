use std::sync::Arc;

use crate::expression::{ExpressionLanguage, ExpressionLanguages};
use crate::metadata::Configurer;
use crate::validator::Validator;

/// How failing `And`/`Or`/`Xor` groups are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupReporting {
    /// One violation for the group.
    #[default]
    GroupOnly,
    /// One violation for the group, carrying each failing branch as a cause.
    WithBranches,
}

/// How violations found in cascaded objects are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CascadeReporting {
    /// Inline, next to the violations of the referencing object.
    #[default]
    Flatten,
    /// As causes of one `AssertValid` violation on the referencing member.
    Nest,
}

pub struct ValidatorConfig {
    pub(crate) configurers: Vec<Arc<dyn Configurer>>,
    pub(crate) languages: ExpressionLanguages,
    pub(crate) group_reporting: GroupReporting,
    pub(crate) cascade_reporting: CascadeReporting,
    pub(crate) deduplicate: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            configurers: Vec::new(),
            languages: ExpressionLanguages::with_defaults(),
            group_reporting: GroupReporting::default(),
            cascade_reporting: CascadeReporting::default(),
            deduplicate: true,
        }
    }
}

impl ValidatorConfig {
    pub fn configurer(self, configurer: impl Configurer + 'static) -> Self {
        self.shared_configurer(Arc::new(configurer))
    }

    pub fn shared_configurer(mut self, configurer: Arc<dyn Configurer>) -> Self {
        self.configurers.push(configurer);
        self
    }

    pub fn language(mut self, language: impl ExpressionLanguage + 'static) -> Self {
        self.languages.register(Arc::new(language));
        self
    }

    pub fn group_reporting(mut self, reporting: GroupReporting) -> Self {
        self.group_reporting = reporting;
        self
    }

    pub fn cascade_reporting(mut self, reporting: CascadeReporting) -> Self {
        self.cascade_reporting = reporting;
        self
    }

    /// Collapse violations reported twice for the same object, location,
    /// code and message. On by default.
    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.deduplicate = enabled;
        self
    }

    pub fn build(self) -> Validator {
        Validator::from_config(self)
    }
}
