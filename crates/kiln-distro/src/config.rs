use serde::{Deserialize, Serialize};

/// OS defaults declared by a distribution and refined per image type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
}

impl ImageConfig {
    pub fn with_services(enabled: &[&str]) -> Self {
        Self {
            enabled_services: enabled.iter().map(|s| (*s).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Fill every unset field from `parent`.
    #[must_use]
    pub fn inherit_from(&self, parent: &ImageConfig) -> ImageConfig {
        fn pick(own: Option<&String>, parent: Option<&String>) -> Option<String> {
            own.or(parent).cloned()
        }
        fn pick_list(own: &[String], parent: &[String]) -> Vec<String> {
            if own.is_empty() {
                parent.to_vec()
            } else {
                own.to_vec()
            }
        }
        ImageConfig {
            timezone: pick(self.timezone.as_ref(), parent.timezone.as_ref()),
            locale: pick(self.locale.as_ref(), parent.locale.as_ref()),
            enabled_services: pick_list(&self.enabled_services, &parent.enabled_services),
            disabled_services: pick_list(&self.disabled_services, &parent.disabled_services),
            default_target: pick(self.default_target.as_ref(), parent.default_target.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_come_from_parent() {
        let parent = ImageConfig {
            timezone: Some("UTC".into()),
            locale: Some("en_US".into()),
            enabled_services: vec!["sshd.service".into()],
            ..ImageConfig::default()
        };
        let child = ImageConfig {
            locale: Some("de_DE".into()),
            default_target: Some("multi-user.target".into()),
            ..ImageConfig::default()
        };
        let merged = child.inherit_from(&parent);
        assert_eq!(merged.timezone.as_deref(), Some("UTC"));
        assert_eq!(merged.locale.as_deref(), Some("de_DE"));
        assert_eq!(merged.enabled_services, vec!["sshd.service"]);
        assert_eq!(merged.default_target.as_deref(), Some("multi-user.target"));
    }

    #[test]
    fn own_service_list_replaces_parent() {
        let parent = ImageConfig::with_services(&["a.service"]);
        let child = ImageConfig::with_services(&["b.service", "c.service"]);
        assert_eq!(
            child.inherit_from(&parent).enabled_services,
            vec!["b.service", "c.service"]
        );
    }
}
