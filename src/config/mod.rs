//! Settings file schema, loading, and compilation.
//!
//! The settings file is YAML. Access-control entries are validated and
//! compiled here, at load time, so a malformed regex, network, or subject
//! rejects the configuration before any traffic is evaluated. Policy
//! names are the exception: an unknown name silently denies instead of
//! erroring, see [`PolicyLevel::from_name`].

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::authz::matchers::{NetworkMatcher, SubjectMatcher};
use crate::authz::types::PolicyLevel;
use crate::authz::{AccessControl, Rule};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub access_control: AccessControlSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub regulation: RegulationSettings,
    /// YAML users file backing the file-based authentication provider.
    pub users_file: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessControlSettings {
    /// Applied when no rule matches. Missing or unknown means deny.
    pub default_policy: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSettings>,
}

/// One rule as written by the operator, before compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSettings {
    pub domain: String,
    pub policy: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie name the proxy forwards back on every request.
    pub name: String,
    /// Mark the cookie `Secure`. Leave off only for plain-HTTP test rigs.
    pub secure: bool,
    /// Seconds of allowed inactivity before a session is destroyed.
    /// Zero disables the check.
    pub inactivity: i64,
    /// Absolute session lifetime in seconds.
    pub expiration: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "gardisto_session".to_string(),
            secure: false,
            inactivity: 300,
            expiration: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegulationSettings {
    /// Failed attempts tolerated inside `find_time`. Zero disables
    /// regulation entirely.
    pub max_retries: u32,
    /// Sliding window, in seconds, over which failures are counted.
    pub find_time: i64,
    /// Ban duration in seconds once `max_retries` is reached.
    pub ban_time: i64,
}

impl Default for RegulationSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            find_time: 120,
            ban_time: 300,
        }
    }
}

impl Settings {
    /// Load and parse the YAML settings file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_yaml::from_str(&raw).context("failed to parse settings file")
    }
}

impl AccessControlSettings {
    /// Compile into the read-only engine configuration.
    ///
    /// # Errors
    /// Returns an error for any malformed subject, network, or resource
    /// entry, naming the offending rule index.
    pub fn compile(&self) -> Result<AccessControl> {
        let default_policy = self
            .default_policy
            .as_deref()
            .map_or(PolicyLevel::Denied, PolicyLevel::from_name);

        let mut rules = Vec::with_capacity(self.rules.len());
        for (index, rule) in self.rules.iter().enumerate() {
            rules.push(
                rule.compile()
                    .with_context(|| format!("access_control.rules[{index}]"))?,
            );
        }

        Ok(AccessControl::new(default_policy, rules))
    }
}

impl RuleSettings {
    fn compile(&self) -> Result<Rule> {
        let subject = SubjectMatcher::parse(&self.subject)?;

        let networks = self
            .networks
            .iter()
            .map(|entry| NetworkMatcher::parse(entry))
            .collect::<Result<Vec<_>>>()?;

        // Patterns are compiled once here instead of on every evaluation.
        let resources = self
            .resources
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("invalid resource regex `{pattern}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Rule {
            domain: self.domain.clone(),
            policy: PolicyLevel::from_name(&self.policy),
            subject,
            networks,
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::{Object, Subject};
    use url::Url;

    #[test]
    fn parse_full_settings() -> Result<()> {
        let yaml = r"
users_file: /etc/gardisto/users.yml
session:
  name: my_session
  secure: true
  inactivity: 600
  expiration: 7200
regulation:
  max_retries: 5
  find_time: 60
  ban_time: 900
access_control:
  default_policy: deny
  rules:
    - domain: protected.example.com
      policy: bypass
      subject: 'user:john'
    - domain: '*.example.com'
      policy: two_factor
      networks:
        - 192.168.1.0/24
      resources:
        - '^/admin'
";
        let settings: Settings = serde_yaml::from_str(yaml)?;
        assert_eq!(settings.users_file, PathBuf::from("/etc/gardisto/users.yml"));
        assert_eq!(settings.session.name, "my_session");
        assert!(settings.session.secure);
        assert_eq!(settings.session.inactivity, 600);
        assert_eq!(settings.regulation.max_retries, 5);
        assert_eq!(settings.access_control.rules.len(), 2);

        let engine = settings.access_control.compile()?;
        assert_eq!(engine.default_policy(), PolicyLevel::Denied);
        Ok(())
    }

    #[test]
    fn session_defaults() -> Result<()> {
        let settings: Settings = serde_yaml::from_str("users_file: /tmp/users.yml")?;
        assert_eq!(settings.session.name, "gardisto_session");
        assert!(!settings.session.secure);
        assert_eq!(settings.session.inactivity, 300);
        assert_eq!(settings.session.expiration, 3600);
        assert_eq!(settings.regulation.max_retries, 3);
        Ok(())
    }

    #[test]
    fn missing_default_policy_denies() -> Result<()> {
        let engine = AccessControlSettings::default().compile()?;
        assert_eq!(engine.default_policy(), PolicyLevel::Denied);
        Ok(())
    }

    #[test]
    fn invalid_default_policy_denies() -> Result<()> {
        let settings = AccessControlSettings {
            default_policy: Some("allow-all".to_string()),
            rules: Vec::new(),
        };
        assert_eq!(settings.compile()?.default_policy(), PolicyLevel::Denied);
        Ok(())
    }

    #[test]
    fn invalid_rule_policy_denies_instead_of_erroring() -> Result<()> {
        let settings = AccessControlSettings {
            default_policy: Some("bypass".to_string()),
            rules: vec![RuleSettings {
                domain: "app.example.com".to_string(),
                policy: "allow".to_string(),
                subject: String::new(),
                networks: Vec::new(),
                resources: Vec::new(),
            }],
        };
        let engine = settings.compile()?;
        let object = Object::from_url(&Url::parse("https://app.example.com/")?);
        assert_eq!(
            engine.required_level(&Subject::default(), &object),
            PolicyLevel::Denied
        );
        Ok(())
    }

    #[test]
    fn malformed_regex_rejects_configuration() {
        let settings = AccessControlSettings {
            default_policy: None,
            rules: vec![RuleSettings {
                domain: "app.example.com".to_string(),
                policy: "bypass".to_string(),
                subject: String::new(),
                networks: Vec::new(),
                resources: vec!["[unclosed".to_string()],
            }],
        };
        assert!(settings.compile().is_err());
    }

    #[test]
    fn malformed_network_rejects_configuration() {
        let settings = AccessControlSettings {
            default_policy: None,
            rules: vec![RuleSettings {
                domain: "app.example.com".to_string(),
                policy: "bypass".to_string(),
                subject: String::new(),
                networks: vec!["500.1.1.1/24".to_string()],
                resources: Vec::new(),
            }],
        };
        assert!(settings.compile().is_err());
    }

    #[test]
    fn malformed_subject_rejects_configuration() {
        let settings = AccessControlSettings {
            default_policy: None,
            rules: vec![RuleSettings {
                domain: "app.example.com".to_string(),
                policy: "bypass".to_string(),
                subject: "role:admin".to_string(),
                networks: Vec::new(),
                resources: Vec::new(),
            }],
        };
        assert!(settings.compile().is_err());
    }
}
