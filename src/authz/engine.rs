//! Ordered first-match rule evaluation.

use regex::Regex;
use tracing::debug;

use super::matchers::{self, NetworkMatcher, SubjectMatcher};
use super::types::{Object, PolicyLevel, Subject};

/// A single compiled access-control rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub domain: String,
    pub policy: PolicyLevel,
    pub subject: SubjectMatcher,
    pub networks: Vec<NetworkMatcher>,
    pub resources: Vec<Regex>,
}

/// Compiled access-control configuration.
///
/// Read-only after load. A hot reload must build a new value and swap it
/// whole; concurrent readers never observe a partial rule list.
#[derive(Debug, Clone)]
pub struct AccessControl {
    default_policy: PolicyLevel,
    rules: Vec<Rule>,
}

impl AccessControl {
    #[must_use]
    pub fn new(default_policy: PolicyLevel, rules: Vec<Rule>) -> Self {
        Self {
            default_policy,
            rules,
        }
    }

    #[must_use]
    pub fn default_policy(&self) -> PolicyLevel {
        self.default_policy
    }

    /// Resolve the policy level required for `subject` to reach `object`.
    ///
    /// Rules are narrowed by subject and network constraints, then by
    /// domain and resource constraints; the first survivor in declaration
    /// order is authoritative. There is no "most specific wins": operators
    /// author rule files assuming first-match-wins. With no survivor the
    /// default policy applies.
    #[must_use]
    pub fn required_level(&self, subject: &Subject, object: &Object) -> PolicyLevel {
        let mut candidates = self.rules.iter().filter(|rule| {
            rule.subject.matches(subject) && matchers::match_networks(&rule.networks, subject.ip)
        });

        let level = candidates
            .find(|rule| {
                matchers::match_domain(&rule.domain, &object.domain)
                    && matchers::match_resources(&rule.resources, &object.path)
            })
            .map_or(self.default_policy, |rule| rule.policy);

        debug!(
            username = %subject.username,
            domain = %object.domain,
            path = %object.path,
            ?level,
            "Resolved required policy level"
        );

        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use url::Url;

    fn rule(domain: &str, policy: PolicyLevel) -> Rule {
        Rule {
            domain: domain.to_string(),
            policy,
            subject: SubjectMatcher::Any,
            networks: Vec::new(),
            resources: Vec::new(),
        }
    }

    fn subject(username: &str, groups: &[&str]) -> Subject {
        Subject {
            username: username.to_string(),
            groups: groups.iter().map(ToString::to_string).collect(),
            ip: None,
        }
    }

    fn object(target: &str) -> Object {
        Object::from_url(&Url::parse(target).unwrap())
    }

    #[test]
    fn no_rules_falls_back_to_default() {
        let engine = AccessControl::new(PolicyLevel::Bypass, Vec::new());
        let level = engine.required_level(&subject("", &[]), &object("https://public.example.com/"));
        assert_eq!(level, PolicyLevel::Bypass);
    }

    #[test]
    fn subject_scoped_rule() {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![Rule {
                subject: SubjectMatcher::User("john".to_string()),
                ..rule("protected.example.com", PolicyLevel::Bypass)
            }],
        );
        let target = object("https://protected.example.com/");

        assert_eq!(
            engine.required_level(&subject("john", &[]), &target),
            PolicyLevel::Bypass
        );
        // bob does not match the rule and falls through to the default
        assert_eq!(
            engine.required_level(&subject("bob", &[]), &target),
            PolicyLevel::Denied
        );
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![
                rule("app.example.com", PolicyLevel::OneFactor),
                rule("app.example.com", PolicyLevel::TwoFactor),
            ],
        );
        assert_eq!(
            engine.required_level(&subject("", &[]), &object("https://app.example.com/")),
            PolicyLevel::OneFactor
        );
    }

    #[test]
    fn resource_ordering_scenario() -> Result<()> {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![
                Rule {
                    resources: vec![
                        Regex::new(r"^/bypass/[a-z]+$")?,
                        Regex::new(r"^/$")?,
                        Regex::new("embedded")?,
                    ],
                    ..rule("resource.example.com", PolicyLevel::Bypass)
                },
                Rule {
                    resources: vec![Regex::new(r"^/one_factor/[a-z]+$")?],
                    ..rule("resource.example.com", PolicyLevel::OneFactor)
                },
            ],
        );
        let anonymous = subject("", &[]);

        assert_eq!(
            engine.required_level(&anonymous, &object("https://resource.example.com/bypass/abc")),
            PolicyLevel::Bypass
        );
        // matches neither rule, falls to the default
        assert_eq!(
            engine.required_level(&anonymous, &object("https://resource.example.com/bypass/")),
            PolicyLevel::Denied
        );
        assert_eq!(
            engine.required_level(
                &anonymous,
                &object("https://resource.example.com/xyz/embedded/abc")
            ),
            PolicyLevel::Bypass
        );
        assert_eq!(
            engine.required_level(
                &anonymous,
                &object("https://resource.example.com/one_factor/abc")
            ),
            PolicyLevel::OneFactor
        );
        Ok(())
    }

    #[test]
    fn network_scoped_rule() -> Result<()> {
        let engine = AccessControl::new(
            PolicyLevel::TwoFactor,
            vec![Rule {
                networks: vec![
                    NetworkMatcher::parse("192.168.1.0/24")?,
                    NetworkMatcher::parse("10.0.0.1")?,
                ],
                ..rule("intranet.example.com", PolicyLevel::Bypass)
            }],
        );
        let target = object("https://intranet.example.com/");

        let mut inside = subject("", &[]);
        inside.ip = Some("192.168.1.20".parse()?);
        assert_eq!(engine.required_level(&inside, &target), PolicyLevel::Bypass);

        let mut exact = subject("", &[]);
        exact.ip = Some("10.0.0.1".parse()?);
        assert_eq!(engine.required_level(&exact, &target), PolicyLevel::Bypass);

        let mut outside = subject("", &[]);
        outside.ip = Some("10.0.0.2".parse()?);
        assert_eq!(
            engine.required_level(&outside, &target),
            PolicyLevel::TwoFactor
        );

        // no resolvable IP only satisfies the wildcard
        assert_eq!(
            engine.required_level(&subject("", &[]), &target),
            PolicyLevel::TwoFactor
        );
        Ok(())
    }

    #[test]
    fn group_scoped_rule() {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![Rule {
                subject: SubjectMatcher::Group("admins".to_string()),
                ..rule("admin.example.com", PolicyLevel::TwoFactor)
            }],
        );
        let target = object("https://admin.example.com/");

        assert_eq!(
            engine.required_level(&subject("john", &["admins"]), &target),
            PolicyLevel::TwoFactor
        );
        assert_eq!(
            engine.required_level(&subject("bob", &["dev"]), &target),
            PolicyLevel::Denied
        );
    }

    #[test]
    fn wildcard_domain_rule() {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![rule("*.example.com", PolicyLevel::OneFactor)],
        );
        let anonymous = subject("", &[]);

        assert_eq!(
            engine.required_level(&anonymous, &object("https://public.example.com/")),
            PolicyLevel::OneFactor
        );
        assert_eq!(
            engine.required_level(&anonymous, &object("https://example.com/")),
            PolicyLevel::Denied
        );
    }

    #[test]
    fn evaluation_is_pure() {
        let engine = AccessControl::new(
            PolicyLevel::Denied,
            vec![rule("app.example.com", PolicyLevel::OneFactor)],
        );
        let caller = subject("john", &["dev"]);
        let target = object("https://app.example.com/settings");

        let first = engine.required_level(&caller, &target);
        let second = engine.required_level(&caller, &target);
        assert_eq!(first, second);
        assert_eq!(first, PolicyLevel::OneFactor);
    }
}
