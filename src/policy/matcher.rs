use super::{IMPLICIT_DENY_ID, PolicyRule};
use crate::address::ZoneName;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::flow::Flow;

/// A device's policy list, kept in declaration order.
///
/// Evaluation returns the first enabled rule whose source, destination and
/// service sets all match. Later rules never influence the outcome, even when
/// they would match too.
#[derive(Debug, Clone, Default)]
pub struct PolicyMatcher {
    rules: Vec<PolicyRule>,
}

impl PolicyMatcher {
    /// Validates the rule list and records each rule's position.
    pub fn new(device_id: &str, mut rules: Vec<PolicyRule>) -> AnalyzerResult<Self> {
        let invalid = |reason: String| AnalyzerError::InvalidRule {
            device_id: device_id.to_string(),
            reason,
        };

        for (i, rule) in rules.iter().enumerate() {
            if rule.id == IMPLICIT_DENY_ID {
                return Err(invalid(format!(
                    "rule id {} is reserved for the implicit deny",
                    IMPLICIT_DENY_ID
                )));
            }
            if rules[i + 1..].iter().any(|r| r.id == rule.id) {
                return Err(invalid(format!("duplicate rule id {}", rule.id)));
            }
            if rule.sources.is_empty() || rule.destinations.is_empty() || rule.services.is_empty()
            {
                return Err(invalid(format!(
                    "rule {} needs at least one source, destination and service",
                    rule.id
                )));
            }
        }

        for (position, rule) in rules.iter_mut().enumerate() {
            rule.position = position;
            rule.device_id = device_id.to_string();
        }

        Ok(PolicyMatcher { rules })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// First matching rule, or `None` when the implicit deny applies.
    pub fn match_policy(
        &self,
        flow: &Flow,
        src_zone: &ZoneName,
        dst_zone: &ZoneName,
    ) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .find(|r| Self::matches_flow(r, flow, src_zone, dst_zone))
    }

    fn matches_flow(rule: &PolicyRule, flow: &Flow, src_zone: &ZoneName, dst_zone: &ZoneName) -> bool {
        if !rule.sources.iter().any(|s| s.matches(flow.src_ip(), src_zone)) {
            return false;
        }

        if !rule
            .destinations
            .iter()
            .any(|d| d.matches(flow.dst_ip(), dst_zone))
        {
            return false;
        }

        rule.services
            .iter()
            .any(|s| s.matches(flow.protocol(), flow.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AddressMatch, PolicyAction, ServiceCatalog, ServiceMatch};
    use proptest::prelude::*;

    fn make_rule(id: u32, src: &str, dst: &str, services: &[&str], action: PolicyAction) -> PolicyRule {
        let catalog = ServiceCatalog::default();
        PolicyRule {
            id,
            name: format!("rule-{}", id),
            device_id: String::new(),
            position: 0,
            sources: vec![AddressMatch::parse(src)],
            destinations: vec![AddressMatch::parse(dst)],
            services: services
                .iter()
                .map(|s| match *s {
                    "any" => ServiceMatch::Any,
                    name => ServiceMatch::Service(catalog.get(name).unwrap().clone()),
                })
                .collect(),
            action,
            nat: false,
            enabled: true,
        }
    }

    fn lan() -> ZoneName {
        ZoneName::new("LAN")
    }

    fn dmz() -> ZoneName {
        ZoneName::new("DMZ")
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = PolicyMatcher::new(
            "fw1",
            vec![
                make_rule(1, "LAN", "DMZ", &["HTTP", "HTTPS", "SSH"], PolicyAction::Accept),
                make_rule(2, "any", "any", &["any"], PolicyAction::Deny),
            ],
        )
        .unwrap();

        let web = Flow::parse("192.168.1.100", "172.16.10.50", "tcp", 80).unwrap();
        let rule = matcher.match_policy(&web, &lan(), &dmz()).unwrap();
        assert_eq!(rule.id, 1);
        assert_eq!(rule.position, 0);
        assert_eq!(rule.device_id, "fw1");

        let smb = Flow::parse("192.168.1.100", "172.16.10.50", "tcp", 445).unwrap();
        let rule = matcher.match_policy(&smb, &lan(), &dmz()).unwrap();
        assert_eq!(rule.id, 2);
        assert_eq!(rule.action, PolicyAction::Deny);
    }

    #[test]
    fn test_no_match_is_none() {
        let matcher = PolicyMatcher::new(
            "fw1",
            vec![make_rule(1, "LAN", "DMZ", &["HTTP"], PolicyAction::Accept)],
        )
        .unwrap();

        let flow = Flow::parse("172.16.10.50", "192.168.1.100", "tcp", 80).unwrap();
        assert!(matcher.match_policy(&flow, &dmz(), &lan()).is_none());
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let mut allow = make_rule(1, "any", "any", &["any"], PolicyAction::Accept);
        allow.enabled = false;
        let matcher = PolicyMatcher::new(
            "fw1",
            vec![allow, make_rule(2, "any", "any", &["any"], PolicyAction::Deny)],
        )
        .unwrap();

        let flow = Flow::parse("192.168.1.5", "192.168.1.6", "udp", 53).unwrap();
        assert_eq!(matcher.match_policy(&flow, &lan(), &lan()).unwrap().id, 2);
    }

    #[test]
    fn test_intra_zone_is_evaluated() {
        let matcher = PolicyMatcher::new(
            "fw1",
            vec![make_rule(1, "LAN", "DMZ", &["any"], PolicyAction::Accept)],
        )
        .unwrap();

        let flow = Flow::parse("192.168.1.5", "192.168.1.6", "tcp", 22).unwrap();
        assert!(matcher.match_policy(&flow, &lan(), &lan()).is_none());
    }

    #[test]
    fn test_address_and_zone_entries() {
        let matcher = PolicyMatcher::new(
            "fw1",
            vec![make_rule(7, "192.168.1.0/25", "DMZ", &["SSH"], PolicyAction::Accept)],
        )
        .unwrap();

        let inside = Flow::parse("192.168.1.10", "172.16.10.5", "tcp", 22).unwrap();
        let outside = Flow::parse("192.168.1.200", "172.16.10.5", "tcp", 22).unwrap();
        assert!(matcher.match_policy(&inside, &lan(), &dmz()).is_some());
        assert!(matcher.match_policy(&outside, &lan(), &dmz()).is_none());
    }

    #[test]
    fn test_validation() {
        let dup = PolicyMatcher::new(
            "fw1",
            vec![
                make_rule(3, "any", "any", &["any"], PolicyAction::Accept),
                make_rule(3, "any", "any", &["any"], PolicyAction::Deny),
            ],
        );
        assert!(matches!(dup, Err(AnalyzerError::InvalidRule { .. })));

        let reserved = PolicyMatcher::new(
            "fw1",
            vec![make_rule(0, "any", "any", &["any"], PolicyAction::Accept)],
        );
        assert!(reserved.is_err());

        let mut empty = make_rule(4, "any", "any", &["any"], PolicyAction::Accept);
        empty.services.clear();
        assert!(PolicyMatcher::new("fw1", vec![empty]).is_err());
    }

    proptest! {
        #[test]
        fn prop_earliest_matching_rule_decides(
            actions in proptest::collection::vec(any::<bool>(), 1..10),
            matching in proptest::collection::vec(any::<bool>(), 1..10),
        ) {
            let n = actions.len().min(matching.len());
            let rules: Vec<PolicyRule> = (0..n)
                .map(|i| {
                    let action = if actions[i] { PolicyAction::Accept } else { PolicyAction::Deny };
                    let dst = if matching[i] { "DMZ" } else { "WAN" };
                    make_rule(i as u32 + 1, "any", dst, &["any"], action)
                })
                .collect();
            let matcher = PolicyMatcher::new("fw1", rules).unwrap();

            let flow = Flow::parse("192.168.1.1", "172.16.10.1", "tcp", 443).unwrap();
            let result = matcher.match_policy(&flow, &lan(), &dmz());

            match matching[..n].iter().position(|m| *m) {
                Some(first) => {
                    let rule = result.unwrap();
                    prop_assert_eq!(rule.position, first);
                    let expected = if actions[first] { PolicyAction::Accept } else { PolicyAction::Deny };
                    prop_assert_eq!(rule.action, expected);
                }
                None => prop_assert!(result.is_none()),
            }
        }
    }
}
