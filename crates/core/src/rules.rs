//! Detection rule definitions and severity escalation.
//!
//! Rules live in `core` (zero internal deps) so the rules engine, the AI
//! cache invalidation hooks, and tests all share one table.
//!
//! Changing a rule's semantics (threshold, window, event types) changes
//! which incidents map to which cached AI responses; callers must invalidate
//! the AI cache by detection type after any such change because pattern
//! signatures do not carry a rule version.

use serde::Serialize;

use crate::severity::Severity;

// ---------------------------------------------------------------------------
// Rule schema
// ---------------------------------------------------------------------------

/// Grouping key a rule aggregates matching events by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    SrcIp,
    SrcUser,
    SrcIpUser,
}

/// A windowed threshold rule over canonical event types.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    /// Doubles as `Detection.detection_type`.
    pub name: &'static str,
    /// Canonical event types the rule matches (see [`crate::event_type`]).
    pub event_types: &'static [&'static str],
    /// Minimum matching events within the window to fire.
    pub threshold: i64,
    /// Sliding window width in minutes.
    pub window_minutes: i64,
    /// Base severity of produced detections (before escalation).
    pub severity: Severity,
    /// How matching events are grouped into candidate detections.
    pub group_by: GroupBy,
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// The built-in rule set evaluated on every pipeline tick.
pub const BUILTIN_RULES: &[Rule] = &[
    Rule {
        name: "vpn_bruteforce",
        event_types: &["vpn_login_fail"],
        threshold: 3,
        window_minutes: 15,
        severity: Severity::High,
        group_by: GroupBy::SrcIp,
    },
    Rule {
        name: "admin_bruteforce",
        event_types: &["admin_login_fail"],
        threshold: 3,
        window_minutes: 15,
        severity: Severity::Critical,
        group_by: GroupBy::SrcIp,
    },
    Rule {
        name: "config_change_burst",
        event_types: &["config_change"],
        threshold: 10,
        window_minutes: 5,
        severity: Severity::Medium,
        group_by: GroupBy::SrcUser,
    },
];

// ---------------------------------------------------------------------------
// Severity escalation
// ---------------------------------------------------------------------------

/// Escalate a rule's base severity for unusually large bursts.
///
/// One level up at 5x the threshold, two levels at 20x, capped at critical.
pub fn escalate_severity(base: Severity, event_count: i64, threshold: i64) -> Severity {
    if threshold <= 0 {
        return base;
    }
    if event_count >= threshold * 20 {
        base.raised().raised()
    } else if event_count >= threshold * 5 {
        base.raised()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_match_reference_thresholds() {
        let vpn = BUILTIN_RULES
            .iter()
            .find(|r| r.name == "vpn_bruteforce")
            .unwrap();
        assert_eq!(vpn.threshold, 3);
        assert_eq!(vpn.window_minutes, 15);
        assert_eq!(vpn.severity, Severity::High);
        assert_eq!(vpn.group_by, GroupBy::SrcIp);

        let admin = BUILTIN_RULES
            .iter()
            .find(|r| r.name == "admin_bruteforce")
            .unwrap();
        assert_eq!(admin.severity, Severity::Critical);

        let burst = BUILTIN_RULES
            .iter()
            .find(|r| r.name == "config_change_burst")
            .unwrap();
        assert_eq!(burst.threshold, 10);
        assert_eq!(burst.window_minutes, 5);
        assert_eq!(burst.group_by, GroupBy::SrcUser);
    }

    #[test]
    fn escalation_steps_at_5x_and_20x() {
        // threshold 3: 14 events is below 5x, 15 is at 5x, 60 is at 20x.
        assert_eq!(escalate_severity(Severity::Medium, 14, 3), Severity::Medium);
        assert_eq!(escalate_severity(Severity::Medium, 15, 3), Severity::High);
        assert_eq!(
            escalate_severity(Severity::Medium, 60, 3),
            Severity::Critical
        );
    }

    #[test]
    fn escalation_caps_at_critical() {
        assert_eq!(
            escalate_severity(Severity::Critical, 1000, 3),
            Severity::Critical
        );
        assert_eq!(escalate_severity(Severity::High, 60, 3), Severity::Critical);
    }

    #[test]
    fn zero_threshold_never_escalates() {
        assert_eq!(escalate_severity(Severity::Low, 1000, 0), Severity::Low);
    }
}
