//! Canonical event-type derivation.
//!
//! Firewalls report a `(type, subtype, action)` triple with vendor-specific
//! spellings; the rules engine matches on a small canonical vocabulary
//! (`vpn_login_fail`, `admin_login_fail`, `config_change`, ...). The mapping
//! is a pure function so the same raw log always yields the same type.

/// Derive the canonical event type from a parsed `(type, subtype, action)`.
///
/// Unknown-but-complete pairs fall back to `"<type>_<subtype>"`; logs
/// missing both type and subtype map to `"unknown"`.
pub fn map_event_type(log_type: &str, subtype: &str, action: &str) -> String {
    let t = log_type.to_ascii_lowercase();
    let s = subtype.to_ascii_lowercase();
    let a = action.to_ascii_lowercase();

    match (t.as_str(), s.as_str(), a.as_str()) {
        ("event", "vpn", "ssl-login-fail") => "vpn_login_fail".to_string(),
        ("event", "vpn", "ssl-login-ok") => "vpn_login_ok".to_string(),
        ("event", "vpn", "tunnel-up") => "vpn_tunnel_up".to_string(),
        ("event", "vpn", "tunnel-down") => "vpn_tunnel_down".to_string(),

        ("event", "system" | "admin", "login-failed" | "admin-login-failed") => {
            "admin_login_fail".to_string()
        }
        ("event", "system" | "admin", "login" | "admin-login-ok") => "admin_login_ok".to_string(),
        ("event", "system", "logout" | "admin-logout") => "admin_logout".to_string(),

        // Configuration object edits all collapse to one type; the rules
        // engine thresholds on bursts rather than on the edit kind.
        ("event", "system", "edit" | "add" | "delete" | "add-object" | "delete-object") => {
            "config_change".to_string()
        }

        ("utm", "virus", _) => "av_detection".to_string(),
        ("utm", "ips", _) => "ips_alert".to_string(),
        ("utm", "webfilter", _) => "web_block".to_string(),

        ("traffic", _, "deny" | "blocked") => "traffic_deny".to_string(),
        ("traffic", _, "accept" | "close" | "timeout") => "traffic_allow".to_string(),

        ("", "", _) => "unknown".to_string(),
        (t, "", _) => t.to_string(),
        (t, s, _) => format!("{t}_{s}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpn_login_failure_maps_to_canonical_type() {
        assert_eq!(
            map_event_type("event", "vpn", "ssl-login-fail"),
            "vpn_login_fail"
        );
    }

    #[test]
    fn admin_login_failure_accepts_both_subtypes() {
        assert_eq!(
            map_event_type("event", "system", "login-failed"),
            "admin_login_fail"
        );
        assert_eq!(
            map_event_type("event", "admin", "login-failed"),
            "admin_login_fail"
        );
    }

    #[test]
    fn config_edits_collapse_to_config_change() {
        for action in ["Edit", "Add", "Delete"] {
            assert_eq!(
                map_event_type("event", "system", action),
                "config_change",
                "action {action} should map to config_change"
            );
        }
    }

    #[test]
    fn unknown_pair_falls_back_to_type_subtype() {
        assert_eq!(map_event_type("event", "wad", "whatever"), "event_wad");
    }

    #[test]
    fn missing_fields_fall_back_to_unknown() {
        assert_eq!(map_event_type("", "", ""), "unknown");
        assert_eq!(map_event_type("event", "", ""), "event");
    }

    #[test]
    fn mapping_is_case_insensitive() {
        assert_eq!(
            map_event_type("Event", "VPN", "SSL-Login-Fail"),
            "vpn_login_fail"
        );
    }
}
