//! FortiGate key=value log parser.
//!
//! FortiGate units emit lines of `key=value` pairs, values optionally
//! double-quoted:
//!
//! ```text
//! date=2025-06-01 time=12:30:45 devname="FGT60E" logid="0101039424" \
//! type="event" subtype="vpn" level="alert" vd="root" tz="+0200" \
//! action="ssl-login-fail" user="alice" remip=203.0.113.9 \
//! msg="SSL user failed to log in"
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::parse::{LogParser, ParseError, ParsedLog};

/// Parser for FortiGate key=value syslog lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct FortigateParser;

impl LogParser for FortigateParser {
    fn vendor(&self) -> &'static str {
        "fortinet"
    }

    fn product(&self) -> &'static str {
        "fortigate"
    }

    fn parse(&self, raw: &str) -> Result<ParsedLog, ParseError> {
        let line = strip_syslog_priority(raw.trim());
        let mut kv = tokenize(line);

        if kv.is_empty() {
            return Err(ParseError::Unrecognized(truncate_for_error(raw)));
        }

        let mut parsed = ParsedLog {
            ts: derive_timestamp(&kv),
            log_type: kv.remove("type"),
            subtype: kv.remove("subtype"),
            action: kv.remove("action"),
            level: kv.remove("level"),
            src_ip: kv.remove("srcip").or_else(|| kv.remove("remip")),
            dst_ip: kv.remove("dstip"),
            src_user: kv.remove("user").or_else(|| kv.remove("srcuser")),
            dst_user: kv.remove("dstuser"),
            src_port: take_port(&mut kv, "srcport"),
            dst_port: take_port(&mut kv, "dstport"),
            interface: kv.remove("srcintf"),
            vdom: kv.remove("vd"),
            policy_id: kv.remove("policyid"),
            session_id: kv.remove("sessionid"),
            message: kv.remove("msg").or_else(|| kv.remove("logdesc")),
            kv: BTreeMap::new(),
        };

        // Some login events only carry the peer address inside the message,
        // e.g. `msg="Administrator login failed from GUI(203.0.113.9)"`.
        if parsed.src_ip.is_none() {
            if let Some(msg) = &parsed.message {
                parsed.src_ip = extract_parenthesized_ip(msg);
            }
        }

        // Whatever did not map to a typed field travels as opaque context.
        parsed.kv = kv;

        Ok(parsed)
    }
}

/// Drop an RFC 3164 priority prefix like `<189>` if present.
fn strip_syslog_priority(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            if rest[..end].chars().all(|c| c.is_ascii_digit()) {
                return &rest[end + 1..];
            }
        }
    }
    line
}

/// Split a line of `key=value` pairs, honouring double-quoted values.
fn tokenize(line: &str) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        // Key runs up to '='.
        let mut key_end = None;
        for (i, c) in chars.by_ref() {
            if c == '=' {
                key_end = Some(i);
                break;
            }
            if c.is_whitespace() {
                break;
            }
        }
        let Some(eq) = key_end else {
            continue;
        };
        let key = line[start..eq].to_string();

        // Value: quoted or bare.
        let value = match chars.peek() {
            Some(&(vstart, '"')) => {
                chars.next();
                let content_start = vstart + 1;
                let mut content_end = line.len();
                for (i, c) in chars.by_ref() {
                    if c == '"' {
                        content_end = i;
                        break;
                    }
                }
                line[content_start..content_end.min(line.len())].to_string()
            }
            Some(&(vstart, _)) => {
                let mut content_end = line.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() {
                        content_end = i;
                        break;
                    }
                    chars.next();
                }
                line[vstart..content_end].to_string()
            }
            None => String::new(),
        };

        if !key.is_empty() {
            pairs.insert(key.to_ascii_lowercase(), value);
        }
    }

    pairs
}

/// Assemble a timestamp from `date`, `time`, and optional `tz` fields.
///
/// `tz` is a `+HHMM`/`-HHMM` offset; when absent the timestamp is taken
/// as UTC. Returns `None` when date or time are missing or malformed, so
/// the normalizer falls back to `received_at`.
fn derive_timestamp(kv: &BTreeMap<String, String>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(kv.get("date")?, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(kv.get("time")?, "%H:%M:%S").ok()?;
    let naive = date.and_time(time);

    let offset = kv
        .get("tz")
        .and_then(|tz| parse_tz_offset(tz))
        .unwrap_or(FixedOffset::east_opt(0)?);

    Some(
        naive
            .and_local_timezone(offset)
            .single()?
            .with_timezone(&Utc),
    )
}

/// Parse `+HHMM` / `-HHMM` into a fixed offset.
fn parse_tz_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => (1, tz),
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn take_port(kv: &mut BTreeMap<String, String>, key: &str) -> Option<i32> {
    kv.remove(key).and_then(|v| v.parse().ok())
}

/// Find the first `(a.b.c.d)` group holding a valid IPv4 address.
fn extract_parenthesized_ip(msg: &str) -> Option<String> {
    let mut rest = msg;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        if let Some(close) = after.find(')') {
            let candidate = &after[..close];
            if candidate.parse::<Ipv4Addr>().is_ok() {
                return Some(candidate.to_string());
            }
            rest = &after[close + 1..];
        } else {
            break;
        }
    }
    None
}

fn truncate_for_error(raw: &str) -> String {
    const MAX: usize = 120;
    if raw.len() > MAX {
        format!("{}...", &raw[..MAX])
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const VPN_FAIL: &str = "date=2025-06-01 time=12:30:45 devname=\"FGT60E\" \
        logid=\"0101039424\" type=\"event\" subtype=\"vpn\" level=\"alert\" \
        vd=\"root\" tz=\"+0200\" action=\"ssl-login-fail\" user=\"alice\" \
        remip=203.0.113.9 msg=\"SSL user failed to log in\"";

    #[test]
    fn parses_a_full_vpn_failure_line() {
        let parsed = FortigateParser.parse(VPN_FAIL).unwrap();
        assert_eq!(parsed.log_type.as_deref(), Some("event"));
        assert_eq!(parsed.subtype.as_deref(), Some("vpn"));
        assert_eq!(parsed.action.as_deref(), Some("ssl-login-fail"));
        assert_eq!(parsed.level.as_deref(), Some("alert"));
        assert_eq!(parsed.src_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(parsed.src_user.as_deref(), Some("alice"));
        assert_eq!(parsed.vdom.as_deref(), Some("root"));
        assert_eq!(parsed.message.as_deref(), Some("SSL user failed to log in"));
        // devname/logid did not map to typed fields and stay in kv.
        assert_eq!(parsed.kv.get("devname").map(String::as_str), Some("FGT60E"));
        assert_eq!(
            parsed.kv.get("logid").map(String::as_str),
            Some("0101039424")
        );
    }

    #[test]
    fn timestamp_honours_the_tz_offset() {
        let parsed = FortigateParser.parse(VPN_FAIL).unwrap();
        let ts = parsed.ts.expect("line carries date+time+tz");
        // 12:30:45 at +0200 is 10:30:45 UTC.
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.minute(), 30);
        assert_eq!(ts.second(), 45);
    }

    #[test]
    fn missing_tz_defaults_to_utc() {
        let parsed = FortigateParser
            .parse("date=2025-06-01 time=08:00:00 type=event subtype=system action=login")
            .unwrap();
        assert_eq!(parsed.ts.unwrap().hour(), 8);
    }

    #[test]
    fn malformed_date_yields_no_timestamp() {
        let parsed = FortigateParser
            .parse("date=junk time=08:00:00 type=event subtype=system")
            .unwrap();
        assert!(parsed.ts.is_none());
    }

    #[test]
    fn syslog_priority_prefix_is_stripped() {
        let parsed = FortigateParser
            .parse("<189>date=2025-06-01 time=08:00:00 type=traffic subtype=forward action=deny")
            .unwrap();
        assert_eq!(parsed.log_type.as_deref(), Some("traffic"));
    }

    #[test]
    fn src_ip_falls_back_to_the_message_pattern() {
        let parsed = FortigateParser
            .parse(
                "date=2025-06-01 time=09:00:00 type=event subtype=system \
                 action=login-failed user=admin \
                 msg=\"Administrator admin login failed from GUI(192.168.100.50)\"",
            )
            .unwrap();
        assert_eq!(parsed.src_ip.as_deref(), Some("192.168.100.50"));
    }

    #[test]
    fn ports_parse_as_integers() {
        let parsed = FortigateParser
            .parse("type=traffic subtype=forward action=accept srcip=10.0.0.1 srcport=51543 dstip=8.8.8.8 dstport=53")
            .unwrap();
        assert_eq!(parsed.src_port, Some(51543));
        assert_eq!(parsed.dst_port, Some(53));
    }

    #[test]
    fn non_kv_line_is_unrecognized() {
        let err = FortigateParser
            .parse("Jun  1 12:00:00 host sshd[123]: Accepted publickey")
            .unwrap_err();
        assert!(matches!(err, ParseError::Unrecognized(_)));
    }
}
