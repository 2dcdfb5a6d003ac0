//! Postback parsing — untrusted key/value input → typed `NewEvent`.
//!
//! Wire fields: `uid, cid, status, payout, eid, sid, lid`. Every field is
//! optional; missing or empty values fall back to `N/A` / `unknown` / `0`.

use serde_json::Value;
use tracing::debug;

use super::types::{parse_payout, NewEvent, TraderStatus, NOT_AVAILABLE};
use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostbackParams {
    pub uid: Option<String>,
    pub cid: Option<String>,
    pub status: Option<String>,
    pub payout: Option<String>,
    pub eid: Option<String>,
    pub sid: Option<String>,
    pub lid: Option<String>,
}

impl PostbackParams {
    /// First occurrence of a key wins; empty values count as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut p = Self::default();
        for (k, v) in pairs {
            let slot = match k.as_ref() {
                "uid" => &mut p.uid,
                "cid" => &mut p.cid,
                "status" => &mut p.status,
                "payout" => &mut p.payout,
                "eid" => &mut p.eid,
                "sid" => &mut p.sid,
                "lid" => &mut p.lid,
                _ => continue,
            };
            if slot.is_none() {
                let v: String = v.into();
                if !v.is_empty() {
                    *slot = Some(v);
                }
            }
        }
        p
    }

    /// `uid=1&payout=15` style input (query string or form body).
    pub fn from_urlencoded(raw: &[u8]) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(raw).map(|(k, v)| (k, v.into_owned())))
    }

    /// JSON object body. Scalars are stringified; nested values are ignored.
    pub fn from_json(raw: &[u8]) -> RelayResult<Self> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| RelayError::MalformedInput(format!("postback body is not JSON: {}", e)))?;
        let Value::Object(map) = value else {
            return Err(RelayError::MalformedInput("postback body is not a JSON object".into()));
        };
        Ok(Self::from_pairs(map.into_iter().filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k, s))
        })))
    }

    /// Body of a non-GET request, dispatched on content type.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> RelayResult<Self> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(body)
        } else {
            Ok(Self::from_urlencoded(body))
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn into_event(self) -> NewEvent {
        let payout = parse_payout(self.payout.as_deref().unwrap_or("0"));
        if let Some(raw) = &self.payout {
            if payout.is_zero() && raw.trim() != "0" {
                debug!("📥 Unparseable payout {:?} stored as 0", raw);
            }
        }
        NewEvent {
            trader_id: self.uid.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            click_id: self.cid.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            status: self.status.map(TraderStatus::from).unwrap_or(TraderStatus::Unknown),
            payout,
            event_id: self.eid.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            site_id: self.sid.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            landing_id: self.lid.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_query_string() {
        let p = PostbackParams::from_urlencoded(b"uid=123&cid=abc&status=ftd&payout=15&eid=e1&sid=s1&lid=l1&extra=x");
        let ev = p.into_event();
        assert_eq!(ev.trader_id, "123");
        assert_eq!(ev.click_id, "abc");
        assert_eq!(ev.status, TraderStatus::Ftd);
        assert_eq!(ev.payout, dec!(15));
        assert_eq!(ev.landing_id, "l1");
    }

    #[test]
    fn test_defaults_for_missing_and_empty() {
        let ev = PostbackParams::from_urlencoded(b"uid=&status=").into_event();
        assert_eq!(ev.trader_id, NOT_AVAILABLE);
        assert_eq!(ev.click_id, NOT_AVAILABLE);
        assert_eq!(ev.status, TraderStatus::Unknown);
        assert_eq!(ev.payout, Decimal::ZERO);
    }

    #[test]
    fn test_non_numeric_payout_is_zero() {
        let ev = PostbackParams::from_urlencoded(b"uid=5&payout=ten%20dollars").into_event();
        assert_eq!(ev.payout, Decimal::ZERO);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let p = PostbackParams::from_urlencoded(b"uid=1&uid=2");
        assert_eq!(p.uid.as_deref(), Some("1"));
    }

    #[test]
    fn test_json_body_with_numbers() {
        let p = PostbackParams::from_body(
            Some("application/json; charset=utf-8"),
            br#"{"uid": 777, "status": "ftd", "payout": 12.5, "cid": null}"#,
        )
        .unwrap();
        assert_eq!(p.uid.as_deref(), Some("777"));
        assert_eq!(p.cid, None);
        assert_eq!(p.into_event().payout, dec!(12.5));
    }

    #[test]
    fn test_form_body_and_blank_body() {
        let p = PostbackParams::from_body(
            Some("application/x-www-form-urlencoded"),
            b"uid=9&payout=3",
        )
        .unwrap();
        assert_eq!(p.uid.as_deref(), Some("9"));
        assert!(PostbackParams::from_body(None, b"  ").unwrap().is_empty());
    }

    #[test]
    fn test_bad_json_is_malformed_input() {
        let err = PostbackParams::from_body(Some("application/json"), b"[1,2").unwrap_err();
        assert!(matches!(err, RelayError::MalformedInput(_)));
        let err = PostbackParams::from_json(b"[1,2]").unwrap_err();
        assert!(matches!(err, RelayError::MalformedInput(_)));
    }
}
