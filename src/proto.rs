//! Wire frames: inbound message decoding and outbound frame building.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::event::Event;
use crate::filter::Filter;

/// Decoded inbound client message.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Publish(Event),
    /// `["REQ", <sub_id>, <filter>, ...]`
    Subscribe { sub_id: String, filters: Vec<Filter> },
    /// `["COUNT", <sub_id>, <filter>, ...]`
    Count { sub_id: String, filters: Vec<Filter> },
    /// `["CLOSE", <sub_id>]`
    Unsubscribe { sub_id: String },
}

impl ClientMessage {
    /// Decode a single text frame. Malformed frames and unknown tags are
    /// errors; the session surfaces them as a NOTICE and continues.
    pub fn decode(text: &str) -> Result<Self> {
        let val: Value = serde_json::from_str(text)?;
        let Some(arr) = val.as_array() else {
            bail!("message is not a JSON array");
        };
        let Some(tag) = arr.first().and_then(Value::as_str) else {
            bail!("message has no leading tag");
        };
        match tag {
            "EVENT" => {
                let Some(obj) = arr.get(1) else {
                    bail!("EVENT frame has no event object");
                };
                let ev: Event = serde_json::from_value(obj.clone())?;
                Ok(ClientMessage::Publish(ev))
            }
            "REQ" => {
                let (sub_id, filters) = decode_sub_frame(arr, "REQ")?;
                Ok(ClientMessage::Subscribe { sub_id, filters })
            }
            "COUNT" => {
                let (sub_id, filters) = decode_sub_frame(arr, "COUNT")?;
                Ok(ClientMessage::Count { sub_id, filters })
            }
            "CLOSE" => {
                let Some(sub_id) = arr.get(1).and_then(Value::as_str) else {
                    bail!("CLOSE frame has no subscription id");
                };
                Ok(ClientMessage::Unsubscribe {
                    sub_id: sub_id.to_string(),
                })
            }
            other => bail!("unknown message tag {other:?}"),
        }
    }
}

fn decode_sub_frame(arr: &[Value], tag: &str) -> Result<(String, Vec<Filter>)> {
    let Some(sub_id) = arr.get(1).and_then(Value::as_str) else {
        bail!("{tag} frame has no subscription id");
    };
    let mut filters = Vec::new();
    for val in &arr[2..] {
        let Some(f) = Filter::from_value(val) else {
            bail!("{tag} filter is not an object");
        };
        filters.push(f);
    }
    if filters.is_empty() {
        bail!("{tag} frame has no filters");
    }
    Ok((sub_id.to_string(), filters))
}

/// `["EVENT", <sub_id>, <event>]` delivery frame.
pub fn event_frame(sub_id: &str, ev: &Event) -> String {
    serde_json::json!(["EVENT", sub_id, ev]).to_string()
}

/// `["EOSE", <sub_id>]` end-of-stored-events marker.
pub fn eose_frame(sub_id: &str) -> String {
    serde_json::json!(["EOSE", sub_id]).to_string()
}

/// `["OK", <event_id>, <accepted>, <reason>]` publish acknowledgement.
pub fn ok_frame(event_id: &str, accepted: bool, reason: &str) -> String {
    serde_json::json!(["OK", event_id, accepted, reason]).to_string()
}

/// `["COUNT", <sub_id>, {"count": n}]` count response.
pub fn count_frame(sub_id: &str, count: u64) -> String {
    serde_json::json!(["COUNT", sub_id, { "count": count }]).to_string()
}

/// `["NOTICE", <text>]` out-of-band diagnostic.
pub fn notice_frame(text: &str) -> String {
    serde_json::json!(["NOTICE", text]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_publish() {
        let ev = json!({
            "id": "aa", "pubkey": "p", "created_at": 1, "kind": 1,
            "tags": [["t", "x"]], "content": "", "sig": ""
        });
        let msg = ClientMessage::decode(&json!(["EVENT", ev]).to_string()).unwrap();
        match msg {
            ClientMessage::Publish(ev) => {
                assert_eq!(ev.id, "aa");
                assert_eq!(ev.kind, 1);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn decodes_subscribe_with_filters() {
        let raw = json!(["REQ", "sub1", {"kinds": [1]}, {"authors": ["p"]}]).to_string();
        let msg = ClientMessage::decode(&raw).unwrap();
        match msg {
            ClientMessage::Subscribe { sub_id, filters } => {
                assert_eq!(sub_id, "sub1");
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].kinds.as_ref().unwrap(), &vec![1]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn decodes_count_and_close() {
        let msg = ClientMessage::decode(&json!(["COUNT", "c", {}]).to_string()).unwrap();
        assert!(matches!(msg, ClientMessage::Count { .. }));
        let msg = ClientMessage::decode(&json!(["CLOSE", "c"]).to_string()).unwrap();
        match msg {
            ClientMessage::Unsubscribe { sub_id } => assert_eq!(sub_id, "c"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(ClientMessage::decode("not json").is_err());
        assert!(ClientMessage::decode("{}").is_err());
        assert!(ClientMessage::decode("[]").is_err());
        assert!(ClientMessage::decode(r#"[42, "x"]"#).is_err());
        assert!(ClientMessage::decode(r#"["AUTH", "x"]"#).is_err());
        assert!(ClientMessage::decode(r#"["EVENT"]"#).is_err());
        assert!(ClientMessage::decode(r#"["EVENT", {"id": 5}]"#).is_err());
        assert!(ClientMessage::decode(r#"["REQ", "s"]"#).is_err());
        assert!(ClientMessage::decode(r#"["REQ", "s", "oops"]"#).is_err());
        assert!(ClientMessage::decode(r#"["CLOSE"]"#).is_err());
    }

    #[test]
    fn frame_builders_shape() {
        let ev = crate::event::Event {
            id: "aa".into(),
            pubkey: "p".into(),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        let v: serde_json::Value = serde_json::from_str(&event_frame("s", &ev)).unwrap();
        assert_eq!(v[0], "EVENT");
        assert_eq!(v[1], "s");
        assert_eq!(v[2]["id"], "aa");

        let v: serde_json::Value = serde_json::from_str(&eose_frame("s")).unwrap();
        assert_eq!(v[0], "EOSE");

        let v: serde_json::Value = serde_json::from_str(&ok_frame("aa", false, "invalid: signature")).unwrap();
        assert_eq!(v[0], "OK");
        assert_eq!(v[1], "aa");
        assert_eq!(v[2], false);
        assert_eq!(v[3], "invalid: signature");

        let v: serde_json::Value = serde_json::from_str(&count_frame("s", 7)).unwrap();
        assert_eq!(v[2]["count"], 7);

        let v: serde_json::Value = serde_json::from_str(&notice_frame("oops")).unwrap();
        assert_eq!(v[0], "NOTICE");
        assert_eq!(v[1], "oops");
    }
}
