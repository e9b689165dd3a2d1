//! Outbound commands and their serializers.
//!
//! Each serializer writes the JSON body directly after an 8-byte header slot
//! in `dest` and back-fills the header once the body length is known. Field
//! order is fixed; the peer does not care, but tests and captures do.

use crate::activity::{Reply, RichPresence};
use crate::codec::JsonWriter;
use crate::error::{Result, RpcError};
use crate::protocol::{finish_frame, Opcode, HEADER_SIZE, MAX_FRAME_SIZE};

/// Events an application can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Another user accepted an invite; carries a join secret.
    Join,
    /// Another user wants to spectate; carries a spectate secret.
    Spectate,
    /// Another user asked to join the party.
    JoinRequest,
}

impl EventKind {
    /// Every kind, in subscription order.
    pub const ALL: [EventKind; 3] = [EventKind::Join, EventKind::Spectate, EventKind::JoinRequest];

    /// Event name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Join => "ACTIVITY_JOIN",
            EventKind::Spectate => "ACTIVITY_SPECTATE",
            EventKind::JoinRequest => "ACTIVITY_JOIN_REQUEST",
        }
    }

    /// Bit used in subscription masks.
    pub fn bit(self) -> u8 {
        match self {
            EventKind::Join => 1,
            EventKind::Spectate => 1 << 1,
            EventKind::JoinRequest => 1 << 2,
        }
    }
}

/// A queued request for the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    UpdatePresence(Box<RichPresence>),
    ClearPresence,
    Subscribe(EventKind),
    Unsubscribe(EventKind),
    Respond { user_id: String, reply: Reply },
}

impl Command {
    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::UpdatePresence(_) => "update_presence",
            Command::ClearPresence => "clear_presence",
            Command::Subscribe(_) => "subscribe",
            Command::Unsubscribe(_) => "unsubscribe",
            Command::Respond { .. } => "respond",
        }
    }
}

/// Serialize the handshake frame `{"v":version,"client_id":...}`.
pub fn encode_handshake(version: i64, client_id: &str, dest: &mut [u8]) -> Result<usize> {
    let len = {
        let mut w = body_writer(dest)?;
        w.start_object()?;
        w.key("v")?;
        w.int(version)?;
        w.key("client_id")?;
        w.string(client_id)?;
        w.end_object()?;
        w.len()
    };
    finish_frame(Opcode::Handshake, len, dest)
}

/// Serialize `command` as a Message frame.
///
/// `nonce` is emitted as a decimal string; `pid` identifies the calling
/// process in presence commands.
///
/// # Errors
///
/// [`RpcError::Overflow`] if the frame does not fit in `dest` or in
/// [`MAX_FRAME_SIZE`].
pub fn encode_command(command: &Command, nonce: u64, pid: u32, dest: &mut [u8]) -> Result<usize> {
    let len = {
        let mut w = body_writer(dest)?;
        match command {
            Command::UpdatePresence(presence) => {
                write_presence(&mut w, nonce, pid, Some(presence.as_ref()))?
            }
            Command::ClearPresence => write_presence(&mut w, nonce, pid, None)?,
            Command::Subscribe(kind) => write_subscription(&mut w, nonce, "SUBSCRIBE", *kind)?,
            Command::Unsubscribe(kind) => write_subscription(&mut w, nonce, "UNSUBSCRIBE", *kind)?,
            Command::Respond { user_id, reply } => write_join_reply(&mut w, nonce, user_id, *reply)?,
        }
        w.len()
    };
    finish_frame(Opcode::Message, len, dest)
}

/// Writer over the body region of a frame buffer, capped at one frame.
fn body_writer(dest: &mut [u8]) -> Result<JsonWriter<'_>> {
    if dest.len() < HEADER_SIZE {
        return Err(RpcError::Overflow);
    }
    let end = dest.len().min(MAX_FRAME_SIZE);
    Ok(JsonWriter::new(&mut dest[HEADER_SIZE..end]))
}

fn write_nonce(w: &mut JsonWriter<'_>, nonce: u64) -> Result<()> {
    w.key("nonce")?;
    w.uint_string(nonce)
}

fn write_presence(
    w: &mut JsonWriter<'_>,
    nonce: u64,
    pid: u32,
    presence: Option<&RichPresence>,
) -> Result<()> {
    w.start_object()?;
    write_nonce(w, nonce)?;
    w.key("cmd")?;
    w.string("SET_ACTIVITY")?;

    w.key("args")?;
    w.start_object()?;
    w.key("pid")?;
    w.int(i64::from(pid))?;
    if let Some(presence) = presence {
        w.key("activity")?;
        write_activity(w, presence)?;
    }
    w.end_object()?;

    w.end_object()
}

fn write_activity(w: &mut JsonWriter<'_>, p: &RichPresence) -> Result<()> {
    w.start_object()?;
    w.key("type")?;
    w.int(p.activity_type.code())?;
    w.key("status_display_type")?;
    w.int(p.status_display_type.code())?;

    w.optional_string("state", &p.state)?;
    w.optional_string("state_url", &p.state_url)?;
    w.optional_string("details", &p.details)?;
    w.optional_string("details_url", &p.details_url)?;

    if p.start_timestamp != 0 || p.end_timestamp != 0 {
        w.key("timestamps")?;
        w.start_object()?;
        if p.start_timestamp != 0 {
            w.key("start")?;
            w.int(p.start_timestamp)?;
        }
        if p.end_timestamp != 0 {
            w.key("end")?;
            w.int(p.end_timestamp)?;
        }
        w.end_object()?;
    }

    let assets = [
        ("large_image", &p.large_image_key),
        ("large_text", &p.large_image_text),
        ("large_url", &p.large_image_url),
        ("small_image", &p.small_image_key),
        ("small_text", &p.small_image_text),
        ("small_url", &p.small_image_url),
    ];
    if assets.iter().any(|(_, value)| !value.is_empty()) {
        w.key("assets")?;
        w.start_object()?;
        for (key, value) in assets {
            w.optional_string(key, value)?;
        }
        w.end_object()?;
    }

    let privacy = p.party_privacy.code();
    if !p.party_id.is_empty() || p.party_size != 0 || p.party_max != 0 || privacy != 0 {
        w.key("party")?;
        w.start_object()?;
        w.optional_string("id", &p.party_id)?;
        if p.party_size != 0 && p.party_max != 0 {
            w.key("size")?;
            w.start_array()?;
            w.int(i64::from(p.party_size))?;
            w.int(i64::from(p.party_max))?;
            w.end_array()?;
        }
        if privacy != 0 {
            w.key("privacy")?;
            w.int(privacy)?;
        }
        w.end_object()?;
    }

    if p.has_buttons() {
        w.key("buttons")?;
        w.start_array()?;
        for button in p.buttons.iter().take(crate::activity::MAX_BUTTONS) {
            if button.label.is_empty() {
                continue;
            }
            w.start_object()?;
            w.key("label")?;
            w.string(&button.label)?;
            w.key("url")?;
            w.string(&button.url)?;
            w.end_object()?;
        }
        w.end_array()?;
    } else if !p.match_secret.is_empty() || !p.join_secret.is_empty() || !p.spectate_secret.is_empty() {
        w.key("secrets")?;
        w.start_object()?;
        w.optional_string("match", &p.match_secret)?;
        w.optional_string("join", &p.join_secret)?;
        w.optional_string("spectate", &p.spectate_secret)?;
        w.end_object()?;
    }

    w.key("instance")?;
    w.bool(p.instance)?;
    w.end_object()
}

fn write_subscription(w: &mut JsonWriter<'_>, nonce: u64, cmd: &str, kind: EventKind) -> Result<()> {
    w.start_object()?;
    write_nonce(w, nonce)?;
    w.key("cmd")?;
    w.string(cmd)?;
    w.key("evt")?;
    w.string(kind.name())?;
    w.end_object()
}

fn write_join_reply(w: &mut JsonWriter<'_>, nonce: u64, user_id: &str, reply: Reply) -> Result<()> {
    let cmd = match reply {
        Reply::Yes => "SEND_ACTIVITY_JOIN_INVITE",
        Reply::No | Reply::Ignore => "CLOSE_ACTIVITY_JOIN_REQUEST",
    };
    w.start_object()?;
    w.key("cmd")?;
    w.string(cmd)?;
    w.key("args")?;
    w.start_object()?;
    w.key("user_id")?;
    w.string(user_id)?;
    w.end_object()?;
    write_nonce(w, nonce)?;
    w.end_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Button, PartyPrivacy};
    use crate::protocol::Header;
    use crate::protocol::MAX_PAYLOAD_SIZE;
    use serde_json::{json, Value};

    fn encode(command: &Command) -> (Opcode, String) {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = encode_command(command, 7, 4242, &mut buf).unwrap();
        let header = Header::decode(&buf[..HEADER_SIZE], MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(header.length as usize, n - HEADER_SIZE);
        let body = String::from_utf8(buf[HEADER_SIZE..n].to_vec()).unwrap();
        (header.opcode, body)
    }

    fn presence_command(presence: RichPresence) -> Command {
        Command::UpdatePresence(Box::new(presence))
    }

    #[test]
    fn test_handshake_body() {
        let mut buf = [0u8; 64];
        let n = encode_handshake(1, "1234", &mut buf).unwrap();
        assert_eq!(buf[0], Opcode::Handshake as u8);
        assert_eq!(&buf[HEADER_SIZE..n], br#"{"v":1,"client_id":"1234"}"#);
    }

    #[test]
    fn test_minimal_presence_exact_text() {
        let (opcode, body) = encode(&presence_command(RichPresence {
            state: "Exploring".into(),
            details: "Level 5".into(),
            start_timestamp: 1000,
            ..Default::default()
        }));

        assert_eq!(opcode, Opcode::Message);
        assert_eq!(
            body,
            concat!(
                r#"{"nonce":"7","cmd":"SET_ACTIVITY","args":{"pid":4242,"activity":{"#,
                r#""type":0,"status_display_type":0,"state":"Exploring","details":"Level 5","#,
                r#""timestamps":{"start":1000},"instance":false}}}"#
            )
        );
    }

    #[test]
    fn test_full_presence_with_secrets() {
        let (_, body) = encode(&presence_command(RichPresence {
            activity_type: crate::activity::ActivityType::Watching,
            large_image_key: "map".into(),
            small_image_text: "rank".into(),
            party_id: "p1".into(),
            party_size: 2,
            party_max: 4,
            party_privacy: PartyPrivacy::Public,
            join_secret: "j".into(),
            instance: true,
            ..Default::default()
        }));
        let value: Value = serde_json::from_str(&body).unwrap();
        let activity = &value["args"]["activity"];

        assert_eq!(activity["type"], 3);
        assert_eq!(activity["assets"], json!({"large_image": "map", "small_text": "rank"}));
        assert_eq!(activity["party"], json!({"id": "p1", "size": [2, 4], "privacy": 1}));
        assert_eq!(activity["secrets"], json!({"join": "j"}));
        assert_eq!(activity["instance"], true);
        assert!(activity.get("buttons").is_none());
    }

    #[test]
    fn test_buttons_suppress_secrets() {
        let (_, body) = encode(&presence_command(RichPresence {
            match_secret: "m".into(),
            spectate_secret: "s".into(),
            buttons: vec![
                Button::new("", "https://skipped"),
                Button::new("Site", "https://example.com"),
            ],
            ..Default::default()
        }));
        let value: Value = serde_json::from_str(&body).unwrap();
        let activity = &value["args"]["activity"];

        assert_eq!(
            activity["buttons"],
            json!([{"label": "Site", "url": "https://example.com"}])
        );
        assert!(activity.get("secrets").is_none());
    }

    #[test]
    fn test_party_size_needs_both_numbers() {
        let (_, body) = encode(&presence_command(RichPresence {
            party_size: 3,
            ..Default::default()
        }));
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["args"]["activity"]["party"], json!({}));
    }

    #[test]
    fn test_clear_presence() {
        let (_, body) = encode(&Command::ClearPresence);
        assert_eq!(body, r#"{"nonce":"7","cmd":"SET_ACTIVITY","args":{"pid":4242}}"#);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let (_, sub) = encode(&Command::Subscribe(EventKind::JoinRequest));
        assert_eq!(sub, r#"{"nonce":"7","cmd":"SUBSCRIBE","evt":"ACTIVITY_JOIN_REQUEST"}"#);

        let (_, unsub) = encode(&Command::Unsubscribe(EventKind::Spectate));
        assert_eq!(unsub, r#"{"nonce":"7","cmd":"UNSUBSCRIBE","evt":"ACTIVITY_SPECTATE"}"#);
    }

    #[test]
    fn test_join_reply_selects_command() {
        let respond = |reply| Command::Respond {
            user_id: "99".into(),
            reply,
        };

        let (_, yes) = encode(&respond(Reply::Yes));
        assert_eq!(
            yes,
            r#"{"cmd":"SEND_ACTIVITY_JOIN_INVITE","args":{"user_id":"99"},"nonce":"7"}"#
        );
        for reply in [Reply::No, Reply::Ignore] {
            let (_, body) = encode(&respond(reply));
            assert!(body.starts_with(r#"{"cmd":"CLOSE_ACTIVITY_JOIN_REQUEST""#));
        }
    }

    #[test]
    fn test_oversized_presence_overflows() {
        let presence = presence_command(RichPresence {
            state_url: "x".repeat(MAX_FRAME_SIZE),
            ..Default::default()
        });
        let mut buf = vec![0u8; MAX_FRAME_SIZE * 2];
        assert!(matches!(
            encode_command(&presence, 1, 1, &mut buf),
            Err(RpcError::Overflow)
        ));
    }

    #[test]
    fn test_small_buffer_overflows_for_every_field_combination() {
        let presence = RichPresence {
            state: "s".into(),
            details: "d".into(),
            end_timestamp: 5,
            large_image_key: "k".into(),
            party_id: "p".into(),
            join_secret: "j".into(),
            ..Default::default()
        };
        let command = presence_command(presence);
        let mut full = vec![0u8; MAX_FRAME_SIZE];
        let needed = encode_command(&command, 1, 1, &mut full).unwrap();

        for cap in 0..needed {
            let mut buf = vec![0u8; cap];
            assert!(encode_command(&command, 1, 1, &mut buf).is_err());
        }
    }
}
