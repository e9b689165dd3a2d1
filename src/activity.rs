//! Presence descriptor, users and reply kinds.
//!
//! [`RichPresence`] owns all of its strings, so a value handed to
//! [`Client::update_presence`](crate::Client::update_presence) is copied into
//! the outbound queue and never borrows from the caller.

use serde::Deserialize;

/// Maximum number of buttons shown under an activity.
pub const MAX_BUTTONS: usize = 2;

/// Byte limit for state, details, image texts, party id and secrets.
pub const MAX_TEXT_LEN: usize = 128;

/// Byte limit for image keys.
pub const MAX_IMAGE_KEY_LEN: usize = 32;

/// What the user is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivityType {
    /// "Playing ..." (default).
    #[default]
    Playing,
    /// "Listening to ...".
    Listening,
    /// "Watching ...".
    Watching,
    /// "Competing in ...".
    Competing,
}

impl ActivityType {
    /// Wire value.
    pub fn code(self) -> i64 {
        match self {
            ActivityType::Playing => 0,
            ActivityType::Listening => 2,
            ActivityType::Watching => 3,
            ActivityType::Competing => 5,
        }
    }
}

/// Which field the member list shows next to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusDisplayType {
    /// Application name (default).
    #[default]
    Name,
    /// The `state` text.
    State,
    /// The `details` text.
    Details,
}

impl StatusDisplayType {
    /// Wire value.
    pub fn code(self) -> i64 {
        match self {
            StatusDisplayType::Name => 0,
            StatusDisplayType::State => 1,
            StatusDisplayType::Details => 2,
        }
    }
}

/// Party visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartyPrivacy {
    /// Only invited users can join (default, omitted on the wire).
    #[default]
    Private,
    /// Anyone can request to join.
    Public,
}

impl PartyPrivacy {
    /// Wire value.
    pub fn code(self) -> i64 {
        match self {
            PartyPrivacy::Private => 0,
            PartyPrivacy::Public => 1,
        }
    }
}

/// Answer to a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Decline the request.
    No,
    /// Send the join invite.
    Yes,
    /// Dismiss without answering.
    Ignore,
}

/// A clickable button under the activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Button {
    /// Button text. Buttons with an empty label are skipped.
    pub label: String,
    /// URL opened on click.
    pub url: String,
}

impl Button {
    /// Create a button.
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Rich presence status.
///
/// Empty strings and zero numbers mean "not set" and are left out of the
/// emitted command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichPresence {
    /// Verb shown before the application name.
    pub activity_type: ActivityType,
    /// Which text the member list shows.
    pub status_display_type: StatusDisplayType,
    /// Second line, e.g. "In a group".
    pub state: String,
    /// Link opened from the state line.
    pub state_url: String,
    /// First line, e.g. "Ranked match".
    pub details: String,
    /// Link opened from the details line.
    pub details_url: String,
    /// Unix timestamp (seconds) the activity started.
    pub start_timestamp: i64,
    /// Unix timestamp (seconds) the activity ends.
    pub end_timestamp: i64,
    /// Uploaded asset name for the large image.
    pub large_image_key: String,
    /// Tooltip for the large image.
    pub large_image_text: String,
    /// Link opened from the large image.
    pub large_image_url: String,
    /// Uploaded asset name for the small image.
    pub small_image_key: String,
    /// Tooltip for the small image.
    pub small_image_text: String,
    /// Link opened from the small image.
    pub small_image_url: String,
    /// Party identifier shared by its members.
    pub party_id: String,
    /// Current party size.
    pub party_size: i32,
    /// Maximum party size.
    pub party_max: i32,
    /// Who may ask to join.
    pub party_privacy: PartyPrivacy,
    /// Secret for the current match.
    pub match_secret: String,
    /// Secret handed to users who join.
    pub join_secret: String,
    /// Secret handed to users who spectate.
    pub spectate_secret: String,
    /// Up to [`MAX_BUTTONS`] buttons; any button suppresses the secrets.
    pub buttons: Vec<Button>,
    /// Whether this is a game session with a specific beginning and end.
    pub instance: bool,
}

impl RichPresence {
    /// Whether any button will be emitted. Buttons suppress secrets.
    pub fn has_buttons(&self) -> bool {
        self.buttons
            .iter()
            .take(MAX_BUTTONS)
            .any(|button| !button.label.is_empty())
    }

    /// Clamp every field to its documented byte limit.
    pub(crate) fn clamp_lengths(&mut self) {
        for text in [
            &mut self.state,
            &mut self.details,
            &mut self.large_image_text,
            &mut self.small_image_text,
            &mut self.party_id,
            &mut self.match_secret,
            &mut self.join_secret,
            &mut self.spectate_secret,
        ] {
            truncate_utf8(text, MAX_TEXT_LEN);
        }
        truncate_utf8(&mut self.large_image_key, MAX_IMAGE_KEY_LEN);
        truncate_utf8(&mut self.small_image_key, MAX_IMAGE_KEY_LEN);
        self.buttons.truncate(MAX_BUTTONS);
    }
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_utf8(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// A user as reported by the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Snowflake id, sent as `id`.
    #[serde(rename = "id", default)]
    pub user_id: String,
    /// Account name.
    #[serde(default)]
    pub username: String,
    /// Legacy four-digit tag; `"0"` for migrated accounts.
    #[serde(default)]
    pub discriminator: String,
    /// Avatar hash, if any.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Display name, if set.
    #[serde(default)]
    pub global_name: Option<String>,
}
