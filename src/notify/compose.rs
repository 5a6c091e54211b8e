//! Message text and embeds.

use crate::gateways::{Embed, EmbedAuthor, EmbedField, EmbedImage, StreamInfo};

/// Twitch brand purple.
pub const EMBED_COLOR: u32 = 0x9146FF;

pub const THUMBNAIL_WIDTH: u32 = 400;
pub const THUMBNAIL_HEIGHT: u32 = 255;

/// Default cross-post prefix.
pub const DEFAULT_CROSS_POST_PREFIX: &str = "【ライブ配信開始】";

/// Default end-of-stream reaction.
pub const DEFAULT_END_MARKER: &str = "🔚";

/// Game name the provider UI shows when no category is set.
const UNSET_GAME: &str = "未設定";

/// A chat notification: a content line plus an embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichMessage {
    pub text: String,
    pub embed: Embed,
}

pub fn stream_url(login: &str) -> String {
    format!("https://twitch.tv/{login}")
}

/// Fills the provider's `{width}x{height}` thumbnail template.
pub fn thumbnail_url(template: &str) -> String {
    template
        .replace("{width}", &THUMBNAIL_WIDTH.to_string())
        .replace("{height}", &THUMBNAIL_HEIGHT.to_string())
}

fn known_game(info: &StreamInfo) -> Option<&str> {
    info.game_name
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty() && *g != UNSET_GAME)
}

/// Builds the go-live notification for chat servers.
pub fn live_notification(info: &StreamInfo) -> RichMessage {
    let url = stream_url(&info.user_login);
    let text = format!("🔴 **{}** is now live!\n{}", info.user_name, url);

    let mut fields = Vec::new();
    if let Some(game) = known_game(info) {
        fields.push(EmbedField {
            name: "Game".into(),
            value: game.to_string(),
            inline: true,
        });
    }
    if !info.tags.is_empty() {
        fields.push(EmbedField {
            name: "Tags".into(),
            value: info.tags.join(", "),
            inline: true,
        });
    }

    let title = if info.title.trim().is_empty() {
        format!("{} is live", info.user_name)
    } else {
        info.title.clone()
    };

    RichMessage {
        text,
        embed: Embed {
            title: Some(title),
            url: Some(url.clone()),
            color: Some(EMBED_COLOR),
            author: Some(EmbedAuthor {
                name: info.user_name.clone(),
                url: Some(url),
                icon_url: None,
            }),
            fields,
            image: info.thumbnail_url.as_deref().map(|t| EmbedImage {
                url: thumbnail_url(t),
            }),
            timestamp: info.started_at,
            ..Default::default()
        },
    }
}

/// Builds the cross-post text.
///
/// ```text
/// <prefix>
/// <title>
/// #<game without whitespace>
///
/// <url>
/// ```
///
/// The hashtag line is omitted when no game is set.
pub fn cross_post_text(info: &StreamInfo, prefix: &str) -> String {
    let mut text = format!("{prefix}\n{}", info.title);
    if let Some(game) = known_game(info) {
        let hashtag: String = game.chars().filter(|c| !c.is_whitespace()).collect();
        text.push_str(&format!("\n#{hashtag}"));
    }
    text.push_str(&format!("\n\n{}", stream_url(&info.user_login)));
    text.trim().to_string()
}
