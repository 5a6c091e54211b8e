//! Decodes command data into a [`Command`].

use serde_json::Value;

use super::error::CommandError;
use super::types::{Command, CommandData};
use crate::notify::parse_rule_list;
use crate::types::ChannelId;

pub const ADD_STREAMER: &str = "add-streamer";
pub const NOTIFY_SETTINGS: &str = "notify-settings";
pub const REMOVE_STREAMER: &str = "remove-streamer";

/// Parses the invoked command.
///
/// # Parsing Rules
///
/// - Command names are matched exactly (the platform lowercases them)
/// - Twitch logins are trimmed, lowercased and may carry a leading `@`
/// - `rules` is a comma-separated list; entries are trimmed and empties dropped
///
/// # Examples
///
/// ```
/// use live_relay::commands::{parse_command, Command, CommandData};
///
/// let data: CommandData = serde_json::from_value(serde_json::json!({
///     "name": "add-streamer",
///     "options": [{ "name": "twitch_username", "value": " @Cool_User " }]
/// }))
/// .unwrap();
///
/// assert_eq!(
///     parse_command(&data).unwrap(),
///     Command::AddStreamer { login: "cool_user".into() }
/// );
/// ```
pub fn parse_command(data: &CommandData) -> Result<Command, CommandError> {
    match data.name.as_str() {
        ADD_STREAMER => Ok(Command::AddStreamer {
            login: login_option(data)?,
        }),
        REMOVE_STREAMER => Ok(Command::RemoveStreamer {
            login: login_option(data)?,
        }),
        NOTIFY_SETTINGS => {
            let channel = string_option(data, "channel")?
                .ok_or(CommandError::MissingOption("channel"))?;
            if channel.trim().is_empty() {
                return Err(CommandError::InvalidOption {
                    name: "channel",
                    reason: "empty".into(),
                });
            }
            let rules = string_option(data, "rules")?
                .map(|raw| parse_rule_list(&raw))
                .unwrap_or_default();
            Ok(Command::NotifySettings {
                channel: ChannelId::new(channel.trim()),
                rules,
            })
        }
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn login_option(data: &CommandData) -> Result<String, CommandError> {
    let raw = string_option(data, "twitch_username")?
        .ok_or(CommandError::MissingOption("twitch_username"))?;
    let login = raw.trim().trim_start_matches('@').to_lowercase();
    if login.is_empty() {
        return Err(CommandError::InvalidOption {
            name: "twitch_username",
            reason: "empty".into(),
        });
    }
    Ok(login)
}

/// Reads a string-valued option. Absent options are `None`.
fn string_option(data: &CommandData, name: &'static str) -> Result<Option<String>, CommandError> {
    let Some(option) = data.options.iter().find(|o| o.name == name) else {
        return Ok(None);
    };
    match &option.value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        other => Err(CommandError::InvalidOption {
            name,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn data(name: &str, options: Value) -> CommandData {
        serde_json::from_value(json!({ "name": name, "options": options })).unwrap()
    }

    #[test]
    fn add_streamer() {
        let cmd = parse_command(&data(
            "add-streamer",
            json!([{ "name": "twitch_username", "value": "Streamer" }]),
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddStreamer {
                login: "streamer".into()
            }
        );
    }

    #[test]
    fn remove_streamer() {
        let cmd = parse_command(&data(
            "remove-streamer",
            json!([{ "name": "twitch_username", "value": "@streamer" }]),
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::RemoveStreamer {
                login: "streamer".into()
            }
        );
    }

    #[test]
    fn add_streamer_requires_login() {
        assert!(matches!(
            parse_command(&data("add-streamer", json!([]))),
            Err(CommandError::MissingOption("twitch_username"))
        ));
        assert!(matches!(
            parse_command(&data(
                "add-streamer",
                json!([{ "name": "twitch_username", "value": "  @ " }])
            )),
            Err(CommandError::InvalidOption { .. })
        ));
    }

    #[test]
    fn notify_settings_with_rules() {
        let cmd = parse_command(&data(
            "notify-settings",
            json!([
                { "name": "channel", "value": "123" },
                { "name": "rules", "value": " gameA, ,GameB ,," }
            ]),
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::NotifySettings {
                channel: ChannelId::new("123"),
                rules: vec!["gameA".into(), "GameB".into()],
            }
        );
    }

    #[test]
    fn notify_settings_without_rules_is_unfiltered() {
        let cmd = parse_command(&data(
            "notify-settings",
            json!([{ "name": "channel", "value": "123" }]),
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::NotifySettings {
                channel: ChannelId::new("123"),
                rules: vec![],
            }
        );
    }

    #[test]
    fn notify_settings_requires_channel() {
        assert!(matches!(
            parse_command(&data("notify-settings", json!([{ "name": "rules", "value": "a" }]))),
            Err(CommandError::MissingOption("channel"))
        ));
    }

    #[test]
    fn non_string_option_is_invalid() {
        assert!(matches!(
            parse_command(&data(
                "add-streamer",
                json!([{ "name": "twitch_username", "value": 42 }])
            )),
            Err(CommandError::InvalidOption {
                name: "twitch_username",
                ..
            })
        ));
    }

    #[test]
    fn unknown_command() {
        assert!(matches!(
            parse_command(&data("live-register", json!([]))),
            Err(CommandError::UnknownCommand(name)) if name == "live-register"
        ));
    }

    proptest! {
        /// Logins are normalised the same way regardless of case and padding.
        #[test]
        fn login_normalisation(login in "[a-z0-9_]{1,25}", pad in " {0,3}", upper in any::<bool>()) {
            let raw = if upper { login.to_uppercase() } else { login.clone() };
            let cmd = parse_command(&data(
                "add-streamer",
                json!([{ "name": "twitch_username", "value": format!("{pad}{raw}{pad}") }]),
            ))
            .unwrap();
            prop_assert_eq!(cmd, Command::AddStreamer { login });
        }
    }
}
