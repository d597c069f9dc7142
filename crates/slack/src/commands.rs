use crate::events::InboundEvent;

/// A command addressed to the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased and whitespace-collapsed; never contains the bot's mention token.
    pub text: String,
    pub channel: String,
    pub user_id: Option<String>,
    /// Resolved through the directory; `None` when the lookup fails.
    pub user_name: Option<String>,
}

/// A plain reply read while a conversation is waiting for an answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerCandidate {
    pub text: String,
    pub channel: String,
    pub user_id: Option<String>,
}

impl AnswerCandidate {
    pub fn is_from(&self, user: &str, channel: &str) -> bool {
        self.user_id.as_deref() == Some(user) && self.channel == channel
    }
}

pub fn mention_token(bot_id: &str) -> String {
    format!("<@{bot_id}>")
}

/// Collapses whitespace runs, trims and lowercases. Idempotent.
pub fn normalize_command(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Returns the first event in the batch that mentions the bot.
pub fn extract_directed_command(events: &[InboundEvent], mention: &str) -> Option<ParsedCommand> {
    events.iter().find_map(|event| {
        let text = event.text.as_deref().filter(|text| text.contains(mention))?;
        let channel = event.channel.as_deref()?;

        Some(ParsedCommand {
            text: command_after_mention(text, mention),
            channel: channel.to_owned(),
            user_id: event.user.clone(),
            user_name: None,
        })
    })
}

/// Returns the first event in the batch with both text and channel, regardless of
/// mentions.
pub fn extract_answer(events: &[InboundEvent]) -> Option<AnswerCandidate> {
    events.iter().find_map(|event| {
        let text = event.text.as_deref()?;
        let channel = event.channel.as_deref()?;

        Some(AnswerCandidate {
            text: text.trim().to_lowercase(),
            channel: channel.to_owned(),
            user_id: event.user.clone(),
        })
    })
}

// Only the first space-delimited word decides the address style: `<@BOT> do x`
// versus `hey <@BOT>: do x`.
fn command_after_mention(text: &str, mention: &str) -> String {
    let addressed_first = text.split(' ').next() == Some(mention);

    let rest = if addressed_first {
        text.split_once(mention).map(|(_, rest)| rest)
    } else {
        let with_colon = format!("{mention}:");
        text.split_once(with_colon.as_str())
            .map(|(_, rest)| rest)
            .or_else(|| text.split_once(mention).map(|(_, rest)| rest.trim_start_matches(':')))
    }
    .unwrap_or_default();

    let until_next_mention = rest.split(mention).next().unwrap_or_default();
    normalize_command(until_next_mention)
}

#[cfg(test)]
mod tests {
    use super::{
        extract_answer, extract_directed_command, mention_token, normalize_command, ParsedCommand,
    };
    use crate::events::InboundEvent;

    const MENTION: &str = "<@UBOT>";

    fn directed(text: &str) -> Option<String> {
        extract_directed_command(&[InboundEvent::message("C1", "U1", text)], MENTION)
            .map(|command| command.text)
    }

    #[test]
    fn mention_token_wraps_bot_id() {
        assert_eq!(mention_token("UBOT"), MENTION);
    }

    #[test]
    fn normalization_collapses_spaces_and_is_idempotent() {
        let inputs = ["  What's    UP  ", "deploy\t\tprod  now", "already normal", "", "   "];
        for input in inputs {
            let once = normalize_command(input);
            assert!(!once.contains("  "), "double space survived in {once:?}");
            assert_eq!(once, once.trim());
            assert_eq!(once, once.to_lowercase());
            assert_eq!(normalize_command(&once), once, "normalization must be idempotent");
        }
        assert_eq!(normalize_command("  What's    UP  "), "what's up");
    }

    #[test]
    fn leading_mention_strips_token() {
        assert_eq!(directed("<@UBOT> Deploy   Prod").as_deref(), Some("deploy prod"));
    }

    #[test]
    fn mid_line_mention_uses_colon_form() {
        assert_eq!(directed("hey <@UBOT>: What's  up").as_deref(), Some("what's up"));
    }

    #[test]
    fn mid_line_mention_without_colon_takes_remaining_text() {
        assert_eq!(directed("hey <@UBOT> ping").as_deref(), Some("ping"));
    }

    #[test]
    fn glued_leading_mention_is_treated_as_mid_line() {
        assert_eq!(directed("<@UBOT>: status").as_deref(), Some("status"));
        assert_eq!(directed("<@UBOT>:hi").as_deref(), Some("hi"));
    }

    #[test]
    fn extracted_command_never_contains_mention() {
        let samples = [
            "<@UBOT> hi <@UBOT> again",
            "yo <@UBOT>: one <@UBOT> two",
            "<@UBOT> <@UBOT>",
            "a <@UBOT>",
        ];
        for sample in samples {
            let text = directed(sample).expect("mention should match");
            assert!(!text.contains(MENTION), "{sample:?} leaked the mention into {text:?}");
        }
    }

    #[test]
    fn first_matching_event_wins() {
        let events = vec![
            InboundEvent::message("C1", "U1", "no mention here"),
            InboundEvent { text: Some("<@UBOT> orphan".to_owned()), ..InboundEvent::default() },
            InboundEvent::message("C2", "U2", "<@UBOT> first"),
            InboundEvent::message("C3", "U3", "<@UBOT> second"),
        ];

        let command = extract_directed_command(&events, MENTION).expect("command");
        assert_eq!(
            command,
            ParsedCommand {
                text: "first".to_owned(),
                channel: "C2".to_owned(),
                user_id: Some("U2".to_owned()),
                user_name: None,
            }
        );
    }

    #[test]
    fn batch_without_mentions_yields_nothing() {
        let events = vec![InboundEvent::message("C1", "U1", "hello world")];
        assert!(extract_directed_command(&events, MENTION).is_none());
        assert!(extract_directed_command(&[], MENTION).is_none());
    }

    #[test]
    fn answer_extraction_ignores_mentions_and_requires_channel() {
        let events = vec![
            InboundEvent { text: Some("no channel".to_owned()), ..InboundEvent::default() },
            InboundEvent { channel: Some("C1".to_owned()), ..InboundEvent::default() },
            InboundEvent::message("C1", "U1", "  Yes  "),
        ];

        let answer = extract_answer(&events).expect("answer");
        assert_eq!(answer.text, "yes");
        assert!(answer.is_from("U1", "C1"));
        assert!(!answer.is_from("U1", "C2"));
        assert!(!answer.is_from("U2", "C1"));
    }
}
