use colored::Colorize;
use vitrine::api::{CmdMessage, CmdResult, MessageLevel};
use vitrine::error::Result;

pub(super) fn print_messages(messages: &[CmdMessage]) {
    for message in messages {
        println!("{}", format_message(message));
    }
}

pub(super) fn format_message(message: &CmdMessage) -> String {
    match message.level {
        MessageLevel::Info => message.content.dimmed().to_string(),
        MessageLevel::Success => message.content.green().to_string(),
        MessageLevel::Warning => message.content.yellow().to_string(),
        MessageLevel::Error => message.content.red().to_string(),
    }
}

/// The command's data, or its messages when it has none.
pub(super) fn print_json(result: &CmdResult) -> Result<()> {
    let rendered = match &result.data {
        Some(data) => serde_json::to_string_pretty(data)?,
        None => serde_json::to_string_pretty(&result.messages)?,
    };
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_when_colors_are_off() {
        colored::control::set_override(false);
        let message = CmdMessage::warning("Needs attention: s1");
        assert_eq!(format_message(&message), "Needs attention: s1");
        colored::control::unset_override();
    }
}
