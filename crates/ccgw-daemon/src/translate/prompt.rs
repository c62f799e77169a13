//! Chat messages to CLI prompt.

use ccgw_core::openai::{ChatMessage, Role};

/// Prompt and system prompt derived from a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("messages must not be empty")]
    NoMessages,

    #[error("a non-empty user message is required")]
    NoUserMessage,
}

const fn label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
        Role::System | Role::Developer => "System",
    }
}

/// Build the CLI prompt.
///
/// System and developer messages become the system prompt. A lone user
/// message is passed verbatim; a longer conversation is rendered as a
/// role-labelled transcript.
pub fn build_prompt(messages: &[ChatMessage]) -> Result<Prompt, PromptError> {
    if messages.is_empty() {
        return Err(PromptError::NoMessages);
    }

    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        let text = message.content.text();
        match message.role {
            Role::System | Role::Developer => {
                if !text.trim().is_empty() {
                    system.push(text);
                }
            }
            role => turns.push((role, text)),
        }
    }

    let has_user_text = turns
        .iter()
        .any(|(role, text)| *role == Role::User && !text.trim().is_empty());
    if !has_user_text {
        return Err(PromptError::NoUserMessage);
    }

    let prompt = match turns.as_slice() {
        [(Role::User, text)] => text.clone(),
        _ => turns
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(role, text)| format!("{}: {text}", label(*role)))
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    Ok(Prompt {
        prompt,
        system_prompt: (!system.is_empty()).then(|| system.join("\n\n")),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_user_message_is_verbatim() {
        let prompt = build_prompt(&[ChatMessage::new(Role::User, "  hi there ")]).unwrap();
        assert_eq!(prompt.prompt, "  hi there ");
        assert_eq!(prompt.system_prompt, None);
    }

    #[test]
    fn system_messages_join_into_system_prompt() {
        let prompt = build_prompt(&[
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::Developer, "use rust"),
            ChatMessage::new(Role::User, "hi"),
        ])
        .unwrap();
        assert_eq!(prompt.prompt, "hi");
        assert_eq!(prompt.system_prompt.as_deref(), Some("be brief\n\nuse rust"));
    }

    #[test]
    fn conversation_becomes_transcript() {
        let prompt = build_prompt(&[
            ChatMessage::new(Role::User, "hi"),
            ChatMessage::new(Role::Assistant, "hello"),
            ChatMessage::new(Role::User, "again"),
        ])
        .unwrap();
        assert_eq!(prompt.prompt, "User: hi\n\nAssistant: hello\n\nUser: again");
    }

    #[test]
    fn rejects_missing_user_text() {
        assert_eq!(build_prompt(&[]), Err(PromptError::NoMessages));
        assert_eq!(
            build_prompt(&[
                ChatMessage::new(Role::System, "x"),
                ChatMessage::new(Role::User, "   "),
            ]),
            Err(PromptError::NoUserMessage)
        );
    }
}
