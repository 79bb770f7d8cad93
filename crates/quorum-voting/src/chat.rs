use crate::VotingError;

pub const MAX_CHAT_LEN: usize = 2000;

/// Trimmed message body, 1 to `MAX_CHAT_LEN` characters.
pub fn normalize_chat_content(content: &str) -> Result<String, VotingError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(VotingError::InvalidMessage("message is empty".into()));
    }
    if content.chars().count() > MAX_CHAT_LEN {
        return Err(VotingError::InvalidMessage(format!(
            "message exceeds {} characters",
            MAX_CHAT_LEN
        )));
    }
    Ok(content.to_string())
}
