use std::collections::HashSet;

use quorum_types::api::OptionInput;
use quorum_types::models::VoteOption;

use crate::VotingError;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 20;
const MAX_LABEL_LEN: usize = 200;
const MAX_ID_LEN: usize = 64;

/// Validate the creator's option list and assign `opt-N` ids where missing.
///
/// Ids are the only accepted ballot reference, so an id that equals some
/// option's label is rejected as ambiguous.
pub fn normalize_options(inputs: &[OptionInput]) -> Result<Vec<VoteOption>, VotingError> {
    if inputs.len() < MIN_OPTIONS || inputs.len() > MAX_OPTIONS {
        return Err(VotingError::InvalidSession(format!(
            "a session needs between {} and {} options, got {}",
            MIN_OPTIONS,
            MAX_OPTIONS,
            inputs.len()
        )));
    }

    let options: Vec<VoteOption> = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| VoteOption {
            id: input
                .id
                .as_deref()
                .map(str::trim)
                .map(str::to_string)
                .unwrap_or_else(|| format!("opt-{}", i + 1)),
            label: input.label.trim().to_string(),
        })
        .collect();

    let mut ids = HashSet::new();
    let mut labels = HashSet::new();
    for option in &options {
        if option.label.is_empty() || option.label.len() > MAX_LABEL_LEN {
            return Err(VotingError::InvalidSession("option labels must be 1-200 bytes".into()));
        }
        if !is_valid_id(&option.id) {
            return Err(VotingError::InvalidSession(format!("invalid option id '{}'", option.id)));
        }
        if !ids.insert(option.id.as_str()) {
            return Err(VotingError::InvalidSession(format!("duplicate option id '{}'", option.id)));
        }
        if !labels.insert(option.label.to_lowercase()) {
            return Err(VotingError::InvalidSession(format!(
                "duplicate option label '{}'",
                option.label
            )));
        }
    }

    for option in &options {
        let clashes = options
            .iter()
            .any(|other| other.id != option.id && other.label == option.id);
        if clashes {
            return Err(VotingError::InvalidSession(format!(
                "option id '{}' is also used as a label",
                option.id
            )));
        }
    }

    Ok(options)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Look up a ballot's option by canonical id. Labels are not accepted.
pub fn resolve_option<'a>(
    options: &'a [VoteOption],
    option_id: &str,
) -> Result<&'a VoteOption, VotingError> {
    options
        .iter()
        .find(|o| o.id == option_id)
        .ok_or_else(|| VotingError::InvalidOption(option_id.to_string()))
}
