//! Canonical minutes ("ata") text for a closed session.
//!
//! Output depends only on the arguments: no clock reads, no map iteration,
//! ballots sorted by unit id. Regenerating from the frozen snapshot must give
//! byte-identical text, and the stored SHA-256 lets anyone check that.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use quorum_types::models::{Ballot, Privacy, Session, Tally};

pub const DEFAULT_LEGAL_BASIS: &str =
    "Brazilian Civil Code (Law No. 10,406/2002), arts. 1,347 to 1,356, and the condominium convention";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn generate_minutes(
    session: &Session,
    ballots: &[Ballot],
    tally: &Tally,
    legal_basis: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("MINUTES OF THE CONDOMINIUM GENERAL ASSEMBLY".into());
    lines.push(String::new());
    lines.push(format!("Session: {}", session.id));
    lines.push(format!("Condominium: {}", session.tenant_id));
    lines.push(format!("Title: {}", session.title));
    if !session.description.is_empty() {
        lines.push(format!("Agenda: {}", session.description));
    }
    lines.push(format!(
        "Scheduled: {} to {}",
        timestamp(session.scheduled_start),
        timestamp(session.scheduled_end)
    ));
    lines.push(format!(
        "Closed at: {}",
        session.closed_at.map(timestamp).unwrap_or_else(|| "-".into())
    ));
    lines.push(format!("Ballot: {}", session.privacy.as_str()));
    lines.push(format!("Legal basis: {}", legal_basis));

    lines.push(String::new());
    lines.push("QUORUM".into());
    lines.push(format!(
        "Units present: {} of {}",
        tally.present_units, tally.total_units
    ));
    lines.push(format!("Weighted fraction present: {}", tally.weighted_fraction));

    lines.push(String::new());
    lines.push("RESULTS".into());
    for (i, option) in tally.options.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({}): {} vote(s), {}",
            i + 1,
            option.label,
            option.option_id,
            option.votes,
            option.fraction
        ));
    }

    lines.push(String::new());
    lines.push("DECISION".into());
    lines.push(format!("Outcome: {}", tally.outcome));

    lines.push(String::new());
    lines.push("ROLL OF VOTES".into());
    match session.privacy {
        Privacy::Secret => lines.push("Withheld: secret ballot.".into()),
        Privacy::Open => {
            let mut roll: Vec<&Ballot> = ballots.iter().collect();
            roll.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
            if roll.is_empty() {
                lines.push("No ballots were cast.".into());
            }
            for ballot in roll {
                let label = session
                    .options
                    .iter()
                    .find(|o| o.id == ballot.option_id)
                    .map(|o| o.label.as_str())
                    .unwrap_or("?");
                lines.push(format!(
                    "Unit {}: {} ({})",
                    ballot.unit_id, label, ballot.option_id
                ));
            }
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub fn minutes_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
