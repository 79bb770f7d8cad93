use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use quorum_types::Fraction;
use quorum_types::api::CastReceipt;
use quorum_types::models::{Ballot, Identity, Privacy};
use quorum_voting::VotingError;
use quorum_voting::options::resolve_option;
use quorum_voting::receipt::new_receipt_id;
use quorum_voting::state;
use quorum_voting::units::select_units;

use super::sessions::{load_session, persist_lazy_open};
use super::units::query_owned_units;
use crate::models::{BALLOT_COLUMNS, ballot_from_row, to_db_time};
use crate::{Database, SqlResultExt};

#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub receipts: Vec<CastReceipt>,
    /// Requested units skipped because a ballot already existed.
    pub already_voted: Vec<String>,
    pub present_units: u32,
    pub weighted_fraction: Fraction,
}

impl Database {
    /// Cast one ballot per selected unit, all for the same option.
    ///
    /// Runs as a single IMMEDIATE transaction: the eligibility check, the
    /// unit resolution and the inserts see the same state. Units that
    /// already voted are skipped; if every requested unit was skipped the
    /// call fails with `AlreadyVoted`.
    pub fn cast_ballots(
        &self,
        identity: &Identity,
        session_id: Uuid,
        option_id: &str,
        unit_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<CastOutcome, VotingError> {
        self.with_tx(|tx| {
            let mut session = load_session(tx, &identity.tenant_id, session_id)?;
            persist_lazy_open(tx, &mut session, now)?;
            state::ensure_voting_eligible(&session, now, identity.role)?;
            let option = resolve_option(&session.options, option_id)?;

            let owned = query_owned_units(tx, &identity.tenant_id, identity.participant_id)?;
            let selected = select_units(&owned, unit_ids)?;

            let cast_at = to_db_time(now);
            let mut receipts = Vec::with_capacity(selected.len());
            let mut already_voted = Vec::new();
            for unit in selected {
                let receipt_id = new_receipt_id();
                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO ballots (session_id, unit_id, option_id, cast_by, cast_at, receipt_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            session_id.to_string(),
                            unit.unit_id,
                            option.id,
                            identity.participant_id.to_string(),
                            cast_at,
                            receipt_id,
                        ],
                    )
                    .storage()?;
                if inserted == 0 {
                    debug!("Unit {} already voted in session {}", unit.unit_id, session_id);
                    already_voted.push(unit.unit_id.clone());
                } else {
                    receipts.push(CastReceipt { unit_id: unit.unit_id.clone(), receipt_id });
                }
            }

            if receipts.is_empty() {
                return Err(VotingError::AlreadyVoted);
            }

            let (present_units, weighted_fraction) =
                quorum_summary(tx, &identity.tenant_id, session_id)?;

            info!(
                "{} ballot(s) cast in session {} by {}; {} unit(s) present ({})",
                receipts.len(),
                session_id,
                identity.participant_id,
                present_units,
                weighted_fraction
            );
            Ok(CastOutcome { receipts, already_voted, present_units, weighted_fraction })
        })
    }

    /// Look up a receipt within a tenant. The session privacy decides
    /// whether the caller may see the chosen option.
    pub fn find_receipt(
        &self,
        tenant_id: &str,
        receipt_id: &str,
    ) -> Result<(Ballot, Privacy), VotingError> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT b.session_id, b.unit_id, b.option_id, b.cast_by, b.cast_at, b.receipt_id, s.privacy
                     FROM ballots b JOIN sessions s ON s.id = b.session_id
                     WHERE b.receipt_id = ?1 AND s.tenant_id = ?2",
                    rusqlite::params![receipt_id, tenant_id],
                    |row| {
                        let ballot = ballot_from_row(row)?;
                        let privacy: String = row.get(6)?;
                        Ok((ballot, privacy))
                    },
                )
                .optional_row()?;
            let (ballot, privacy) = found.ok_or(VotingError::ReceiptNotFound)?;
            let privacy = privacy
                .parse::<Privacy>()
                .map_err(|e| VotingError::Storage(anyhow::anyhow!(e)))?;
            Ok((ballot, privacy))
        })
    }
}

pub(crate) fn query_ballots(
    conn: &Connection,
    session_id: Uuid,
) -> Result<Vec<Ballot>, VotingError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM ballots WHERE session_id = ?1 ORDER BY unit_id",
            BALLOT_COLUMNS
        ))
        .storage()?;
    let rows = stmt
        .query_map([session_id.to_string()], ballot_from_row)
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(rows)
}

pub(crate) fn count_ballots(conn: &Connection, session_id: Uuid) -> Result<u32, VotingError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ballots WHERE session_id = ?1",
            [session_id.to_string()],
            |row| row.get(0),
        )
        .storage()?;
    Ok(count as u32)
}

/// Present units and their summed weight, straight from the ballot table.
fn quorum_summary(
    conn: &Connection,
    tenant_id: &str,
    session_id: Uuid,
) -> Result<(u32, Fraction), VotingError> {
    let (count, ppm): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(u.fraction_ppm), 0)
             FROM ballots b
             LEFT JOIN units u ON u.tenant_id = ?1 AND u.unit_id = b.unit_id
             WHERE b.session_id = ?2",
            rusqlite::params![tenant_id, session_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .storage()?;
    Ok((count as u32, Fraction::from_ppm(ppm.max(0) as u64)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::Duration;

    use quorum_types::models::{Role, SessionStatus};

    use super::super::sessions::tests::{TENANT, create_request, seed_units};
    use super::*;

    fn resident(participant_id: Uuid) -> Identity {
        Identity {
            participant_id,
            display_name: "Maria".into(),
            role: Role::Resident,
            tenant_id: TENANT.into(),
        }
    }

    fn ids(units: &[&str]) -> Vec<String> {
        units.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn cast_for_two_units_then_repeat() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["A", "B"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now - Duration::minutes(1)), now)
            .unwrap();
        let me = resident(owner);

        let outcome = db.cast_ballots(&me, session.id, "opt-2", &ids(&["A", "B"]), now).unwrap();
        assert_eq!(outcome.receipts.len(), 2);
        assert_ne!(outcome.receipts[0].receipt_id, outcome.receipts[1].receipt_id);
        assert_eq!(outcome.present_units, 2);
        assert_eq!(outcome.weighted_fraction, Fraction::from_ppm(200_000));

        let again = db.cast_ballots(&me, session.id, "opt-1", &ids(&["A"]), now);
        assert!(matches!(again, Err(VotingError::AlreadyVoted)));

        let both_again = db.cast_ballots(&me, session.id, "opt-1", &ids(&["A", "B"]), now);
        assert!(matches!(both_again, Err(VotingError::AlreadyVoted)));

        let snapshot = db.session_snapshot(TENANT, session.id).unwrap();
        assert_eq!(snapshot.ballots.len(), 2);
        assert!(snapshot.ballots.iter().all(|b| b.option_id == "opt-2"));
        assert_eq!(snapshot.session.status, SessionStatus::Open);
    }

    #[test]
    fn partial_recast_reports_skipped_units() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["A", "B"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now - Duration::minutes(1)), now)
            .unwrap();
        let me = resident(owner);

        db.cast_ballots(&me, session.id, "opt-1", &ids(&["A"]), now).unwrap();
        let outcome = db.cast_ballots(&me, session.id, "opt-1", &ids(&["A", "B"]), now).unwrap();
        assert_eq!(outcome.already_voted, ["A"]);
        assert_eq!(outcome.receipts.len(), 1);
        assert_eq!(outcome.receipts[0].unit_id, "B");
        assert_eq!(db.session_snapshot(TENANT, session.id).unwrap().ballots.len(), 2);
    }

    #[test]
    fn eligibility_follows_role_and_state() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["101"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now + Duration::hours(1)), now)
            .unwrap();

        let resident = resident(owner);
        assert!(matches!(
            db.cast_ballots(&resident, session.id, "opt-1", &ids(&["101"]), now),
            Err(VotingError::NotEligible)
        ));

        let manager = Identity { role: Role::Manager, ..resident.clone() };
        db.cast_ballots(&manager, session.id, "opt-1", &ids(&["101"]), now).unwrap();
        // Preview ballots stay SCHEDULED.
        assert_eq!(db.get_session(TENANT, session.id).unwrap().status, SessionStatus::Scheduled);
    }

    #[test]
    fn rejects_foreign_units_and_unknown_options() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let neighbour = Uuid::new_v4();
        seed_units(&db, owner, &["101"]);
        seed_units(&db, neighbour, &["102"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now - Duration::minutes(1)), now)
            .unwrap();
        let me = resident(owner);

        assert!(matches!(
            db.cast_ballots(&me, session.id, "opt-1", &ids(&["102"]), now),
            Err(VotingError::InvalidUnit(u)) if u == "102"
        ));
        assert!(matches!(
            db.cast_ballots(&me, session.id, "Sim", &ids(&["101"]), now),
            Err(VotingError::InvalidOption(_))
        ));
        assert!(matches!(
            db.cast_ballots(&resident(Uuid::new_v4()), session.id, "opt-1", &ids(&["101"]), now),
            Err(VotingError::NoUnits)
        ));
        assert!(db.session_snapshot(TENANT, session.id).unwrap().ballots.is_empty());
    }

    #[test]
    fn closed_session_rejects_ballots() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["101"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now - Duration::minutes(1)), now)
            .unwrap();
        db.close_session(
            TENANT,
            session.id,
            now,
            quorum_types::models::WeightingMode::PerUnit,
            quorum_voting::minutes::DEFAULT_LEGAL_BASIS,
        )
        .unwrap();

        assert!(matches!(
            db.cast_ballots(&resident(owner), session.id, "opt-1", &ids(&["101"]), now),
            Err(VotingError::NotEligible)
        ));
    }

    #[test]
    fn receipt_hides_option_for_secret_sessions() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["101"]);
        let mut req = create_request(now - Duration::minutes(1));
        req.privacy = Privacy::Secret;
        let session = db.create_session(TENANT, Uuid::new_v4(), &req, now).unwrap();

        let outcome = db
            .cast_ballots(&resident(owner), session.id, "opt-3", &ids(&["101"]), now)
            .unwrap();
        let (ballot, privacy) = db.find_receipt(TENANT, &outcome.receipts[0].receipt_id).unwrap();
        assert_eq!(ballot.unit_id, "101");
        assert_eq!(privacy, Privacy::Secret);
        assert!(matches!(
            db.find_receipt("other-condo", &outcome.receipts[0].receipt_id),
            Err(VotingError::ReceiptNotFound)
        ));
    }

    #[test]
    fn concurrent_casts_store_one_ballot_per_unit() {
        let path = std::env::temp_dir().join(format!("quorum-cast-{}.db", Uuid::new_v4()));
        let db = Arc::new(Database::open(&path).unwrap());
        let now = Utc::now();
        let owner = Uuid::new_v4();
        seed_units(&db, owner, &["101"]);
        let session = db
            .create_session(TENANT, Uuid::new_v4(), &create_request(now - Duration::minutes(1)), now)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let option = if i % 2 == 0 { "opt-1" } else { "opt-2" };
                thread::spawn(move || {
                    db.cast_ballots(&resident(owner), session.id, option, &ids(&["101"]), Utc::now())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(VotingError::AlreadyVoted)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(rejected, 7);
        assert_eq!(db.session_snapshot(TENANT, session.id).unwrap().ballots.len(), 1);

        drop(db);
        let _ = std::fs::remove_file(&path);
    }
}
