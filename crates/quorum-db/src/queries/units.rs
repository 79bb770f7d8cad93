use rusqlite::Connection;
use uuid::Uuid;

use quorum_types::api::UnitRegistration;
use quorum_types::models::VotingUnit;
use quorum_voting::VotingError;
use quorum_voting::units::validate_registration;

use crate::models::{UNIT_COLUMNS, unit_from_row};
use crate::{Database, SqlResultExt};

impl Database {
    /// Tenant onboarding. Units are insert-only: a registered unit never
    /// changes weight or owner, so it is stable for every session.
    pub fn register_units(
        &self,
        tenant_id: &str,
        units: &[UnitRegistration],
    ) -> Result<Vec<VotingUnit>, VotingError> {
        validate_registration(units)?;

        self.with_tx(|tx| {
            for unit in units {
                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO units (tenant_id, unit_id, owner_participant_id, fraction_ppm)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![
                            tenant_id,
                            unit.unit_id,
                            unit.owner_participant_id.to_string(),
                            unit.fraction.ppm() as i64,
                        ],
                    )
                    .storage()?;
                if inserted == 0 {
                    return Err(VotingError::UnitExists(unit.unit_id.clone()));
                }
            }
            query_tenant_units(tx, tenant_id)
        })
    }

    /// Units owned by a participant, ordered by unit id. Empty means the
    /// participant cannot vote; it is not an error.
    pub fn resolve_units(
        &self,
        tenant_id: &str,
        participant_id: Uuid,
    ) -> Result<Vec<VotingUnit>, VotingError> {
        self.with_conn(|conn| query_owned_units(conn, tenant_id, participant_id))
    }

    pub fn tenant_units(&self, tenant_id: &str) -> Result<Vec<VotingUnit>, VotingError> {
        self.with_conn(|conn| query_tenant_units(conn, tenant_id))
    }
}

pub(crate) fn query_owned_units(
    conn: &Connection,
    tenant_id: &str,
    participant_id: Uuid,
) -> Result<Vec<VotingUnit>, VotingError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM units WHERE tenant_id = ?1 AND owner_participant_id = ?2 ORDER BY unit_id",
            UNIT_COLUMNS
        ))
        .storage()?;
    let rows = stmt
        .query_map(rusqlite::params![tenant_id, participant_id.to_string()], unit_from_row)
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(rows)
}

pub(crate) fn query_tenant_units(
    conn: &Connection,
    tenant_id: &str,
) -> Result<Vec<VotingUnit>, VotingError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM units WHERE tenant_id = ?1 ORDER BY unit_id",
            UNIT_COLUMNS
        ))
        .storage()?;
    let rows = stmt
        .query_map([tenant_id], unit_from_row)
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use quorum_types::Fraction;

    use super::*;

    fn reg(unit_id: &str, owner: Uuid, ppm: u64) -> UnitRegistration {
        UnitRegistration {
            unit_id: unit_id.into(),
            owner_participant_id: owner,
            fraction: Fraction::from_ppm(ppm),
        }
    }

    #[test]
    fn resolves_units_per_owner_and_tenant() {
        let db = Database::open_in_memory().unwrap();
        let q = Uuid::new_v4();
        let p = Uuid::new_v4();
        db.register_units("condo-1", &[reg("B", q, 300_000), reg("A", q, 100_000), reg("101", p, 50_000)])
            .unwrap();
        db.register_units("condo-2", &[reg("A", q, 900_000)]).unwrap();

        let owned: Vec<String> = db
            .resolve_units("condo-1", q)
            .unwrap()
            .into_iter()
            .map(|u| u.unit_id)
            .collect();
        assert_eq!(owned, ["A", "B"]);
        assert_eq!(db.tenant_units("condo-1").unwrap().len(), 3);
        assert!(db.resolve_units("condo-1", Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn duplicate_registration_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        db.register_units("condo-1", &[reg("101", owner, 50_000)]).unwrap();

        let result = db.register_units("condo-1", &[reg("102", owner, 50_000), reg("101", owner, 10)]);
        assert!(matches!(result, Err(VotingError::UnitExists(id)) if id == "101"));
        assert_eq!(db.tenant_units("condo-1").unwrap().len(), 1);
    }
}
