use std::collections::HashSet;

use quorum_types::Fraction;
use quorum_types::api::UnitRegistration;
use quorum_types::models::VotingUnit;

use crate::VotingError;

/// Resolve the units a caller asked to vote for against the units they own.
///
/// Duplicates collapse to one entry, request order is kept. A caller with no
/// units at all is ineligible rather than malformed.
pub fn select_units<'a>(
    owned: &'a [VotingUnit],
    requested: &[String],
) -> Result<Vec<&'a VotingUnit>, VotingError> {
    if owned.is_empty() {
        return Err(VotingError::NoUnits);
    }
    if requested.is_empty() {
        return Err(VotingError::NoUnitsSelected);
    }

    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(requested.len());
    for unit_id in requested {
        if !seen.insert(unit_id.as_str()) {
            continue;
        }
        let unit = owned
            .iter()
            .find(|u| &u.unit_id == unit_id)
            .ok_or_else(|| VotingError::InvalidUnit(unit_id.clone()))?;
        selected.push(unit);
    }
    Ok(selected)
}

pub fn validate_registration(units: &[UnitRegistration]) -> Result<(), VotingError> {
    let mut seen = HashSet::new();
    for unit in units {
        let id = unit.unit_id.trim();
        if id.is_empty() || id.len() > 64 || id != unit.unit_id {
            return Err(VotingError::InvalidUnit(unit.unit_id.clone()));
        }
        if unit.fraction > Fraction::ONE {
            return Err(VotingError::InvalidUnit(unit.unit_id.clone()));
        }
        if !seen.insert(id) {
            return Err(VotingError::UnitExists(unit.unit_id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn unit(id: &str, owner: Uuid) -> VotingUnit {
        VotingUnit {
            unit_id: id.into(),
            tenant_id: "condo-1".into(),
            owner_participant_id: owner,
            fraction: Fraction::from_ppm(50_000),
        }
    }

    #[test]
    fn no_owned_units_is_ineligible() {
        let requested = vec!["101".to_string()];
        assert!(matches!(select_units(&[], &requested), Err(VotingError::NoUnits)));
    }

    #[test]
    fn empty_selection_rejected() {
        let owner = Uuid::new_v4();
        let owned = vec![unit("101", owner)];
        assert!(matches!(select_units(&owned, &[]), Err(VotingError::NoUnitsSelected)));
    }

    #[test]
    fn foreign_unit_rejected() {
        let owner = Uuid::new_v4();
        let owned = vec![unit("101", owner)];
        let requested = vec!["101".to_string(), "202".to_string()];
        assert!(matches!(
            select_units(&owned, &requested),
            Err(VotingError::InvalidUnit(id)) if id == "202"
        ));
    }

    #[test]
    fn duplicates_collapse() {
        let owner = Uuid::new_v4();
        let owned = vec![unit("A", owner), unit("B", owner)];
        let requested = vec!["B".to_string(), "A".to_string(), "B".to_string()];
        let picked: Vec<&str> = select_units(&owned, &requested)
            .unwrap()
            .iter()
            .map(|u| u.unit_id.as_str())
            .collect();
        assert_eq!(picked, ["B", "A"]);
    }

    #[test]
    fn registration_rejects_oversized_fraction() {
        let reg = UnitRegistration {
            unit_id: "101".into(),
            owner_participant_id: Uuid::new_v4(),
            fraction: Fraction::from_ppm(1_000_001),
        };
        assert!(validate_registration(&[reg]).is_err());
    }
}
