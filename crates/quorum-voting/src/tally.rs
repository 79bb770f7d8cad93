//! Quorum and outcome over a ballot snapshot. Recomputed on every read.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use quorum_types::Fraction;
use quorum_types::models::{
    Ballot, OptionTally, Outcome, Tally, VoteOption, VotingUnit, WeightingMode,
};

pub fn compute_tally(
    options: &[VoteOption],
    ballots: &[Ballot],
    units: &[VotingUnit],
    weighting: WeightingMode,
) -> Tally {
    let unit_weights: HashMap<&str, Fraction> = units
        .iter()
        .map(|u| (u.unit_id.as_str(), u.fraction))
        .collect();

    let mut owner_weights: HashMap<Uuid, Fraction> = HashMap::new();
    for unit in units {
        let entry = owner_weights.entry(unit.owner_participant_id).or_default();
        *entry = *entry + unit.fraction;
    }

    let present: BTreeSet<&str> = ballots.iter().map(|b| b.unit_id.as_str()).collect();
    let weighted_fraction: Fraction = present
        .iter()
        .map(|id| unit_weights.get(id).copied().unwrap_or_default())
        .sum();

    let option_tallies: Vec<OptionTally> = options
        .iter()
        .map(|option| {
            let cast: Vec<&Ballot> = ballots.iter().filter(|b| b.option_id == option.id).collect();
            let fraction: Fraction = cast
                .iter()
                .map(|b| match weighting {
                    WeightingMode::PerUnit => {
                        unit_weights.get(b.unit_id.as_str()).copied().unwrap_or_default()
                    }
                    WeightingMode::VoterAggregate => {
                        owner_weights.get(&b.cast_by).copied().unwrap_or_default()
                    }
                })
                .sum();
            OptionTally {
                option_id: option.id.clone(),
                label: option.label.clone(),
                votes: cast.len() as u32,
                fraction,
            }
        })
        .collect();

    let outcome = decide(present.len(), &option_tallies);

    Tally {
        present_units: present.len() as u32,
        total_units: units.len() as u32,
        weighted_fraction,
        options: option_tallies,
        outcome,
        weighting,
    }
}

/// Strict maximum by vote count wins; a shared maximum is a tie.
fn decide(present_units: usize, options: &[OptionTally]) -> Outcome {
    if present_units == 0 {
        return Outcome::NoQuorum;
    }
    let Some(max) = options.iter().map(|o| o.votes).max() else {
        return Outcome::NoQuorum;
    };
    let mut leaders = options.iter().filter(|o| o.votes == max);
    match (leaders.next(), leaders.next()) {
        (Some(winner), None) => Outcome::Decided {
            option_id: winner.option_id.clone(),
            label: winner.label.clone(),
        },
        _ => Outcome::Tied,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn options() -> Vec<VoteOption> {
        vec![
            VoteOption { id: "opt-1".into(), label: "Sim".into() },
            VoteOption { id: "opt-2".into(), label: "Não".into() },
            VoteOption { id: "opt-3".into(), label: "Abstenção".into() },
        ]
    }

    fn unit(id: &str, owner: Uuid, ppm: u64) -> VotingUnit {
        VotingUnit {
            unit_id: id.into(),
            tenant_id: "condo-1".into(),
            owner_participant_id: owner,
            fraction: Fraction::from_ppm(ppm),
        }
    }

    fn ballot(unit_id: &str, option_id: &str, cast_by: Uuid) -> Ballot {
        Ballot {
            session_id: Uuid::nil(),
            unit_id: unit_id.into(),
            option_id: option_id.into(),
            cast_by,
            cast_at: Utc::now(),
            receipt_id: format!("r-{}", unit_id),
        }
    }

    #[test]
    fn single_unit_happy_path() {
        let p = Uuid::new_v4();
        let units = vec![unit("101", p, 40_000)];
        let tally = compute_tally(&options(), &[ballot("101", "opt-1", p)], &units, WeightingMode::PerUnit);

        let votes: Vec<u32> = tally.options.iter().map(|o| o.votes).collect();
        assert_eq!(votes, [1, 0, 0]);
        assert_eq!(tally.present_units, 1);
        assert_eq!(tally.weighted_fraction, Fraction::from_ppm(40_000));
        assert_eq!(
            tally.outcome,
            Outcome::Decided { option_id: "opt-1".into(), label: "Sim".into() }
        );
    }

    #[test]
    fn top_two_tied() {
        let owners: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let units: Vec<VotingUnit> = owners
            .iter()
            .enumerate()
            .map(|(i, o)| unit(&format!("{}", 101 + i), *o, 250_000))
            .collect();
        let ballots = vec![
            ballot("101", "opt-1", owners[0]),
            ballot("102", "opt-1", owners[1]),
            ballot("103", "opt-2", owners[2]),
            ballot("104", "opt-2", owners[3]),
        ];
        let tally = compute_tally(&options(), &ballots, &units, WeightingMode::PerUnit);
        assert_eq!(tally.outcome, Outcome::Tied);
        assert_eq!(tally.present_units, 4);
        assert_eq!(tally.weighted_fraction, Fraction::ONE);
    }

    #[test]
    fn no_ballots_is_no_quorum() {
        let units = vec![unit("101", Uuid::new_v4(), 100_000)];
        let tally = compute_tally(&options(), &[], &units, WeightingMode::PerUnit);
        assert_eq!(tally.outcome, Outcome::NoQuorum);
        assert_eq!(tally.present_units, 0);
        assert_eq!(tally.total_units, 1);
        assert_eq!(tally.weighted_fraction, Fraction::ZERO);
    }

    #[test]
    fn weighting_modes_differ_for_multi_unit_owner() {
        // Q owns A (10%) and B (30%) but only votes with A.
        let q = Uuid::new_v4();
        let r = Uuid::new_v4();
        let units = vec![unit("A", q, 100_000), unit("B", q, 300_000), unit("C", r, 200_000)];
        let ballots = vec![ballot("A", "opt-1", q), ballot("C", "opt-2", r)];

        let per_unit = compute_tally(&options(), &ballots, &units, WeightingMode::PerUnit);
        assert_eq!(per_unit.options[0].fraction, Fraction::from_ppm(100_000));
        assert_eq!(per_unit.options[1].fraction, Fraction::from_ppm(200_000));

        let aggregate = compute_tally(&options(), &ballots, &units, WeightingMode::VoterAggregate);
        assert_eq!(aggregate.options[0].fraction, Fraction::from_ppm(400_000));
        assert_eq!(aggregate.options[1].fraction, Fraction::from_ppm(200_000));

        // Quorum is unaffected by the option weighting mode.
        assert_eq!(per_unit.weighted_fraction, aggregate.weighted_fraction);
        assert_eq!(per_unit.weighted_fraction, Fraction::from_ppm(300_000));
    }

    #[test]
    fn quorum_is_monotonic_as_ballots_arrive() {
        let owners: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let units: Vec<VotingUnit> = owners
            .iter()
            .enumerate()
            .map(|(i, o)| unit(&format!("U{}", i), *o, 200_000))
            .collect();

        let mut ballots = Vec::new();
        let mut last = (0, Fraction::ZERO);
        for (i, owner) in owners.iter().enumerate() {
            ballots.push(ballot(&format!("U{}", i), "opt-3", *owner));
            let tally = compute_tally(&options(), &ballots, &units, WeightingMode::PerUnit);
            assert!(tally.present_units >= last.0);
            assert!(tally.weighted_fraction >= last.1);
            last = (tally.present_units, tally.weighted_fraction);
        }
        assert_eq!(last, (5, Fraction::ONE));
    }
}
