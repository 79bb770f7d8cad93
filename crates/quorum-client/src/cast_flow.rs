//! Multi-unit ballot UX: a participant with one unit votes in one step; a
//! participant with several units picks which ones the ballot covers.

use std::collections::BTreeSet;

use uuid::Uuid;

use quorum_types::api::{CastBallotRequest, CastBallotResponse};
use quorum_types::models::VotingUnit;

use crate::api::ApiClient;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastPlan {
    /// Exactly one unit: cast immediately on option choice.
    Immediate { unit_id: String },
    /// Several units: the caller must pick a non-empty subset.
    Select { unit_ids: Vec<String> },
    /// No units: the caller cannot vote.
    Ineligible,
}

#[derive(Debug, Clone)]
pub struct CastFlow {
    units: Vec<VotingUnit>,
    selected: BTreeSet<String>,
}

impl CastFlow {
    pub fn new(units: Vec<VotingUnit>) -> Self {
        Self { units, selected: BTreeSet::new() }
    }

    /// Resolve the caller's units over REST and start a flow.
    pub async fn load(api: &ApiClient) -> Result<Self, ClientError> {
        Ok(Self::new(api.my_units().await?))
    }

    pub fn plan(&self) -> CastPlan {
        match self.units.as_slice() {
            [] => CastPlan::Ineligible,
            [only] => CastPlan::Immediate { unit_id: only.unit_id.clone() },
            many => CastPlan::Select {
                unit_ids: many.iter().map(|u| u.unit_id.clone()).collect(),
            },
        }
    }

    /// Toggle a unit in the selection.
    pub fn toggle(&mut self, unit_id: &str) -> Result<bool, ClientError> {
        if !self.units.iter().any(|u| u.unit_id == unit_id) {
            return Err(ClientError::InvalidSelection(unit_id.to_string()));
        }
        if self.selected.remove(unit_id) {
            Ok(false)
        } else {
            self.selected.insert(unit_id.to_string());
            Ok(true)
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.units.iter().map(|u| u.unit_id.clone()).collect();
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    /// Build the request for `option_id`, enforcing the selection rule.
    pub fn request(&self, option_id: &str) -> Result<CastBallotRequest, ClientError> {
        let unit_ids = match self.plan() {
            CastPlan::Immediate { unit_id } => vec![unit_id],
            CastPlan::Select { .. } if self.selected.is_empty() => {
                return Err(ClientError::SelectionRequired);
            }
            CastPlan::Select { .. } => self.selected.iter().cloned().collect(),
            // Let the server answer NO_UNITS.
            CastPlan::Ineligible => Vec::new(),
        };
        Ok(CastBallotRequest { option_id: option_id.to_string(), unit_ids })
    }

    pub async fn submit(
        &mut self,
        api: &ApiClient,
        session_id: Uuid,
        option_id: &str,
    ) -> Result<CastBallotResponse, ClientError> {
        let req = self.request(option_id)?;
        let resp = api.cast_ballots(session_id, &req).await?;
        self.selected.clear();
        Ok(resp)
    }
}
