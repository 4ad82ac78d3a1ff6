use serde::{Deserialize, Serialize};

use super::catalog::Catalog;
use super::state::{WizardAction, WizardState};

pub const PARAM_TICKET: &str = "t";
pub const PARAM_CRITERION: &str = "crit";

/// `?t=<ticket>&crit=<criterion id>` as carried by shareable intake links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeQuery {
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(rename = "crit", default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,
}

impl IntakeQuery {
    /// Actions hydrating a fresh state from the link; unknown criteria are ignored.
    pub fn hydration_actions(&self, catalog: &Catalog) -> Vec<WizardAction> {
        let mut actions = Vec::new();

        if let Some(ticket) = self.ticket.as_deref().filter(|t| !t.trim().is_empty()) {
            actions.push(WizardAction::SetTicketKey {
                key: ticket.to_uppercase(),
            });
        }

        if let Some(criterion) = self
            .criterion
            .as_deref()
            .filter(|id| catalog.is_known_criterion(id))
        {
            actions.push(WizardAction::SelectCriterion {
                id: Some(criterion.to_string()),
            });
        }

        actions
    }

    /// Parameters mirroring the current state, empty values omitted.
    pub fn from_state(state: &WizardState) -> Self {
        Self {
            ticket: Some(state.ticket_key.clone()).filter(|key| !key.is_empty()),
            criterion: state.selected_criterion_id.clone(),
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(ticket) = &self.ticket {
            pairs.push(format!("{PARAM_TICKET}={}", urlencoding::encode(ticket)));
        }
        if let Some(criterion) = &self.criterion {
            pairs.push(format!("{PARAM_CRITERION}={}", urlencoding::encode(criterion)));
        }
        pairs.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::security::catalog::Catalog;
    use crate::workflows::security::state::DecisionReducer;

    #[test]
    fn hydrates_ticket_and_known_criterion() {
        let catalog = Catalog::builtin().expect("catalog");
        let query = IntakeQuery {
            ticket: Some("cs-201".to_string()),
            criterion: Some("CRIT-COSMETIC".to_string()),
        };

        let reducer = DecisionReducer::new(&catalog);
        let state = query
            .hydration_actions(&catalog)
            .into_iter()
            .fold(WizardState::new(), |state, action| reducer.apply(&state, action));

        assert_eq!(state.ticket_key, "CS-201");
        assert_eq!(state.selected_criterion_id.as_deref(), Some("CRIT-COSMETIC"));
        assert!(!state.ticket_confirmed);
    }

    #[test]
    fn ignores_unknown_criterion() {
        let catalog = Catalog::builtin().expect("catalog");
        let query = IntakeQuery {
            ticket: None,
            criterion: Some("nope".to_string()),
        };
        assert!(query.hydration_actions(&catalog).is_empty());
    }

    #[test]
    fn mirrors_state_into_query_string() {
        let mut state = WizardState::for_ticket("CS-7");
        assert_eq!(IntakeQuery::from_state(&state).to_query_string(), "t=CS-7");

        state.selected_criterion_id = Some("CRIT COSMETIC".to_string());
        assert_eq!(
            IntakeQuery::from_state(&state).to_query_string(),
            "t=CS-7&crit=CRIT%20COSMETIC"
        );
        assert_eq!(IntakeQuery::from_state(&WizardState::new()).to_query_string(), "");
    }
}
