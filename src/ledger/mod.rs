//! Hypothesis and evidence ledger.
//!
//! All operations work on an in-memory [`Session`]; persisting the result is
//! the caller's job. Recorded evidence entries are append-only: nothing in
//! this module hands out a mutable reference to an existing entry.

mod policy;

pub use policy::{ConfidencePolicy, FixedStepPolicy, LikelihoodRatioPolicy};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::session::{ConfidencePercent, EvidenceEntry, HypothesisCard, Session, TestResult};

/// Applies hypothesis and evidence changes to a session.
#[derive(Clone)]
pub struct Ledger {
    policy: Arc<dyn ConfidencePolicy>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(Arc::new(LikelihoodRatioPolicy))
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("policy", &self.policy.name())
            .finish()
    }
}

impl Ledger {
    /// Create a ledger using the given confidence policy.
    pub fn new(policy: Arc<dyn ConfidencePolicy>) -> Self {
        Self { policy }
    }

    /// The active confidence policy.
    pub fn policy(&self) -> &dyn ConfidencePolicy {
        self.policy.as_ref()
    }

    /// Add a new hypothesis version.
    pub fn add_hypothesis(
        &self,
        session: &mut Session,
        version: &str,
        statement: &str,
        confidence: ConfidencePercent,
    ) -> LedgerResult<()> {
        if version.trim().is_empty() {
            return Err(LedgerError::validation("version", "cannot be empty"));
        }
        if statement.trim().is_empty() {
            return Err(LedgerError::validation("statement", "cannot be empty"));
        }
        if session.hypothesis_cards.contains_key(version) {
            return Err(LedgerError::HypothesisExists {
                version: version.to_string(),
            });
        }

        session.hypothesis_cards.insert(
            version.to_string(),
            HypothesisCard::new(version, statement, confidence),
        );
        session.touch();

        debug!(session_id = %session.id, version = %version, confidence = %confidence, "Hypothesis added");
        Ok(())
    }

    /// Make `version` the primary hypothesis.
    ///
    /// The previous primary, if any, becomes an alternative.
    pub fn set_primary(&self, session: &mut Session, version: &str) -> LedgerResult<()> {
        self.live_card(session, version)?;

        if session.primary_id() == Some(version) {
            return Ok(());
        }

        if let Some(previous) = session.primary_hypothesis_id.take() {
            if !previous.is_empty() && !session.alternative_hypothesis_ids.contains(&previous) {
                session.alternative_hypothesis_ids.push(previous);
            }
        }
        session.alternative_hypothesis_ids.retain(|id| id != version);
        session.primary_hypothesis_id = Some(version.to_string());
        session.touch();

        info!(session_id = %session.id, version = %version, "Primary hypothesis set");
        Ok(())
    }

    /// Track `version` as a competing alternative. Adding an existing
    /// alternative again is a no-op.
    pub fn add_alternative(&self, session: &mut Session, version: &str) -> LedgerResult<()> {
        self.live_card(session, version)?;

        if session.primary_id() == Some(version) {
            return Err(LedgerError::validation(
                "version",
                format!("{} is the primary hypothesis", version),
            ));
        }
        if session.alternative_hypothesis_ids.iter().any(|id| id == version) {
            return Ok(());
        }

        session.alternative_hypothesis_ids.push(version.to_string());
        session.touch();
        Ok(())
    }

    /// Append an evidence entry to a live hypothesis version.
    ///
    /// Confidence-before is the card's current confidence; confidence-after
    /// comes from the policy and becomes the card's new confidence.
    pub fn record_evidence(
        &self,
        session: &mut Session,
        version: &str,
        outcome: TestResult,
    ) -> LedgerResult<EvidenceEntry> {
        if outcome.test.description.trim().is_empty() {
            return Err(LedgerError::validation("test.description", "cannot be empty"));
        }

        let before = self.live_card(session, version)?.confidence;
        let raw_after = self
            .policy
            .update(before, outcome.result, outcome.test.discriminative_power);
        let after = ConfidencePercent::from_f64(raw_after)?;

        let entry = EvidenceEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            hypothesis_version: version.to_string(),
            test: outcome.test,
            prediction_if_true: outcome.prediction_if_true,
            prediction_if_false: outcome.prediction_if_false,
            result: outcome.result,
            observation: outcome.observation,
            confidence_before: before,
            confidence_after: after,
            interpretation: outcome.interpretation,
            recorded_at: Utc::now(),
        };

        let card = session
            .hypothesis_cards
            .get_mut(version)
            .ok_or_else(|| LedgerError::HypothesisNotFound {
                version: version.to_string(),
            })?;
        card.append_evidence(entry.clone());
        session.touch();

        info!(
            session_id = %session.id,
            version = %version,
            result = %entry.result,
            power = %entry.test.discriminative_power,
            before = %before,
            after = %after,
            policy = self.policy.name(),
            "Evidence recorded"
        );
        Ok(entry)
    }

    /// Move a hypothesis version into the graveyard, keeping its evidence.
    pub fn retire_hypothesis(&self, session: &mut Session, version: &str) -> LedgerResult<()> {
        self.live_card(session, version)?;

        if session.primary_id() == Some(version) {
            return Err(LedgerError::PrimaryRetirement {
                version: version.to_string(),
            });
        }

        if let Some(card) = session.hypothesis_cards.get_mut(version) {
            card.retired_at = Some(Utc::now());
        }
        session.alternative_hypothesis_ids.retain(|id| id != version);
        session.graveyard.push(version.to_string());
        session.touch();

        info!(session_id = %session.id, version = %version, "Hypothesis retired");
        Ok(())
    }

    /// Evidence for one version, in recorded order or newest first.
    pub fn evidence<'s>(
        &self,
        session: &'s Session,
        version: &str,
        newest_first: bool,
    ) -> LedgerResult<Vec<&'s EvidenceEntry>> {
        let card = session
            .card(version)
            .ok_or_else(|| LedgerError::HypothesisNotFound {
                version: version.to_string(),
            })?;

        Ok(if newest_first {
            card.evidence_newest_first().collect()
        } else {
            card.evidence().iter().collect()
        })
    }

    /// Retired hypothesis cards, in retirement order.
    pub fn graveyard<'s>(&self, session: &'s Session) -> Vec<&'s HypothesisCard> {
        session
            .graveyard
            .iter()
            .filter_map(|id| session.card(id))
            .collect()
    }

    /// Current confidence of a version, retired or not.
    pub fn confidence_of(&self, session: &Session, version: &str) -> LedgerResult<ConfidencePercent> {
        session
            .card(version)
            .map(|card| card.confidence)
            .ok_or_else(|| LedgerError::HypothesisNotFound {
                version: version.to_string(),
            })
    }

    fn live_card<'s>(&self, session: &'s Session, version: &str) -> LedgerResult<&'s HypothesisCard> {
        let card = session
            .card(version)
            .ok_or_else(|| LedgerError::HypothesisNotFound {
                version: version.to_string(),
            })?;

        if session.is_retired(version) {
            return Err(LedgerError::HypothesisRetired {
                version: version.to_string(),
            });
        }
        Ok(card)
    }
}
