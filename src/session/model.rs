use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::values::{ConfidencePercent, DiscriminativePower};
use crate::error::SchemaError;
use crate::queue::TestQueue;

/// Schema version written by this reader. Records carrying `1..=SCHEMA_VERSION`
/// are understood; anything newer is rejected.
pub const SCHEMA_VERSION: u32 = 1;

/// Separator between the namespace, the session id and key suffixes.
pub const KEY_SEPARATOR: char = ':';

/// A research session: the root aggregate persisted as one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Caller-assigned identifier, stable for the session's lifetime.
    pub id: String,
    /// Schema version of the record.
    #[serde(rename = "_version")]
    pub version: u32,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Current workflow phase.
    #[serde(default)]
    pub phase: Phase,
    /// Version label of the primary hypothesis.
    #[serde(default)]
    pub primary_hypothesis_id: Option<String>,
    /// Alternative hypotheses, in the order they were added.
    #[serde(default)]
    pub alternative_hypothesis_ids: Vec<String>,
    /// Every hypothesis version ever created, keyed by version label.
    #[serde(default)]
    pub hypothesis_cards: BTreeMap<String, HypothesisCard>,
    /// Retired hypothesis versions, in retirement order.
    #[serde(default)]
    pub graveyard: Vec<String>,
    /// Designed tests awaiting execution.
    #[serde(default)]
    pub test_queue: TestQueue,
}

impl Session {
    /// Create an empty session in the intake phase.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
            phase: Phase::Intake,
            primary_hypothesis_id: None,
            alternative_hypothesis_ids: Vec::new(),
            hypothesis_cards: BTreeMap::new(),
            graveyard: Vec::new(),
            test_queue: TestQueue::default(),
        }
    }

    /// Set phase
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Mark the session as mutated now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Parse a persisted record and check its structural invariants.
    pub fn from_record(raw: &str) -> Result<Self, SchemaError> {
        let session: Session = serde_json::from_str(raw)?;
        session.validate()?;
        Ok(session)
    }

    /// Check the structural invariants of the record.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version == 0 || self.version > SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: self.version,
                supported: SCHEMA_VERSION,
            });
        }

        Self::check_id(&self.id)?;

        for (key, card) in &self.hypothesis_cards {
            if key != &card.id {
                return Err(SchemaError::CardKeyMismatch {
                    key: key.clone(),
                    id: card.id.clone(),
                });
            }
        }

        if let Some(primary) = self.primary_id() {
            if !self.hypothesis_cards.contains_key(primary) {
                return Err(SchemaError::DanglingPrimary {
                    id: primary.to_string(),
                });
            }
        }

        if let Some(id) = self
            .alternative_hypothesis_ids
            .iter()
            .find(|id| !self.hypothesis_cards.contains_key(*id))
        {
            return Err(SchemaError::DanglingAlternative { id: id.clone() });
        }

        if let Some(id) = self
            .graveyard
            .iter()
            .find(|id| !self.hypothesis_cards.contains_key(*id))
        {
            return Err(SchemaError::DanglingRetired { id: id.clone() });
        }

        if let Some(primary) = self.primary_id() {
            if self.is_retired(primary) {
                return Err(SchemaError::RetiredPrimary {
                    id: primary.to_string(),
                });
            }
        }

        if let Some(id) = self
            .alternative_hypothesis_ids
            .iter()
            .find(|id| self.is_retired(id))
        {
            return Err(SchemaError::RetiredAlternative { id: id.clone() });
        }

        Ok(())
    }

    /// Check that `id` can be used as a session id.
    ///
    /// Ids may not contain `:`, the key separator, so that no session's
    /// primary key can coincide with another session's backup or
    /// quarantine key.
    pub fn check_id(id: &str) -> Result<(), SchemaError> {
        if id.trim().is_empty() {
            return Err(SchemaError::EmptyId);
        }
        if id.contains(KEY_SEPARATOR) {
            return Err(SchemaError::InvalidId { id: id.to_string() });
        }
        Ok(())
    }

    /// Primary hypothesis label, treating an empty string as unset.
    pub fn primary_id(&self) -> Option<&str> {
        self.primary_hypothesis_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// The primary hypothesis card, if one is assigned.
    pub fn primary(&self) -> Option<&HypothesisCard> {
        self.primary_id().and_then(|id| self.hypothesis_cards.get(id))
    }

    /// Look up a hypothesis card by version label.
    pub fn card(&self, version: &str) -> Option<&HypothesisCard> {
        self.hypothesis_cards.get(version)
    }

    /// Whether the version has been moved to the graveyard.
    pub fn is_retired(&self, version: &str) -> bool {
        self.graveyard.iter().any(|id| id == version)
    }

    /// Total evidence entries across every hypothesis version.
    pub fn evidence_count(&self) -> usize {
        self.hypothesis_cards
            .values()
            .map(|c| c.evidence().len())
            .sum()
    }
}

/// Workflow phase of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Gathering the problem statement.
    #[default]
    Intake,
    /// Writing candidate hypotheses.
    Formulation,
    /// Designing discriminating tests.
    TestDesign,
    /// Running tests.
    Execution,
    /// Recording and weighing evidence.
    Evaluation,
    /// Revising or replacing hypotheses.
    Revision,
    /// The investigation is closed.
    Concluded,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Intake => write!(f, "intake"),
            Phase::Formulation => write!(f, "formulation"),
            Phase::TestDesign => write!(f, "test_design"),
            Phase::Execution => write!(f, "execution"),
            Phase::Evaluation => write!(f, "evaluation"),
            Phase::Revision => write!(f, "revision"),
            Phase::Concluded => write!(f, "concluded"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intake" => Ok(Phase::Intake),
            "formulation" => Ok(Phase::Formulation),
            "test_design" => Ok(Phase::TestDesign),
            "execution" => Ok(Phase::Execution),
            "evaluation" => Ok(Phase::Evaluation),
            "revision" => Ok(Phase::Revision),
            "concluded" => Ok(Phase::Concluded),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// One hypothesis version and its evidence history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HypothesisCard {
    /// Version label (e.g. "H1").
    pub id: String,
    /// The candidate explanation.
    pub statement: String,
    /// Current confidence, updated by each recorded entry.
    pub confidence: ConfidencePercent,
    /// When the version was created.
    pub created_at: DateTime<Utc>,
    /// When the version was retired, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    evidence: Vec<EvidenceEntry>,
}

impl HypothesisCard {
    /// Create a card with no evidence.
    pub fn new(
        id: impl Into<String>,
        statement: impl Into<String>,
        confidence: ConfidencePercent,
    ) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            confidence,
            created_at: Utc::now(),
            retired_at: None,
            evidence: Vec::new(),
        }
    }

    /// Evidence in recorded order.
    pub fn evidence(&self) -> &[EvidenceEntry] {
        &self.evidence
    }

    /// Evidence newest first.
    pub fn evidence_newest_first(&self) -> impl Iterator<Item = &EvidenceEntry> {
        self.evidence.iter().rev()
    }

    pub(crate) fn append_evidence(&mut self, entry: EvidenceEntry) {
        self.confidence = entry.confidence_after;
        self.evidence.push(entry);
    }
}

/// Qualitative outcome of a test against a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceResult {
    /// The observation matched the "hypothesis true" prediction.
    Supports,
    /// The observation matched the "hypothesis false" prediction.
    Challenges,
    /// The observation did not separate the predictions.
    Neutral,
}

impl std::fmt::Display for EvidenceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceResult::Supports => write!(f, "supports"),
            EvidenceResult::Challenges => write!(f, "challenges"),
            EvidenceResult::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for EvidenceResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "supports" => Ok(EvidenceResult::Supports),
            "challenges" => Ok(EvidenceResult::Challenges),
            "neutral" => Ok(EvidenceResult::Neutral),
            _ => Err(format!("Unknown evidence result: {}", s)),
        }
    }
}

/// A planned discriminating experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDesign {
    /// Unique test identifier.
    pub id: String,
    /// What will be done.
    pub description: String,
    /// Free-form classification (e.g. "observation", "experiment").
    pub test_type: String,
    /// How well the test separates the hypotheses.
    pub discriminative_power: DiscriminativePower,
}

impl TestDesign {
    /// Create a test design with a fresh id.
    pub fn new(
        description: impl Into<String>,
        test_type: impl Into<String>,
        discriminative_power: DiscriminativePower,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            test_type: test_type.into(),
            discriminative_power,
        }
    }
}

/// Outcome of an executed test, as submitted for recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The test that was run.
    pub test: TestDesign,
    /// Expected observation if the hypothesis is true.
    #[serde(default)]
    pub prediction_if_true: String,
    /// Expected observation if the hypothesis is false.
    #[serde(default)]
    pub prediction_if_false: String,
    /// Qualitative result.
    pub result: EvidenceResult,
    /// What was actually observed.
    #[serde(default)]
    pub observation: String,
    /// The researcher's reading of the observation.
    #[serde(default)]
    pub interpretation: String,
}

impl TestResult {
    /// Create a result with empty free-text fields.
    pub fn new(test: TestDesign, result: EvidenceResult) -> Self {
        Self {
            test,
            prediction_if_true: String::new(),
            prediction_if_false: String::new(),
            result,
            observation: String::new(),
            interpretation: String::new(),
        }
    }

    /// Set predictions
    pub fn with_predictions(
        mut self,
        if_true: impl Into<String>,
        if_false: impl Into<String>,
    ) -> Self {
        self.prediction_if_true = if_true.into();
        self.prediction_if_false = if_false.into();
        self
    }

    /// Set observation
    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = observation.into();
        self
    }

    /// Set interpretation
    pub fn with_interpretation(mut self, interpretation: impl Into<String>) -> Self {
        self.interpretation = interpretation.into();
        self
    }
}

/// One immutable recorded observation against one hypothesis version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceEntry {
    /// Unique entry identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Hypothesis version the entry was recorded against.
    pub hypothesis_version: String,
    /// The test that produced the entry.
    pub test: TestDesign,
    /// Expected observation if the hypothesis is true.
    pub prediction_if_true: String,
    /// Expected observation if the hypothesis is false.
    pub prediction_if_false: String,
    /// Qualitative result.
    pub result: EvidenceResult,
    /// What was observed.
    pub observation: String,
    /// Confidence before this entry.
    pub confidence_before: ConfidencePercent,
    /// Confidence after this entry.
    pub confidence_after: ConfidencePercent,
    /// The researcher's reading of the observation.
    pub interpretation: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl EvidenceEntry {
    /// Signed confidence change in percentage points.
    pub fn confidence_delta(&self) -> i16 {
        i16::from(self.confidence_after.value()) - i16::from(self.confidence_before.value())
    }
}
