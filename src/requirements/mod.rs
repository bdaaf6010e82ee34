//! Per-stage data-completeness rules
//!
//! A requirement attached to stage N gates the single forward step N -> N+1.
//! Backward moves never consult it and skip moves are rejected before it runs.

mod types;


use std::collections::BTreeMap;

use crate::models::{FieldName, FieldPatch, Opportunity, TerminalKind};

pub use types::{FieldSpec, TerminalCaptureRule};

/// Stateless checker over the static requirement table.
#[derive(Debug, Clone)]
pub struct TransitionValidator {
    requirements: BTreeMap<String, Vec<FieldSpec>>,
    captures: BTreeMap<TerminalKind, TerminalCaptureRule>,
}

impl Default for TransitionValidator {
    fn default() -> Self {
        Self::new(BTreeMap::new(), Vec::new())
    }
}

impl TransitionValidator {
    pub fn new(
        requirements: BTreeMap<String, Vec<FieldSpec>>,
        captures: Vec<TerminalCaptureRule>,
    ) -> Self {
        let mut by_kind: BTreeMap<TerminalKind, TerminalCaptureRule> = [
            TerminalCaptureRule::won_default(),
            TerminalCaptureRule::lost_default(),
        ]
        .into_iter()
        .map(|rule| (rule.kind, rule))
        .collect();
        for rule in captures {
            by_kind.insert(rule.kind, rule);
        }

        Self {
            requirements,
            captures: by_kind,
        }
    }

    /// Requirement table of the standard sales pipeline
    /// (lead -> qualify -> quote -> close). Close is left by Won/Lost only,
    /// so it carries no requirements.
    pub fn standard() -> Self {
        Self::new(standard_requirements(), Vec::new())
    }

    pub fn requirements_for(&self, stage_key: &str) -> &[FieldSpec] {
        self.requirements
            .get(stage_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stage_keys(&self) -> impl Iterator<Item = &str> {
        self.requirements.keys().map(String::as_str)
    }

    /// Every required field of `stage_key` whose value is absent on the record.
    ///
    /// Pure and idempotent; safe to call on every drag-over tick. Unknown keys
    /// and stages without requirements yield an empty list.
    pub fn missing_fields(&self, opportunity: &Opportunity, stage_key: &str) -> Vec<FieldSpec> {
        self.requirements_for(stage_key)
            .iter()
            .filter(|spec| spec.is_unmet(opportunity))
            .cloned()
            .collect()
    }

    /// Missing fields once `patch` is merged into the record, without touching it.
    pub fn missing_after(
        &self,
        opportunity: &Opportunity,
        patch: &FieldPatch,
        stage_key: &str,
    ) -> Vec<FieldSpec> {
        let mut merged = opportunity.clone();
        patch.apply_to(&mut merged);
        self.missing_fields(&merged, stage_key)
    }

    pub fn capture_rule(&self, kind: TerminalKind) -> &TerminalCaptureRule {
        // `new` seeds both kinds
        &self.captures[&kind]
    }

    pub fn capture_satisfied(&self, opportunity: &Opportunity, kind: TerminalKind) -> bool {
        self.capture_rule(kind).is_satisfied(opportunity)
    }
}

pub fn standard_requirements() -> BTreeMap<String, Vec<FieldSpec>> {
    BTreeMap::from([
        (
            "lead".to_string(),
            vec![
                FieldSpec::required(FieldName::Contact),
                FieldSpec::required(FieldName::Products),
                FieldSpec::required(FieldName::LeadOrigin),
            ],
        ),
        (
            "qualify".to_string(),
            vec![FieldSpec::required(FieldName::TypeOfSale)],
        ),
        (
            "quote".to_string(),
            vec![
                FieldSpec::positive(FieldName::NetPrice),
                FieldSpec::positive(FieldName::SalesPrice),
            ],
        ),
    ])
}
