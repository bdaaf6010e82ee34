use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::field::{FieldName, FieldValue};
use crate::models::stage::StageId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityId(String);

impl OpportunityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("opp-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OpportunityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Client working copy of an opportunity owned by the backend of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub title: String,
    pub current_stage_id: StageId,
    pub contact_id: Option<String>,
    /// Derived from the linked contact.
    pub company_id: Option<String>,
    #[serde(default)]
    pub product_ids: BTreeSet<String>,
    pub assigned_to: Option<String>,
    pub lead_origin: Option<String>,
    pub type_of_sale: Option<String>,
    pub net_price: Option<f64>,
    pub sales_price: Option<f64>,
    pub expected_close_date: Option<NaiveDate>,
    pub won_document_ref: Option<String>,
    pub won_order_description: Option<String>,
    pub lost_reason: Option<String>,
    /// Server-side revision, bumped on every persisted write.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(title: impl Into<String>, stage_id: StageId) -> Self {
        let now = Utc::now();

        Self {
            id: OpportunityId::generate(),
            title: title.into(),
            current_stage_id: stage_id,
            contact_id: None,
            company_id: None,
            product_ids: BTreeSet::new(),
            assigned_to: None,
            lead_origin: None,
            type_of_sale: None,
            net_price: None,
            sales_price: None,
            expected_close_date: None,
            won_document_ref: None,
            won_order_description: None,
            lost_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = OpportunityId::new(id);
        self
    }

    /// Read a field by name for requirement checks.
    pub fn field(&self, name: FieldName) -> FieldValue<'_> {
        fn text(value: &Option<String>) -> FieldValue<'_> {
            value.as_deref().map_or(FieldValue::Missing, FieldValue::Text)
        }
        fn number(value: Option<f64>) -> FieldValue<'static> {
            value.map_or(FieldValue::Missing, FieldValue::Number)
        }

        match name {
            FieldName::Contact => text(&self.contact_id),
            FieldName::Company => text(&self.company_id),
            FieldName::Products => FieldValue::Ids(&self.product_ids),
            FieldName::AssignedTo => text(&self.assigned_to),
            FieldName::LeadOrigin => text(&self.lead_origin),
            FieldName::TypeOfSale => text(&self.type_of_sale),
            FieldName::NetPrice => number(self.net_price),
            FieldName::SalesPrice => number(self.sales_price),
            FieldName::ExpectedCloseDate => self
                .expected_close_date
                .map_or(FieldValue::Missing, FieldValue::Date),
            FieldName::WonDocumentRef => text(&self.won_document_ref),
            FieldName::WonOrderDescription => text(&self.won_order_description),
            FieldName::LostReason => text(&self.lost_reason),
        }
    }
}
