use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::Opportunity;
use crate::models::field::FieldName;
use crate::models::stage::StageId;

/// Change to a single optional field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "op", content = "value")]
pub enum Patch<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *slot = Some(value),
            Patch::Clear => *slot = None,
        }
    }

    /// Later patch wins unless it leaves the field alone.
    fn merge(&mut self, other: Patch<T>) {
        if !other.is_keep() {
            *self = other;
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("Field '{0}' does not take a text value")]
    NotTextField(FieldName),
}

/// Partial update of an opportunity, optionally combined with a stage change.
///
/// Field edits and the stage move travel together so that a gap-filled
/// transition is persisted as a single write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub contact_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub company_id: Patch<String>,
    /// Replaces the whole product set; `Clear` empties it.
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub product_ids: Patch<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub assigned_to: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub lead_origin: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub type_of_sale: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub net_price: Patch<f64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub sales_price: Patch<f64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub expected_close_date: Patch<NaiveDate>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub won_document_ref: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub won_order_description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub lost_reason: Patch<String>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bare stage move with no field edits.
    pub fn move_to(stage: StageId) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: StageId) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Link a contact; the company always follows the contact.
    pub fn with_contact(
        mut self,
        contact_id: impl Into<String>,
        company_id: Option<String>,
    ) -> Self {
        self.contact_id = Patch::Set(contact_id.into());
        self.company_id = match company_id {
            Some(company) => Patch::Set(company),
            None => Patch::Clear,
        };
        self
    }

    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.product_ids = Patch::Set(products.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_lead_origin(mut self, origin: impl Into<String>) -> Self {
        self.lead_origin = Patch::Set(origin.into());
        self
    }

    pub fn with_type_of_sale(mut self, kind: impl Into<String>) -> Self {
        self.type_of_sale = Patch::Set(kind.into());
        self
    }

    pub fn with_prices(mut self, net_price: f64, sales_price: f64) -> Self {
        self.net_price = Patch::Set(net_price);
        self.sales_price = Patch::Set(sales_price);
        self
    }

    pub fn with_expected_close_date(mut self, date: NaiveDate) -> Self {
        self.expected_close_date = Patch::Set(date);
        self
    }

    /// Set a free-text field by name, as done by single-input captures.
    ///
    /// A contact set this way carries no company, so the company is cleared
    /// as `with_contact(id, None)` does.
    pub fn with_text(
        mut self,
        field: FieldName,
        value: impl Into<String>,
    ) -> Result<Self, PatchError> {
        let value = value.into();
        match field {
            FieldName::Contact => return Ok(self.with_contact(value, None)),
            FieldName::Company => self.company_id = Patch::Set(value),
            FieldName::AssignedTo => self.assigned_to = Patch::Set(value),
            FieldName::LeadOrigin => self.lead_origin = Patch::Set(value),
            FieldName::TypeOfSale => self.type_of_sale = Patch::Set(value),
            FieldName::WonDocumentRef => self.won_document_ref = Patch::Set(value),
            FieldName::WonOrderDescription => self.won_order_description = Patch::Set(value),
            FieldName::LostReason => self.lost_reason = Patch::Set(value),
            FieldName::Products
            | FieldName::NetPrice
            | FieldName::SalesPrice
            | FieldName::ExpectedCloseDate => return Err(PatchError::NotTextField(field)),
        }
        Ok(self)
    }

    /// Fields (not counting the stage) that this patch touches.
    pub fn touched_fields(&self) -> Vec<FieldName> {
        let touched = [
            (FieldName::Contact, self.contact_id.is_keep()),
            (FieldName::Company, self.company_id.is_keep()),
            (FieldName::Products, self.product_ids.is_keep()),
            (FieldName::AssignedTo, self.assigned_to.is_keep()),
            (FieldName::LeadOrigin, self.lead_origin.is_keep()),
            (FieldName::TypeOfSale, self.type_of_sale.is_keep()),
            (FieldName::NetPrice, self.net_price.is_keep()),
            (FieldName::SalesPrice, self.sales_price.is_keep()),
            (FieldName::ExpectedCloseDate, self.expected_close_date.is_keep()),
            (FieldName::WonDocumentRef, self.won_document_ref.is_keep()),
            (FieldName::WonOrderDescription, self.won_order_description.is_keep()),
            (FieldName::LostReason, self.lost_reason.is_keep()),
        ];
        touched
            .into_iter()
            .filter(|(_, keep)| !keep)
            .map(|(field, _)| field)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none() && self.touched_fields().is_empty()
    }

    /// True when the patch is a plain stage move.
    pub fn is_stage_only(&self) -> bool {
        self.stage.is_some() && self.touched_fields().is_empty()
    }

    /// Fold `other` into `self`; fields set in `other` win.
    pub fn merge(&mut self, other: FieldPatch) {
        if other.stage.is_some() {
            self.stage = other.stage;
        }
        self.contact_id.merge(other.contact_id);
        self.company_id.merge(other.company_id);
        self.product_ids.merge(other.product_ids);
        self.assigned_to.merge(other.assigned_to);
        self.lead_origin.merge(other.lead_origin);
        self.type_of_sale.merge(other.type_of_sale);
        self.net_price.merge(other.net_price);
        self.sales_price.merge(other.sales_price);
        self.expected_close_date.merge(other.expected_close_date);
        self.won_document_ref.merge(other.won_document_ref);
        self.won_order_description.merge(other.won_order_description);
        self.lost_reason.merge(other.lost_reason);
    }

    /// Write the patch into a record. Server-owned fields (`version`,
    /// `updated_at`) are left untouched.
    pub fn apply_to(&self, record: &mut Opportunity) {
        let patch = self.clone();
        if let Some(stage) = patch.stage {
            record.current_stage_id = stage;
        }
        patch.contact_id.apply(&mut record.contact_id);
        patch.company_id.apply(&mut record.company_id);
        match patch.product_ids {
            Patch::Keep => {}
            Patch::Set(ids) => record.product_ids = ids,
            Patch::Clear => record.product_ids.clear(),
        }
        patch.assigned_to.apply(&mut record.assigned_to);
        patch.lead_origin.apply(&mut record.lead_origin);
        patch.type_of_sale.apply(&mut record.type_of_sale);
        patch.net_price.apply(&mut record.net_price);
        patch.sales_price.apply(&mut record.sales_price);
        patch.expected_close_date.apply(&mut record.expected_close_date);
        patch.won_document_ref.apply(&mut record.won_document_ref);
        patch.won_order_description.apply(&mut record.won_order_description);
        patch.lost_reason.apply(&mut record.lost_reason);
    }
}
