use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opportunity fields that stage rules and terminal captures can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldName {
    Contact,
    Company,
    Products,
    AssignedTo,
    LeadOrigin,
    TypeOfSale,
    NetPrice,
    SalesPrice,
    ExpectedCloseDate,
    WonDocumentRef,
    WonOrderDescription,
    LostReason,
}

impl FieldName {
    pub const ALL: [FieldName; 12] = [
        FieldName::Contact,
        FieldName::Company,
        FieldName::Products,
        FieldName::AssignedTo,
        FieldName::LeadOrigin,
        FieldName::TypeOfSale,
        FieldName::NetPrice,
        FieldName::SalesPrice,
        FieldName::ExpectedCloseDate,
        FieldName::WonDocumentRef,
        FieldName::WonOrderDescription,
        FieldName::LostReason,
    ];

    /// Human-readable label for gap-fill forms.
    pub fn label(&self) -> &'static str {
        match self {
            FieldName::Contact => "Contact",
            FieldName::Company => "Company",
            FieldName::Products => "Products",
            FieldName::AssignedTo => "Assigned to",
            FieldName::LeadOrigin => "Lead origin",
            FieldName::TypeOfSale => "Type of sale",
            FieldName::NetPrice => "Net price",
            FieldName::SalesPrice => "Sales price",
            FieldName::ExpectedCloseDate => "Expected close date",
            FieldName::WonDocumentRef => "Purchase order reference",
            FieldName::WonOrderDescription => "Order description",
            FieldName::LostReason => "Lost reason",
        }
    }

    /// Whether the field holds free text, so it can be captured from a single input.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FieldName::Contact
                | FieldName::Company
                | FieldName::AssignedTo
                | FieldName::LeadOrigin
                | FieldName::TypeOfSale
                | FieldName::WonDocumentRef
                | FieldName::WonOrderDescription
                | FieldName::LostReason
        )
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldName::Contact => "contact",
            FieldName::Company => "company",
            FieldName::Products => "products",
            FieldName::AssignedTo => "assigned-to",
            FieldName::LeadOrigin => "lead-origin",
            FieldName::TypeOfSale => "type-of-sale",
            FieldName::NetPrice => "net-price",
            FieldName::SalesPrice => "sales-price",
            FieldName::ExpectedCloseDate => "expected-close-date",
            FieldName::WonDocumentRef => "won-document-ref",
            FieldName::WonOrderDescription => "won-order-description",
            FieldName::LostReason => "lost-reason",
        };
        write!(f, "{name}")
    }
}

/// Borrowed view of one field's current value on an opportunity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Missing,
    Text(&'a str),
    Number(f64),
    Date(NaiveDate),
    Ids(&'a BTreeSet<String>),
}

/// Predicate deciding whether a field counts as filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presence {
    /// Not null, not an empty or blank string, not an empty set.
    #[default]
    Present,
    /// A number strictly greater than zero.
    Positive,
}

impl Presence {
    pub fn holds(&self, value: FieldValue<'_>) -> bool {
        match (self, value) {
            (_, FieldValue::Missing) => false,
            (Presence::Present, FieldValue::Text(text)) => !text.trim().is_empty(),
            (Presence::Present, FieldValue::Ids(ids)) => !ids.is_empty(),
            (Presence::Present, FieldValue::Number(_) | FieldValue::Date(_)) => true,
            (Presence::Positive, FieldValue::Number(n)) => n > 0.0,
            (Presence::Positive, _) => false,
        }
    }
}
