//! Contracts between the house and the people behind a title.
//!
//! A contract names exactly one contracted party. The party is a closed set of
//! kinds ([`ContractedParty`]); an id only means something together with its
//! kind, and the store looks parties up by both.

use serde::{Deserialize, Serialize};

use imprint_core::money::{
    ensure_money_range, ensure_money_scale, ensure_non_negative, ensure_percent,
};
use imprint_core::{
    Actor, ContractId, Decimal, DomainError, DomainResult, Entity, ListItemId, PartyId,
    ProjectId, RecordMeta,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Author,
    Translator,
    RightsOwner,
    Reviewer,
    Stakeholder,
}

impl PartyKind {
    pub const ALL: [PartyKind; 5] = [
        PartyKind::Author,
        PartyKind::Translator,
        PartyKind::RightsOwner,
        PartyKind::Reviewer,
        PartyKind::Stakeholder,
    ];

    pub fn code(self) -> &'static str {
        match self {
            PartyKind::Author => "author",
            PartyKind::Translator => "translator",
            PartyKind::RightsOwner => "rights_owner",
            PartyKind::Reviewer => "reviewer",
            PartyKind::Stakeholder => "stakeholder",
        }
    }

    pub fn from_code(code: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| {
                DomainError::field("party.type", format!("unknown contracted party type: {code}"))
            })
    }

    /// Name used in not-found errors.
    pub fn entity_name(self) -> &'static str {
        match self {
            PartyKind::Author => "author",
            PartyKind::Translator => "translator",
            PartyKind::RightsOwner => "rights owner",
            PartyKind::Reviewer => "reviewer",
            PartyKind::Stakeholder => "stakeholder",
        }
    }
}

/// The one party a contract is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ContractedParty {
    Author(PartyId),
    Translator(PartyId),
    RightsOwner(PartyId),
    Reviewer(PartyId),
    Stakeholder(PartyId),
}

impl ContractedParty {
    pub fn new(kind: PartyKind, id: PartyId) -> Self {
        match kind {
            PartyKind::Author => ContractedParty::Author(id),
            PartyKind::Translator => ContractedParty::Translator(id),
            PartyKind::RightsOwner => ContractedParty::RightsOwner(id),
            PartyKind::Reviewer => ContractedParty::Reviewer(id),
            PartyKind::Stakeholder => ContractedParty::Stakeholder(id),
        }
    }

    pub fn kind(&self) -> PartyKind {
        match self {
            ContractedParty::Author(_) => PartyKind::Author,
            ContractedParty::Translator(_) => PartyKind::Translator,
            ContractedParty::RightsOwner(_) => PartyKind::RightsOwner,
            ContractedParty::Reviewer(_) => PartyKind::Reviewer,
            ContractedParty::Stakeholder(_) => PartyKind::Stakeholder,
        }
    }

    pub fn id(&self) -> PartyId {
        match *self {
            ContractedParty::Author(id)
            | ContractedParty::Translator(id)
            | ContractedParty::RightsOwner(id)
            | ContractedParty::Reviewer(id)
            | ContractedParty::Stakeholder(id) => id,
        }
    }
}

/// Unresolved `{type, id}` pair as received from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: PartyId,
}

impl PartyRef {
    /// Check the kind. Existence is up to the store.
    pub fn parse(&self) -> DomainResult<ContractedParty> {
        let kind = PartyKind::from_code(self.kind.trim())?;
        Ok(ContractedParty::new(kind, self.id))
    }
}

/// A registered author, translator, rights owner, reviewer or stakeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub party: ContractedParty,
    pub name: String,
    /// Bio for people, contact details for rights owners.
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParty {
    #[serde(rename = "type")]
    pub kind: PartyKind,
    pub name: String,
    #[serde(default)]
    pub details: String,
}

impl NewParty {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::field("name", "name cannot be empty"));
        }
        Ok(())
    }

    pub fn into_party(self, id: PartyId) -> Party {
        Party {
            party: ContractedParty::new(self.kind, id),
            name: self.name.trim().to_string(),
            details: self.details,
        }
    }
}

/// Publishing, translation, rights or review contract for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub project_id: ProjectId,
    /// Entry of the `contract_type` list.
    pub contract_type: Option<ListItemId>,
    pub party: ContractedParty,
    pub commission_percent: Option<Decimal>,
    pub fixed_amount: Option<Decimal>,
    pub free_copies: Option<i32>,
    pub duration_months: Option<i32>,
    pub payment_schedule: String,
    pub meta: RecordMeta,
}

impl Entity for Contract {
    type Id = ContractId;
    const NAME: &'static str = "contract";

    fn id(&self) -> ContractId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContract {
    pub project_id: ProjectId,
    #[serde(default)]
    pub contract_type: Option<ListItemId>,
    pub party: PartyRef,
    #[serde(default)]
    pub commission_percent: Option<Decimal>,
    #[serde(default)]
    pub fixed_amount: Option<Decimal>,
    #[serde(default)]
    pub free_copies: Option<i32>,
    #[serde(default)]
    pub duration_months: Option<i32>,
    #[serde(default)]
    pub payment_schedule: String,
}

impl NewContract {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(pct) = self.commission_percent {
            ensure_percent("commission_percent", pct)?;
        }
        if let Some(amount) = self.fixed_amount {
            ensure_non_negative("fixed_amount", amount)?;
            ensure_money_scale("fixed_amount", amount)?;
            ensure_money_range("fixed_amount", amount)?;
        }
        if matches!(self.free_copies, Some(n) if n < 0) {
            return Err(DomainError::field("free_copies", "free_copies cannot be negative"));
        }
        if matches!(self.duration_months, Some(n) if n <= 0) {
            return Err(DomainError::field(
                "duration_months",
                "duration_months must be positive",
            ));
        }
        Ok(())
    }

    /// Build the contract for an already resolved party.
    pub fn into_contract(self, id: ContractId, party: ContractedParty, actor: &Actor) -> Contract {
        Contract {
            id,
            project_id: self.project_id,
            contract_type: self.contract_type,
            party,
            commission_percent: self.commission_percent,
            fixed_amount: self.fixed_amount,
            free_copies: self.free_copies,
            duration_months: self.duration_months,
            payment_schedule: self.payment_schedule,
            meta: RecordMeta::created(actor),
        }
    }
}
