use serde::{Deserialize, Serialize};

use imprint_core::{
    Actor, CustomerId, DomainError, DomainResult, Entity, ListItemId, RecordMeta,
};

/// A bookshop, library, school or individual the house invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    /// Entry of the `customer_type` list.
    pub customer_type: Option<ListItemId>,
    pub institution_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub meta: RecordMeta,
}

impl Entity for Customer {
    type Id = CustomerId;
    const NAME: &'static str = "customer";

    fn id(&self) -> CustomerId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

const MAX_PHONE_LEN: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    #[serde(default)]
    pub customer_type: Option<ListItemId>,
    pub institution_name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Blank optional text is stored as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewCustomer {
    pub fn validate(&self) -> DomainResult<()> {
        if self.institution_name.trim().is_empty() {
            return Err(DomainError::field(
                "institution_name",
                "institution_name cannot be empty",
            ));
        }
        if let Some(phone) = self.phone.as_deref().map(str::trim) {
            if phone.chars().count() > MAX_PHONE_LEN {
                return Err(DomainError::field(
                    "phone",
                    format!("phone cannot exceed {MAX_PHONE_LEN} characters"),
                ));
            }
        }
        if let Some(email) = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid || email.contains(char::is_whitespace) {
                return Err(DomainError::field("email", format!("invalid email address: {email}")));
            }
        }
        Ok(())
    }

    pub fn into_customer(self, id: CustomerId, actor: &Actor) -> Customer {
        Customer {
            id,
            customer_type: self.customer_type,
            institution_name: self.institution_name.trim().to_string(),
            contact_person: non_blank(self.contact_person),
            phone: non_blank(self.phone),
            email: non_blank(self.email),
            meta: RecordMeta::created(actor),
        }
    }
}
