use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use imprint_core::money::{ensure_money_range, ensure_money_scale, ensure_non_negative};
use imprint_core::{
    Actor, Decimal, DomainError, DomainResult, Entity, ListItemId, ProductId, ProjectId,
    RecordMeta,
};

/// Normalized ISBN: hyphens and spaces stripped, 10 or 13 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let valid = match compact.len() {
            13 => compact.chars().all(|c| c.is_ascii_digit()),
            10 => {
                let (body, check) = compact.split_at(9);
                body.chars().all(|c| c.is_ascii_digit())
                    && check.chars().all(|c| c.is_ascii_digit() || c == 'X')
            }
            _ => false,
        };
        if !valid {
            return Err(DomainError::field(
                "isbn",
                format!("'{raw}' is not a 10 or 13 digit ISBN"),
            ));
        }
        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Isbn {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Isbn::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(value: Isbn) -> Self {
        value.0
    }
}

impl core::fmt::Display for Isbn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "draft" => Ok(ProductStatus::Draft),
            "active" => Ok(ProductStatus::Active),
            "archived" => Ok(ProductStatus::Archived),
            other => Err(DomainError::field("status", format!("unknown product status: {other}"))),
        }
    }
}

/// A published (or in-production) title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub project_id: Option<ProjectId>,
    pub isbn: Isbn,
    pub title: String,
    pub price: Decimal,
    pub print_cost: Decimal,
    pub status: ProductStatus,
    /// Entry of the `genre` list.
    pub genre: Option<ListItemId>,
    pub published_at: Option<NaiveDate>,
    pub is_direct_product: bool,
    pub meta: RecordMeta,
}

impl Product {
    /// Only active products can go on an invoice line.
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Gross margin per copy.
    pub fn unit_margin(&self) -> Decimal {
        self.price - self.print_cost
    }
}

impl Entity for Product {
    type Id = ProductId;
    const NAME: &'static str = "product";

    fn id(&self) -> ProductId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub isbn: Isbn,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub print_cost: Decimal,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub genre: Option<ListItemId>,
    #[serde(default)]
    pub published_at: Option<NaiveDate>,
    #[serde(default)]
    pub is_direct_product: bool,
}

impl NewProduct {
    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::field("title", "title cannot be empty"));
        }
        ensure_non_negative("price", self.price)?;
        ensure_money_scale("price", self.price)?;
        ensure_money_range("price", self.price)?;
        ensure_non_negative("print_cost", self.print_cost)?;
        ensure_money_scale("print_cost", self.print_cost)?;
        ensure_money_range("print_cost", self.print_cost)?;
        Ok(())
    }

    pub fn into_product(self, id: ProductId, actor: &Actor) -> Product {
        Product {
            id,
            project_id: self.project_id,
            isbn: self.isbn,
            title: self.title.trim().to_string(),
            price: self.price,
            print_cost: self.print_cost,
            status: self.status,
            genre: self.genre,
            published_at: self.published_at,
            is_direct_product: self.is_direct_product,
            meta: RecordMeta::created(actor),
        }
    }
}
