use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps, with_tax};

/// Default VAT rate, in percent.
pub const DEFAULT_TAX_RATE: f64 = 20.0;

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    #[serde(rename = "actif")]
    Active,
    #[serde(rename = "inactif")]
    Inactive,
    #[serde(rename = "rupture")]
    OutOfStock,
}

impl Lifecycle for ProductStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ProductStatus::*;
        matches!(
            (self, next),
            (Active, Inactive | OutOfStock) | (OutOfStock, Active | Inactive) | (Inactive, Active)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "actif",
            ProductStatus::Inactive => "inactif",
            ProductStatus::OutOfStock => "rupture",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ProductStatus::Active => "Actif",
            ProductStatus::Inactive => "Inactif",
            ProductStatus::OutOfStock => "En rupture",
        }
    }
}

/// Catalog entry.
///
/// Prices are tax-exclusive; `price_ttc` is derived from `unit_price` and
/// `tax_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub unit_price: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default)]
    pub price_ttc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub status: ProductStatus,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub unit_price: f64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_price: Option<f64>,
    pub tax_rate: Option<f64>,
    pub unit: Option<String>,
    pub status: Option<ProductStatus>,
}

impl Entity for Product {
    type Draft = ProductDraft;
    type Patch = ProductPatch;
    type Status = ProductStatus;

    const KIND: EntityKind = EntityKind::Product;

    fn from_draft(id: EntityId, draft: ProductDraft, now: DateTime<Utc>) -> Self {
        let mut product = Product {
            id,
            name: draft.name,
            sku: draft.sku,
            description: draft.description,
            category: draft.category,
            unit_price: draft.unit_price,
            tax_rate: draft.tax_rate,
            price_ttc: 0.0,
            unit: draft.unit,
            status: draft.status,
            timestamps: Timestamps::new(now),
        };
        product.recompute();
        product
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }

    fn status(&self) -> ProductStatus {
        self.status
    }

    fn patch_status(patch: &ProductPatch) -> Option<ProductStatus> {
        patch.status
    }

    fn status_patch(status: ProductStatus) -> ProductPatch {
        ProductPatch {
            status: Some(status),
            ..ProductPatch::default()
        }
    }

    fn apply_patch(&mut self, patch: ProductPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(sku) = patch.sku {
            self.sku = sku;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(category) = patch.category {
            self.category = Some(category);
        }
        if let Some(price) = patch.unit_price {
            self.unit_price = price;
        }
        if let Some(rate) = patch.tax_rate {
            self.tax_rate = rate;
        }
        if let Some(unit) = patch.unit {
            self.unit = Some(unit);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    fn recompute(&mut self) {
        self.price_ttc = with_tax(self.unit_price, self.tax_rate);
    }

    fn client_name(&self) -> Option<&str> {
        None
    }

    fn label(&self) -> String {
        format!("{} ({})", self.id, self.name)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.name.as_str(), self.sku.as_str()];
        fields.extend(self.category.as_deref());
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        vec![
            Product::from_draft(
                EntityId::format("PRD", 2),
                ProductDraft {
                    name: "Souris sans fil".to_string(),
                    sku: "SOU-WL-01".to_string(),
                    description: None,
                    category: Some("Accessoires".to_string()),
                    unit_price: 25.0,
                    tax_rate: DEFAULT_TAX_RATE,
                    unit: Some("pièce".to_string()),
                    status: ProductStatus::Active,
                },
                now,
            ),
            Product::from_draft(
                EntityId::format("PRD", 1),
                ProductDraft {
                    name: "Ordinateur portable".to_string(),
                    sku: "ORD-PRO-15".to_string(),
                    description: Some("15 pouces, 16 Go".to_string()),
                    category: Some("Informatique".to_string()),
                    unit_price: 899.0,
                    tax_rate: DEFAULT_TAX_RATE,
                    unit: Some("pièce".to_string()),
                    status: ProductStatus::Active,
                },
                now,
            ),
        ]
    }
}
