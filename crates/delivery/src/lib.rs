//! Delivery notes ("bons de livraison").
//!
//! A delivery note lists the items shipped for an invoice and tracks how much
//! of each line has actually been delivered.

pub mod bon_livraison;

pub use bon_livraison::{
    BonLivraison, BonLivraisonDraft, BonLivraisonPatch, DeliveryItem, DeliveryProgress,
    DeliveryStatus,
};
