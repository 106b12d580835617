//! # Export Codec
//!
//! Turns a matched batch into the exportable artifact handed to the
//! transport collaborator. The two business entities use different column
//! sets and orderings; both are CSV with `;` separators.

use crate::error::{LeadflowError, Result};
use crate::models::{BusinessEntity, Lead};

/// External codec contract: entity-specific column schema.
pub trait ExportCodec: Send + Sync {
    fn build_export(&self, leads: &[Lead], product: &str, entity: BusinessEntity)
        -> Result<String>;

    /// Filename for the artifact, derived from product and entity.
    fn filename(&self, product: &str, entity: BusinessEntity) -> String {
        format!("leads_{entity}_{product}.csv")
    }
}

/// Default CSV codec carrying both known schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExportCodec;

fn csv_field(value: &str) -> String {
    if value.contains(';') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl ExportCodec for CsvExportCodec {
    fn build_export(
        &self,
        leads: &[Lead],
        product: &str,
        entity: BusinessEntity,
    ) -> Result<String> {
        if leads.is_empty() {
            return Err(LeadflowError::export("cannot export an empty batch"));
        }

        let mut out = String::new();
        match entity {
            BusinessEntity::EntityA => {
                out.push_str("nom;telephone;departement;produit;date_creation\n");
                for lead in leads {
                    let created = lead
                        .created_at
                        .map(|c| c.format("%Y-%m-%d").to_string())
                        .unwrap_or_default();
                    out.push_str(&format!(
                        "{};{};{};{};{}\n",
                        csv_field(&lead.name),
                        csv_field(&lead.phone),
                        csv_field(&lead.department),
                        csv_field(product),
                        created,
                    ));
                }
            }
            BusinessEntity::EntityB => {
                // Entity B's importer wants the phone first and an explicit
                // source column; no product column (one file per product).
                out.push_str("telephone;nom;departement;source;date_creation\n");
                for lead in leads {
                    let created = lead
                        .created_at
                        .map(|c| c.format("%d/%m/%Y").to_string())
                        .unwrap_or_default();
                    out.push_str(&format!(
                        "{};{};{};{};{}\n",
                        csv_field(&lead.phone),
                        csv_field(&lead.name),
                        csv_field(&lead.department),
                        format!("{:?}", lead.source).to_lowercase(),
                        created,
                    ));
                }
            }
        }
        Ok(out)
    }
}
