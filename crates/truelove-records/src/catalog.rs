//! Group, section and field lifecycle.
//!
//! Creating a group or a section also binds a QR label to it; deleting
//! one frees the label. Creating a number or money field in `operar`
//! mode also creates the sibling result field that tracks it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use truelove_core::error::{TrueLoveError, TrueLoveResult};
use truelove_core::models::field::{
    CreateField, Field, FieldMode, FieldOptions, FieldType, Operation, PendingOperation,
};
use truelove_core::models::group::{CreateGroup, Group};
use truelove_core::models::qr_code::{EntityType, QrCode};
use truelove_core::models::section::{CreateSection, Section};
use truelove_core::repository::{
    FieldRepository, GroupRepository, QrCodeRepository, SectionRepository,
};
use uuid::Uuid;

use crate::config::RecordsConfig;
use crate::error::RecordsError;
use crate::export::{self, Workbook};
use crate::qr::QrManager;
use crate::recompute::ResultRecomputer;

/// A record together with the label bound to it.
#[derive(Debug, Clone, Serialize)]
pub struct Labeled<T> {
    pub record: T,
    pub qr_code: QrCode,
}

/// Request to combine a new field with an existing sibling.
#[derive(Debug, Clone, Copy)]
pub struct Operate {
    pub op: Operation,
    pub target_field_id: Uuid,
}

/// A saved field and the result field created alongside it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct FieldCreation {
    pub field: Field,
    pub result: Option<Field>,
}

pub struct Catalog<G, S, F, Q>
where
    G: GroupRepository,
    S: SectionRepository,
    F: FieldRepository + Clone,
    Q: QrCodeRepository,
{
    groups: G,
    sections: S,
    fields: F,
    qr: QrManager<Q>,
    recomputer: ResultRecomputer<F>,
}

impl<G, S, F, Q> Catalog<G, S, F, Q>
where
    G: GroupRepository,
    S: SectionRepository,
    F: FieldRepository + Clone,
    Q: QrCodeRepository,
{
    pub fn new(groups: G, sections: S, fields: F, qr_codes: Q, config: RecordsConfig) -> Self {
        Self {
            groups,
            sections,
            recomputer: ResultRecomputer::new(fields.clone()),
            fields,
            qr: QrManager::new(qr_codes, config),
        }
    }

    pub fn qr(&self) -> &QrManager<Q> {
        &self.qr
    }

    pub fn recomputer(&self) -> &ResultRecomputer<F> {
        &self.recomputer
    }

    pub async fn create_group(&self, input: CreateGroup) -> TrueLoveResult<Labeled<Group>> {
        if let Some(parent_id) = input.parent_id {
            self.groups.get_by_id(parent_id).await?;
        }

        let group = self.groups.create(input).await?;
        let qr_code = self.qr.assign(EntityType::Group, group.id).await?;

        info!(group_id = %group.id, code = %qr_code.code, "Group created");

        Ok(Labeled {
            record: group,
            qr_code,
        })
    }

    /// Delete a group with its sections and fields, freeing every
    /// label involved. Sub-groups are left in place.
    pub async fn delete_group(&self, group_id: Uuid) -> TrueLoveResult<()> {
        self.groups.get_by_id(group_id).await?;

        for section in self.sections.list_by_group(group_id).await? {
            self.delete_section(section.id).await?;
        }

        self.groups.delete(group_id).await?;
        self.qr.release(group_id).await?;

        info!(%group_id, "Group deleted");

        Ok(())
    }

    pub async fn create_section(&self, input: CreateSection) -> TrueLoveResult<Labeled<Section>> {
        self.groups.get_by_id(input.group_id).await?;

        let section = self.sections.create(input).await?;
        let qr_code = self.qr.assign(EntityType::Section, section.id).await?;

        info!(section_id = %section.id, code = %qr_code.code, "Section created");

        Ok(Labeled {
            record: section,
            qr_code,
        })
    }

    pub async fn delete_section(&self, section_id: Uuid) -> TrueLoveResult<()> {
        self.sections.get_by_id(section_id).await?;

        self.fields.delete_by_section(section_id).await?;
        self.sections.delete(section_id).await?;
        self.qr.release(section_id).await?;

        info!(%section_id, "Section deleted");

        Ok(())
    }

    /// Save a field. With `operate`, the field is saved in `operar`
    /// mode and a result field combining it with the target is created
    /// when the target exists in the same section.
    pub async fn create_field(
        &self,
        mut input: CreateField,
        operate: Option<Operate>,
    ) -> TrueLoveResult<FieldCreation> {
        self.sections.get_by_id(input.section_id).await?;

        let Some(operate) = operate else {
            let field = self.fields.create(input).await?;
            debug!(field_id = %field.id, "Field created");
            return Ok(FieldCreation {
                field,
                result: None,
            });
        };

        if !matches!(input.field_type, FieldType::Number | FieldType::Money) {
            return Err(RecordsError::NotOperable {
                field_type: input.field_type.as_str().to_string(),
            }
            .into());
        }

        input.options.modo = Some(FieldMode::Operar);
        input.options.operation = Some(PendingOperation {
            op: operate.op,
            target_field_id: operate.target_field_id.to_string(),
        });
        let field = self.fields.create(input).await?;

        let target = match self.fields.get_by_id(operate.target_field_id).await {
            Ok(target) if target.section_id == field.section_id => target,
            Ok(_) | Err(TrueLoveError::NotFound { .. }) => {
                debug!(
                    target_field_id = %operate.target_field_id,
                    "Operation target not in section, no result field"
                );
                return Ok(FieldCreation {
                    field,
                    result: None,
                });
            }
            Err(e) => return Err(e),
        };

        let result = self
            .fields
            .create(result_field_for(&field, &target, operate.op))
            .await?;

        info!(
            field_id = %field.id,
            result_id = %result.id,
            op = ?operate.op,
            "Result field created"
        );

        Ok(FieldCreation {
            field,
            result: Some(result),
        })
    }

    /// Delete a field. Result fields are detached from their bases.
    pub async fn delete_field(&self, field_id: Uuid) -> TrueLoveResult<()> {
        let field = self.fields.get_by_id(field_id).await?;

        if field.options.is_result() {
            self.recomputer.detach_result(&field).await
        } else {
            self.fields.delete(field_id).await
        }
    }

    pub async fn section_fields(&self, section_id: Uuid) -> TrueLoveResult<Vec<Field>> {
        self.fields.list_by_section(section_id).await
    }

    pub async fn export_group(&self, group_id: Uuid, now: DateTime<Utc>) -> TrueLoveResult<Workbook> {
        export::export_group(&self.groups, &self.sections, &self.fields, group_id, now).await
    }
}

fn result_field_for(field: &Field, target: &Field, op: Operation) -> CreateField {
    let money = field.field_type.is_money() || target.field_type.is_money();

    CreateField {
        section_id: field.section_id,
        title: format!("{} {} {}", field.title, op.symbol(), target.title),
        field_type: if money {
            FieldType::Money
        } else {
            FieldType::Number
        },
        options: FieldOptions {
            modo: Some(FieldMode::Resultado),
            base_fields: Some(vec![field.id.to_string(), target.id.to_string()]),
            op: Some(op),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(title: &str, field_type: FieldType) -> Field {
        Field {
            id: Uuid::new_v4(),
            section_id: Uuid::nil(),
            title: title.into(),
            field_type,
            options: FieldOptions::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn result_title_uses_operation_symbol() {
        let a = field("Leche", FieldType::Number);
        let b = field("Vacas", FieldType::Number);
        let result = result_field_for(&a, &b, Operation::Dividir);

        assert_eq!(result.title, "Leche ÷ Vacas");
        assert_eq!(result.field_type, FieldType::Number);
        assert_eq!(
            result.options.base_fields,
            Some(vec![a.id.to_string(), b.id.to_string()])
        );
        assert_eq!(result.options.modo, Some(FieldMode::Resultado));
    }

    #[test]
    fn result_is_money_if_either_side_is() {
        let a = field("Litros", FieldType::Number);
        let b = field("Precio", FieldType::Money);
        let result = result_field_for(&a, &b, Operation::Multiplicar);

        assert_eq!(result.title, "Litros × Precio");
        assert_eq!(result.field_type, FieldType::Money);
    }
}
