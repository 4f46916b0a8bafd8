use crate::{
    entities::{
        bom_line::{self, Entity as BomLineEntity},
        part::Entity as PartEntity,
    },
    errors::{ServiceError, ValidationIssues},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Bill of Materials service for managing part assembly structures
#[derive(Clone)]
pub struct BomService {
    db: Arc<DatabaseConnection>,
}

impl BomService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Adds a BOM line: building one unit of `part_id` consumes
    /// `quantity_per_unit` units of `sub_part_id`
    #[instrument(skip(self))]
    pub async fn add_bom_line(
        &self,
        part_id: Uuid,
        sub_part_id: Uuid,
        quantity_per_unit: i32,
    ) -> Result<bom_line::Model, ServiceError> {
        let db = &*self.db;

        let mut issues = ValidationIssues::new();
        if quantity_per_unit < 1 {
            issues.add("quantity_per_unit", "quantity per unit must be at least 1");
        }
        if part_id == sub_part_id {
            issues.add("sub_part", "a part cannot appear in its own BOM");
        }
        issues.into_result()?;

        PartEntity::find_by_id(part_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))?;

        PartEntity::find_by_id(sub_part_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", sub_part_id)))?;

        let line = bom_line::ActiveModel {
            part_id: Set(part_id),
            sub_part_id: Set(sub_part_id),
            quantity_per_unit: Set(quantity_per_unit),
            ..Default::default()
        };
        let created = line
            .insert(db)
            .await
            .map_err(|e| ServiceError::insert_error(e, "BOM line"))?;

        info!(
            part_id = %part_id,
            sub_part_id = %sub_part_id,
            quantity_per_unit = quantity_per_unit,
            "BOM line added"
        );

        Ok(created)
    }

    /// Returns all BOM lines for a part
    #[instrument(skip(self))]
    pub async fn bom_lines_for(&self, part_id: Uuid) -> Result<Vec<bom_line::Model>, ServiceError> {
        BomLineEntity::find()
            .filter(bom_line::Column::PartId.eq(part_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
