use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a build order.
///
/// The integer codes are a wire contract shared with external consumers and
/// must stay bit-exact. `Allocated` exists in the vocabulary but no
/// transition in this engine produces it; it is kept for forward
/// compatibility with consumers that already know the code.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum BuildStatus {
    #[sea_orm(num_value = 10)]
    Pending,
    #[sea_orm(num_value = 20)]
    Allocated,
    #[sea_orm(num_value = 30)]
    Cancelled,
    #[sea_orm(num_value = 40)]
    Complete,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "PENDING",
            BuildStatus::Allocated => "ALLOCATED",
            BuildStatus::Cancelled => "CANCELLED",
            BuildStatus::Complete => "COMPLETE",
        }
    }
}

/// A build order: a request to produce `quantity` units of `part_id` from
/// the sub-parts listed in its BOM.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "build_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub part_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub status: BuildStatus,
    pub batch: Option<String>,
    pub link: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
}

impl Model {
    /// A build is active while it is still waiting to be cancelled or
    /// completed. Recomputed on demand, never stored.
    pub fn is_active(&self) -> bool {
        self.status == BuildStatus::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.status == BuildStatus::Complete
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id"
    )]
    Part,
    #[sea_orm(has_many = "super::build_item::Entity")]
    BuildItems,
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
    }
}

impl Related<super::build_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BuildItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if let ActiveValue::NotSet = self.id {
                self.id = ActiveValue::Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = self.status {
                self.status = ActiveValue::Set(BuildStatus::Pending);
            }
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(Utc::now());
            }
        }

        Ok(self)
    }
}
