use crate::{
    entities::{
        build_item,
        part::Entity as PartEntity,
        stock_item::{self, Entity as StockItemEntity},
        stock_movement,
    },
    errors::{ServiceError, ValidationIssues},
    events::{Event, EventSender},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Total stock of a part across all stock items, regardless of what other
/// builds have already earmarked.
pub async fn total_stock<C>(conn: &C, part_id: Uuid) -> Result<i32, ServiceError>
where
    C: ConnectionTrait,
{
    let items = StockItemEntity::find()
        .filter(stock_item::Column::PartId.eq(part_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(items.iter().map(|item| item.quantity).sum())
}

/// Consumes `quantity` units from a stock item, writing a movement record
/// attributed to `user`.
///
/// Sufficiency is checked here, against the row as visible to `conn` — a
/// completing transaction passes its own transaction handle so the check
/// cannot trust stale data from an earlier validation.
pub async fn consume<C>(
    conn: &C,
    item: &stock_item::Model,
    quantity: i32,
    user: Uuid,
    reason: &str,
) -> Result<stock_item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if quantity > item.quantity {
        return Err(ServiceError::InsufficientStock {
            stock_item_id: item.id,
            requested: quantity,
            available: item.quantity,
        });
    }

    let mut active: stock_item::ActiveModel = item.clone().into();
    active.quantity = Set(item.quantity - quantity);
    let updated = active.update(conn).await.map_err(ServiceError::db_error)?;

    let movement = stock_movement::ActiveModel {
        stock_item_id: Set(item.id),
        quantity_delta: Set(-quantity),
        reason: Set(reason.to_string()),
        created_by: Set(user),
        ..Default::default()
    };
    movement.insert(conn).await.map_err(ServiceError::db_error)?;

    Ok(updated)
}

/// Service for managing stock items
#[derive(Clone)]
pub struct StockService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl StockService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new stock item for a part
    #[instrument(skip(self))]
    pub async fn create_stock_item(
        &self,
        part_id: Uuid,
        location: &str,
        quantity: i32,
        batch: Option<String>,
        notes: Option<String>,
    ) -> Result<stock_item::Model, ServiceError> {
        let db = &*self.db;

        let mut issues = ValidationIssues::new();
        if quantity < 0 {
            issues.add("quantity", "stock quantity must not be negative");
        }
        if location.is_empty() {
            issues.add("location", "location must not be empty");
        }
        issues.into_result()?;

        PartEntity::find_by_id(part_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))?;

        let item = stock_item::ActiveModel {
            part_id: Set(part_id),
            location: Set(location.to_string()),
            quantity: Set(quantity),
            batch: Set(batch),
            notes: Set(notes),
            ..Default::default()
        };
        let created = item.insert(db).await.map_err(ServiceError::db_error)?;

        info!(
            stock_item_id = %created.id,
            part_id = %part_id,
            quantity = quantity,
            "Stock item created"
        );

        self.event_sender
            .send(Event::StockItemCreated(created.id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(created)
    }

    /// Gets a stock item by ID
    #[instrument(skip(self))]
    pub async fn get_stock_item(
        &self,
        stock_item_id: Uuid,
    ) -> Result<stock_item::Model, ServiceError> {
        StockItemEntity::find_by_id(stock_item_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock item {} not found", stock_item_id)))
    }

    /// Lists all stock items for a part
    #[instrument(skip(self))]
    pub async fn stock_items_of(
        &self,
        part_id: Uuid,
    ) -> Result<Vec<stock_item::Model>, ServiceError> {
        StockItemEntity::find()
            .filter(stock_item::Column::PartId.eq(part_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Total stock quantity for a part across all its stock items
    #[instrument(skip(self))]
    pub async fn total_stock(&self, part_id: Uuid) -> Result<i32, ServiceError> {
        total_stock(&*self.db, part_id).await
    }

    /// Lists the movement history for a stock item, newest first
    #[instrument(skip(self))]
    pub async fn movements_of(
        &self,
        stock_item_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        use sea_orm::QueryOrder;

        stock_movement::Entity::find()
            .filter(stock_movement::Column::StockItemId.eq(stock_item_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Deletes a stock item.
    ///
    /// Allocation records referencing the item are removed first, in the same
    /// transaction; the ledger must never point at a stock item that no
    /// longer exists.
    #[instrument(skip(self))]
    pub async fn delete_stock_item(&self, stock_item_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;

        db.transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                let item = StockItemEntity::find_by_id(stock_item_id)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Stock item {} not found", stock_item_id))
                    })?;

                build_item::Entity::delete_many()
                    .filter(build_item::Column::StockItemId.eq(stock_item_id))
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                stock_movement::Entity::delete_many()
                    .filter(stock_movement::Column::StockItemId.eq(stock_item_id))
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                item.delete(txn).await.map_err(ServiceError::db_error)?;

                Ok(())
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })?;

        info!(stock_item_id = %stock_item_id, "Stock item deleted");

        self.event_sender
            .send(Event::StockItemDeleted(stock_item_id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(())
    }
}
