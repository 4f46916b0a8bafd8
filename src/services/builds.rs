use crate::{
    entities::{
        bom_line,
        build_item,
        build_order::{self, BuildStatus, Entity as BuildOrderEntity},
        part::Entity as PartEntity,
        stock_item::{self, Entity as StockItemEntity},
    },
    errors::{ServiceError, ValidationIssues},
    events::{Event, EventSender},
    services::stock,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionError, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Maximum build order title length, in characters
const MAX_TITLE_LEN: usize = 100;

/// Request payload for creating a build order
#[derive(Debug, Clone)]
pub struct NewBuildOrder {
    pub part_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub batch: Option<String>,
    pub link: Option<String>,
    pub notes: Option<String>,
}

/// A proposed allocation of stock against a build, not yet persisted
#[derive(Debug, Clone)]
pub struct AllocationProposal {
    pub stock_item: stock_item::Model,
    pub quantity: i32,
}

/// Per-BOM-line allocation summary for a build
#[derive(Debug, Clone, Serialize)]
pub struct RequiredPart {
    pub sub_part_id: Uuid,
    pub per_unit: i32,
    pub required: i32,
    pub allocated: i32,
}

/// Result of a completed build: the terminal build order and the stock item
/// produced by it
#[derive(Debug, Clone)]
pub struct BuildCompletion {
    pub build: build_order::Model,
    pub output: stock_item::Model,
}

/// Service for managing build orders: quantity accounting, allocation and
/// the lifecycle transactions
#[derive(Clone)]
pub struct BuildOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl BuildOrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new build order in PENDING status
    #[instrument(skip(self))]
    pub async fn create_build(
        &self,
        new: NewBuildOrder,
    ) -> Result<build_order::Model, ServiceError> {
        let db = &*self.db;

        let mut issues = ValidationIssues::new();
        if new.title.is_empty() {
            issues.add("title", "title must not be empty");
        } else if new.title.chars().count() > MAX_TITLE_LEN {
            issues.add(
                "title",
                format!("title must be at most {} characters", MAX_TITLE_LEN),
            );
        }
        if new.quantity < 1 {
            issues.add("quantity", "build quantity must be at least 1");
        }
        issues.into_result()?;

        PartEntity::find_by_id(new.part_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", new.part_id)))?;

        let build = build_order::ActiveModel {
            part_id: Set(new.part_id),
            title: Set(new.title),
            quantity: Set(new.quantity),
            status: Set(BuildStatus::Pending),
            batch: Set(new.batch),
            link: Set(new.link),
            notes: Set(new.notes),
            ..Default::default()
        };
        let created = build.insert(db).await.map_err(ServiceError::db_error)?;

        info!(
            build_id = %created.id,
            part_id = %created.part_id,
            quantity = created.quantity,
            "Build order created"
        );

        self.event_sender
            .send(Event::BuildCreated(created.id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(created)
    }

    /// Gets a build order by ID
    #[instrument(skip(self))]
    pub async fn get_build(&self, build_id: Uuid) -> Result<build_order::Model, ServiceError> {
        BuildOrderEntity::find_by_id(build_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Build {} not found", build_id)))
    }

    /// Lists build orders, newest first
    #[instrument(skip(self))]
    pub async fn list_builds(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<build_order::Model>, u64), ServiceError> {
        let db = &*self.db;

        let total = BuildOrderEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        let builds = BuildOrderEntity::find()
            .order_by_desc(build_order::Column::CreatedAt)
            .offset((page.saturating_sub(1)) * page_size)
            .limit(page_size)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((builds, total))
    }

    /// Lists the allocation records for a build
    #[instrument(skip(self))]
    pub async fn allocations_for(
        &self,
        build_id: Uuid,
    ) -> Result<Vec<build_item::Model>, ServiceError> {
        build_item::Entity::find()
            .filter(build_item::Column::BuildId.eq(build_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Quantity of `sub_part_id` required to make this build: BOM line
    /// quantity times build quantity, 0 when the part is not in the BOM
    #[instrument(skip(self, build))]
    pub async fn required_quantity(
        &self,
        build: &build_order::Model,
        sub_part_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let line = bom_line::Entity::find()
            .filter(bom_line::Column::PartId.eq(build.part_id))
            .filter(bom_line::Column::SubPartId.eq(sub_part_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(line
            .map(|l| l.quantity_per_unit.saturating_mul(build.quantity))
            .unwrap_or(0))
    }

    /// Quantity of `sub_part_id` currently allocated to this build
    #[instrument(skip(self, build))]
    pub async fn allocated_quantity(
        &self,
        build: &build_order::Model,
        sub_part_id: Uuid,
    ) -> Result<i32, ServiceError> {
        allocated_for_sub_part(&*self.db, build.id, sub_part_id).await
    }

    /// Quantity of `sub_part_id` still to be allocated; never negative
    #[instrument(skip(self, build))]
    pub async fn unallocated_quantity(
        &self,
        build: &build_order::Model,
        sub_part_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let required = self.required_quantity(build, sub_part_id).await?;
        let allocated = self.allocated_quantity(build, sub_part_id).await?;
        Ok((required - allocated).max(0))
    }

    /// The canonical per-BOM-line view of the build: what is needed, and how
    /// much of it is already allocated
    #[instrument(skip(self, build))]
    pub async fn required_parts(
        &self,
        build: &build_order::Model,
    ) -> Result<Vec<RequiredPart>, ServiceError> {
        let db = &*self.db;
        let mut parts = Vec::new();

        for line in bom_lines_of(db, build.part_id).await? {
            let allocated = allocated_for_sub_part(db, build.id, line.sub_part_id).await?;
            parts.push(RequiredPart {
                sub_part_id: line.sub_part_id,
                per_unit: line.quantity_per_unit,
                required: line.quantity_per_unit.saturating_mul(build.quantity),
                allocated,
            });
        }

        Ok(parts)
    }

    /// True when every BOM line's required quantity is covered by the
    /// sub-part's total stock.
    ///
    /// Total stock is compared, not unallocated stock: quantities earmarked
    /// by other builds still count. Callers wanting a stricter answer must
    /// reconcile against the ledger themselves.
    #[instrument(skip(self, build))]
    pub async fn can_build(&self, build: &build_order::Model) -> Result<bool, ServiceError> {
        for required in self.required_parts(build).await? {
            let total = stock::total_stock(&*self.db, required.sub_part_id).await?;
            if total < required.required {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Computes allocation proposals without persisting anything.
    ///
    /// A line gets a proposal only when exactly one stock item of the
    /// sub-part exists, nothing is allocated against it yet and it has stock;
    /// anything ambiguous is left to manual allocation.
    #[instrument(skip(self))]
    pub async fn auto_allocations(
        &self,
        build_id: Uuid,
    ) -> Result<Vec<AllocationProposal>, ServiceError> {
        let build = self.get_build(build_id).await?;
        proposals_for(&*self.db, &build).await
    }

    /// Applies the auto-allocation proposals as allocation records, in one
    /// transaction. Any record violating the ledger rules rejects the whole
    /// batch.
    #[instrument(skip(self))]
    pub async fn auto_allocate(
        &self,
        build_id: Uuid,
    ) -> Result<Vec<build_item::Model>, ServiceError> {
        let db = &*self.db;

        let created = db
            .transaction::<_, Vec<build_item::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let build = BuildOrderEntity::find_by_id(build_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Build {} not found", build_id))
                        })?;

                    // Proposals are recomputed under this transaction so the
                    // quantities they cap against cannot go stale between
                    // proposal and apply.
                    let proposals = proposals_for(txn, &build).await?;

                    let mut created = Vec::with_capacity(proposals.len());
                    for proposal in proposals {
                        let record = insert_allocation(
                            txn,
                            &build,
                            &proposal.stock_item,
                            proposal.quantity,
                        )
                        .await?;
                        created.push(record);
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            build_id = %build_id,
            records = created.len(),
            "Auto-allocation applied"
        );

        for record in &created {
            self.event_sender
                .send(Event::StockAllocated {
                    build_id,
                    stock_item_id: record.stock_item_id,
                    quantity: record.quantity,
                })
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(created)
    }

    /// Manually allocates a quantity of a stock item to a build
    #[instrument(skip(self))]
    pub async fn allocate_stock(
        &self,
        build_id: Uuid,
        stock_item_id: Uuid,
        quantity: i32,
    ) -> Result<build_item::Model, ServiceError> {
        let db = &*self.db;

        let record = db
            .transaction::<_, build_item::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let build = BuildOrderEntity::find_by_id(build_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Build {} not found", build_id))
                        })?;

                    let item = StockItemEntity::find_by_id(stock_item_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Stock item {} not found",
                                stock_item_id
                            ))
                        })?;

                    insert_allocation(txn, &build, &item, quantity).await
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            build_id = %build_id,
            stock_item_id = %stock_item_id,
            quantity = quantity,
            "Stock allocated to build"
        );

        self.event_sender
            .send(Event::StockAllocated {
                build_id,
                stock_item_id,
                quantity,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    /// Deletes every allocation record for the build. Status and completion
    /// fields are untouched; used to redo allocation from scratch.
    #[instrument(skip(self))]
    pub async fn unallocate(&self, build_id: Uuid) -> Result<u64, ServiceError> {
        let db = &*self.db;

        // Existence check so a bad id is reported rather than deleting zero
        // rows silently.
        self.get_build(build_id).await?;

        let result = build_item::Entity::delete_many()
            .filter(build_item::Column::BuildId.eq(build_id))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(
            build_id = %build_id,
            records_removed = result.rows_affected,
            "Build allocations removed"
        );

        self.event_sender
            .send(Event::BuildUnallocated {
                build_id,
                records_removed: result.rows_affected,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(result.rows_affected)
    }

    /// Cancels a PENDING build: deletes its allocation records without
    /// touching stock quantities, and marks the build CANCELLED.
    #[instrument(skip(self))]
    pub async fn cancel_build(
        &self,
        build_id: Uuid,
        user: Uuid,
    ) -> Result<build_order::Model, ServiceError> {
        let db = &*self.db;

        let cancelled = db
            .transaction::<_, build_order::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let build = BuildOrderEntity::find_by_id(build_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Build {} not found", build_id))
                        })?;

                    if !build.is_active() {
                        return Err(ServiceError::InvalidStatus(format!(
                            "Build {} cannot be cancelled from status {}",
                            build_id,
                            build.status.as_str()
                        )));
                    }

                    build_item::Entity::delete_many()
                        .filter(build_item::Column::BuildId.eq(build_id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    // The 'completion' date of a cancelled build is the date
                    // it was cancelled.
                    let mut active: build_order::ActiveModel = build.into();
                    active.completion_date = Set(Some(Utc::now()));
                    active.completed_by = Set(Some(user));
                    active.status = Set(BuildStatus::Cancelled);

                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(build_id = %build_id, "Build cancelled");

        self.event_sender
            .send(Event::BuildCancelled(build_id))
            .await
            .map_err(ServiceError::EventError)?;

        Ok(cancelled)
    }

    /// Completes a PENDING build: consumes every allocated stock item,
    /// removes the allocation records, creates the output stock item at
    /// `location` and marks the build COMPLETE. All-or-nothing; a failed
    /// consumption aborts the whole transaction with the build untouched.
    #[instrument(skip(self))]
    pub async fn complete_build(
        &self,
        build_id: Uuid,
        location: &str,
        user: Uuid,
    ) -> Result<BuildCompletion, ServiceError> {
        let db = &*self.db;
        let location = location.to_string();

        let completion = db
            .transaction::<_, BuildCompletion, ServiceError>(move |txn| {
                Box::pin(async move {
                    let build = BuildOrderEntity::find_by_id(build_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Build {} not found", build_id))
                        })?;

                    if !build.is_active() {
                        return Err(ServiceError::InvalidStatus(format!(
                            "Build {} cannot be completed from status {}",
                            build_id,
                            build.status.as_str()
                        )));
                    }

                    let part = PartEntity::find_by_id(build.part_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Part {} not found", build.part_id))
                        })?;

                    let allocations = build_item::Entity::find()
                        .filter(build_item::Column::BuildId.eq(build_id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    for allocation in allocations {
                        // Re-read the stock item under this transaction;
                        // sufficiency is re-verified at consumption time, not
                        // trusted from the earlier allocation check.
                        let item = StockItemEntity::find_by_id(allocation.stock_item_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Stock item {} not found",
                                    allocation.stock_item_id
                                ))
                            })?;

                        let reason = format!(
                            "Removed {} items to build {} x {}",
                            allocation.quantity, build.quantity, part.name
                        );
                        stock::consume(txn, &item, allocation.quantity, user, &reason).await?;

                        allocation.delete(txn).await.map_err(ServiceError::db_error)?;
                    }

                    let now = Utc::now();

                    let output = stock_item::ActiveModel {
                        part_id: Set(build.part_id),
                        location: Set(location),
                        quantity: Set(build.quantity),
                        batch: Set(Some(build.batch.clone().unwrap_or_default())),
                        notes: Set(Some(format!(
                            "Built {} on {}",
                            build.quantity,
                            now.date_naive()
                        ))),
                        ..Default::default()
                    };
                    let output = output.insert(txn).await.map_err(ServiceError::db_error)?;

                    let mut active: build_order::ActiveModel = build.into();
                    active.completion_date = Set(Some(now));
                    active.completed_by = Set(Some(user));
                    active.status = Set(BuildStatus::Complete);
                    let completed = active.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok(BuildCompletion {
                        build: completed,
                        output,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            build_id = %build_id,
            output_stock_item_id = %completion.output.id,
            "Build completed"
        );

        self.event_sender
            .send(Event::BuildCompleted {
                build_id,
                output_stock_item_id: completion.output.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(completion)
    }

    /// Deletes a build order and, first, every allocation record it owns
    #[instrument(skip(self))]
    pub async fn delete_build(&self, build_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;

        db.transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                let build = BuildOrderEntity::find_by_id(build_id)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Build {} not found", build_id))
                    })?;

                build_item::Entity::delete_many()
                    .filter(build_item::Column::BuildId.eq(build_id))
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                build.delete(txn).await.map_err(ServiceError::db_error)?;

                Ok(())
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })?;

        info!(build_id = %build_id, "Build deleted");

        Ok(())
    }
}

async fn bom_lines_of<C>(conn: &C, part_id: Uuid) -> Result<Vec<bom_line::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    bom_line::Entity::find()
        .filter(bom_line::Column::PartId.eq(part_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn allocated_for_sub_part<C>(
    conn: &C,
    build_id: Uuid,
    sub_part_id: Uuid,
) -> Result<i32, ServiceError>
where
    C: ConnectionTrait,
{
    let rows = build_item::Entity::find()
        .filter(build_item::Column::BuildId.eq(build_id))
        .find_also_related(StockItemEntity)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(rows
        .into_iter()
        .filter_map(|(record, item)| {
            item.filter(|i| i.part_id == sub_part_id)
                .map(|_| record.quantity)
        })
        .sum())
}

async fn existing_allocation<C>(
    conn: &C,
    build_id: Uuid,
    stock_item_id: Uuid,
) -> Result<Option<build_item::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    build_item::Entity::find()
        .filter(build_item::Column::BuildId.eq(build_id))
        .filter(build_item::Column::StockItemId.eq(stock_item_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Computes allocation proposals for a build against the stock visible to
/// `conn`. Read-only.
async fn proposals_for<C>(
    conn: &C,
    build: &build_order::Model,
) -> Result<Vec<AllocationProposal>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut proposals = Vec::new();

    for line in bom_lines_of(conn, build.part_id).await? {
        let required = line.quantity_per_unit.saturating_mul(build.quantity);

        let mut candidates = StockItemEntity::find()
            .filter(stock_item::Column::PartId.eq(line.sub_part_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        // Only an unambiguous single candidate is ever proposed; zero or
        // several stock sources are left to manual allocation.
        if candidates.len() != 1 {
            continue;
        }
        let Some(item) = candidates.pop() else {
            continue;
        };

        if existing_allocation(conn, build.id, item.id).await?.is_some() {
            continue;
        }

        if item.quantity == 0 {
            continue;
        }

        let quantity = required.min(item.quantity);
        proposals.push(AllocationProposal {
            stock_item: item,
            quantity,
        });
    }

    Ok(proposals)
}

/// Validates a prospective allocation record against the ledger rules.
///
/// Both rules are evaluated before reporting, so a caller sees every
/// violation at once:
/// - the stock item's part must be a sub-part in the build's BOM
/// - the allocated quantity must be at least 1 and must not exceed the stock
///   item's current quantity
async fn validate_allocation<C>(
    conn: &C,
    build: &build_order::Model,
    item: &stock_item::Model,
    quantity: i32,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let mut issues = ValidationIssues::new();

    let in_bom = bom_line::Entity::find()
        .filter(bom_line::Column::PartId.eq(build.part_id))
        .filter(bom_line::Column::SubPartId.eq(item.part_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .is_some();
    if !in_bom {
        issues.add(
            "stock_item",
            format!(
                "Stock item part {} not found in BOM for part {}",
                item.part_id, build.part_id
            ),
        );
    }

    if quantity < 1 {
        issues.add("quantity", "Allocated quantity must be at least 1");
    } else if quantity > item.quantity {
        issues.add(
            "quantity",
            format!(
                "Allocated quantity ({}) must not exceed available quantity ({})",
                quantity, item.quantity
            ),
        );
    }

    issues.into_result()
}

/// Validates and persists one allocation record. The duplicate check runs
/// under the same transaction as the insert, backed by the unique index on
/// (build, stock item).
async fn insert_allocation<C>(
    conn: &C,
    build: &build_order::Model,
    item: &stock_item::Model,
    quantity: i32,
) -> Result<build_item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if existing_allocation(conn, build.id, item.id).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "Stock item {} is already allocated to build {}",
            item.id, build.id
        )));
    }

    validate_allocation(conn, build, item, quantity).await?;

    let record = build_item::ActiveModel {
        build_id: Set(build.id),
        stock_item_id: Set(item.id),
        quantity: Set(quantity),
        ..Default::default()
    };

    record
        .insert(conn)
        .await
        .map_err(|e| ServiceError::insert_error(e, "allocation record"))
}
