mod common;

use assert_matches::assert_matches;
use assembly_api::{
    entities::build_order::BuildStatus,
    errors::ServiceError,
    events::Event,
    services::{builds::NewBuildOrder, stock},
};
use sea_orm::ActiveEnum;

fn new_build(part_id: uuid::Uuid, title: &str, quantity: i32) -> NewBuildOrder {
    NewBuildOrder {
        part_id,
        title: title.to_string(),
        quantity,
        batch: None,
        link: None,
        notes: None,
    }
}

#[tokio::test]
async fn status_codes_match_the_wire_contract() {
    assert_eq!(BuildStatus::Pending.to_value(), 10);
    assert_eq!(BuildStatus::Allocated.to_value(), 20);
    assert_eq!(BuildStatus::Cancelled.to_value(), 30);
    assert_eq!(BuildStatus::Complete.to_value(), 40);
}

#[tokio::test]
async fn create_build_validates_title_and_quantity() {
    let ctx = common::setup().await;
    let widget = common::create_part(&ctx.db, "Widget").await;

    let err = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 0))
        .await
        .unwrap_err();
    let issues = assert_matches!(err, ServiceError::ValidationError(issues) => issues);
    assert!(issues.field("quantity").is_some());

    let err = ctx
        .builds
        .create_build(new_build(widget.id, "", 1))
        .await
        .unwrap_err();
    let issues = assert_matches!(err, ServiceError::ValidationError(issues) => issues);
    assert!(issues.field("title").is_some());

    let long_title = "x".repeat(101);
    let err = ctx
        .builds
        .create_build(new_build(widget.id, &long_title, 1))
        .await
        .unwrap_err();
    let issues = assert_matches!(err, ServiceError::ValidationError(issues) => issues);
    assert!(issues.field("title").is_some());

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 1))
        .await
        .unwrap();
    assert_eq!(build.status, BuildStatus::Pending);
    assert!(build.is_active());
    assert!(build.completion_date.is_none());
    assert!(build.completed_by.is_none());
}

#[tokio::test]
async fn title_length_is_measured_in_characters() {
    let ctx = common::setup().await;
    let widget = common::create_part(&ctx.db, "Widget").await;

    // 100 two-byte characters: over the limit counted in bytes, within it
    // counted in characters.
    let title = "é".repeat(100);
    let build = ctx
        .builds
        .create_build(new_build(widget.id, &title, 1))
        .await
        .unwrap();
    assert_eq!(build.title.chars().count(), 100);

    let err = ctx
        .builds
        .create_build(new_build(widget.id, &"é".repeat(101), 1))
        .await
        .unwrap_err();
    let issues = assert_matches!(err, ServiceError::ValidationError(issues) => issues);
    assert!(issues.field("title").is_some());
}

#[tokio::test]
async fn cancel_removes_allocations_without_touching_stock() {
    let mut ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 2).await.unwrap();
    let item = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 2))
        .await
        .unwrap();
    ctx.builds.allocate_stock(build.id, item.id, 4).await.unwrap();

    let user = common::test_user();
    let cancelled = ctx.builds.cancel_build(build.id, user).await.unwrap();

    assert_eq!(cancelled.status, BuildStatus::Cancelled);
    assert_eq!(cancelled.completed_by, Some(user));
    assert!(cancelled.completion_date.is_some());
    assert!(ctx.builds.allocations_for(build.id).await.unwrap().is_empty());

    // Cancellation never mutates stock.
    let item_after = ctx.stock.get_stock_item(item.id).await.unwrap();
    assert_eq!(item_after.quantity, 10);

    // A cancelled build is terminal.
    assert_matches!(
        ctx.builds.cancel_build(build.id, user).await.unwrap_err(),
        ServiceError::InvalidStatus(_)
    );
    assert_matches!(
        ctx.builds
            .complete_build(build.id, "Finished goods", user)
            .await
            .unwrap_err(),
        ServiceError::InvalidStatus(_)
    );

    // Drain events: the cancellation must have been announced.
    let mut saw_cancelled = false;
    while let Ok(event) = ctx.events.try_recv() {
        if matches!(event, Event::BuildCancelled(id) if id == build.id) {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);
}

#[tokio::test]
async fn unallocate_resets_the_ledger_only() {
    let ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 1).await.unwrap();
    let item = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 2))
        .await
        .unwrap();
    ctx.builds.allocate_stock(build.id, item.id, 2).await.unwrap();

    let removed = ctx.builds.unallocate(build.id).await.unwrap();
    assert_eq!(removed, 1);
    assert!(ctx.builds.allocations_for(build.id).await.unwrap().is_empty());

    let build = ctx.builds.get_build(build.id).await.unwrap();
    assert_eq!(build.status, BuildStatus::Pending);
    assert!(build.completion_date.is_none());
    assert!(build.completed_by.is_none());

    // The ledger can be rebuilt afterwards.
    assert_eq!(ctx.builds.auto_allocate(build.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn complete_consumes_allocations_and_creates_output() {
    let mut ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    let part_b = common::create_part(&ctx.db, "Sub-part B").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 2).await.unwrap();
    ctx.bom.add_bom_line(widget.id, part_b.id, 3).await.unwrap();
    let item_a = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();
    let item_b = ctx
        .stock
        .create_stock_item(part_b.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();

    let mut request = new_build(widget.id, "Widget run", 2);
    request.batch = Some("BATCH-7".to_string());
    let build = ctx.builds.create_build(request).await.unwrap();

    // Requires 4 of A and 6 of B.
    let created = ctx.builds.auto_allocate(build.id).await.unwrap();
    assert_eq!(created.len(), 2);

    let user = common::test_user();
    let completion = ctx
        .builds
        .complete_build(build.id, "Finished goods", user)
        .await
        .unwrap();

    assert_eq!(completion.build.status, BuildStatus::Complete);
    assert!(completion.build.is_complete());
    assert_eq!(completion.build.completed_by, Some(user));
    assert!(completion.build.completion_date.is_some());

    // Source stock was consumed by exactly the allocated quantities.
    assert_eq!(ctx.stock.get_stock_item(item_a.id).await.unwrap().quantity, 6);
    assert_eq!(ctx.stock.get_stock_item(item_b.id).await.unwrap().quantity, 4);

    // The ledger is empty and exactly one output stock item exists.
    assert!(ctx.builds.allocations_for(build.id).await.unwrap().is_empty());
    let outputs = ctx.stock.stock_items_of(widget.id).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].id, completion.output.id);
    assert_eq!(outputs[0].quantity, 2);
    assert_eq!(outputs[0].location, "Finished goods");
    assert_eq!(outputs[0].batch.as_deref(), Some("BATCH-7"));
    assert!(outputs[0].notes.as_deref().unwrap_or("").starts_with("Built 2 on"));

    // Each consumption left an audit movement attributed to the user.
    let movements = ctx.stock.movements_of(item_a.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity_delta, -4);
    assert_eq!(movements[0].created_by, user);
    assert!(movements[0].reason.contains("Widget"));

    let mut saw_completed = false;
    while let Ok(event) = ctx.events.try_recv() {
        if matches!(
            event,
            Event::BuildCompleted { build_id, .. } if build_id == build.id
        ) {
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn complete_aborts_entirely_when_stock_is_short() {
    let ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 5).await.unwrap();
    let item = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 5, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 1))
        .await
        .unwrap();
    ctx.builds.allocate_stock(build.id, item.id, 5).await.unwrap();

    // Someone else takes stock between allocation and completion.
    let user = common::test_user();
    let item_now = ctx.stock.get_stock_item(item.id).await.unwrap();
    stock::consume(&*ctx.db, &item_now, 2, user, "Stocktake correction")
        .await
        .unwrap();

    let err = ctx
        .builds
        .complete_build(build.id, "Finished goods", user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { requested: 5, available: 3, .. });

    // Nothing happened: the build is still pending, the allocation remains,
    // stock is unchanged and no output was created.
    let build_after = ctx.builds.get_build(build.id).await.unwrap();
    assert_eq!(build_after.status, BuildStatus::Pending);
    assert!(build_after.completion_date.is_none());
    assert_eq!(ctx.builds.allocations_for(build.id).await.unwrap().len(), 1);
    assert_eq!(ctx.stock.get_stock_item(item.id).await.unwrap().quantity, 3);
    assert!(ctx.stock.stock_items_of(widget.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn complete_with_empty_bom_only_creates_output() {
    let ctx = common::setup().await;

    // A target part with no BOM lines: any allocation attempt is rejected,
    // so completion only ever consumes validly-held allocations.
    let widget = common::create_part(&ctx.db, "Widget").await;
    let unrelated = common::create_part(&ctx.db, "Unrelated").await;
    let stray = ctx
        .stock
        .create_stock_item(unrelated.id, "Main warehouse", 4, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 1))
        .await
        .unwrap();

    let err = ctx
        .builds
        .allocate_stock(build.id, stray.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let user = common::test_user();
    let completion = ctx
        .builds
        .complete_build(build.id, "Finished goods", user)
        .await
        .unwrap();

    assert_eq!(completion.output.quantity, 1);
    // An unset batch code lands on the output as an empty string.
    assert_eq!(completion.output.batch.as_deref(), Some(""));
    assert_eq!(ctx.stock.get_stock_item(stray.id).await.unwrap().quantity, 4);
}

#[tokio::test]
async fn deleting_a_build_removes_its_allocations() {
    let ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 1).await.unwrap();
    let item = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 1))
        .await
        .unwrap();
    ctx.builds.allocate_stock(build.id, item.id, 1).await.unwrap();

    ctx.builds.delete_build(build.id).await.unwrap();

    assert_matches!(
        ctx.builds.get_build(build.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
    assert!(ctx.builds.allocations_for(build.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_stock_item_removes_referencing_allocations() {
    let ctx = common::setup().await;

    let widget = common::create_part(&ctx.db, "Widget").await;
    let part_a = common::create_part(&ctx.db, "Sub-part A").await;
    ctx.bom.add_bom_line(widget.id, part_a.id, 1).await.unwrap();
    let item = ctx
        .stock
        .create_stock_item(part_a.id, "Main warehouse", 10, None, None)
        .await
        .unwrap();

    let build = ctx
        .builds
        .create_build(new_build(widget.id, "Widget run", 1))
        .await
        .unwrap();
    ctx.builds.allocate_stock(build.id, item.id, 1).await.unwrap();

    ctx.stock.delete_stock_item(item.id).await.unwrap();

    assert!(ctx.builds.allocations_for(build.id).await.unwrap().is_empty());
    assert_matches!(
        ctx.stock.get_stock_item(item.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
}

#[tokio::test]
async fn list_builds_paginates_newest_first() {
    let ctx = common::setup().await;
    let widget = common::create_part(&ctx.db, "Widget").await;

    for i in 1..=3 {
        ctx.builds
            .create_build(new_build(widget.id, &format!("Run {}", i), i))
            .await
            .unwrap();
    }

    let (page, total) = ctx.builds.list_builds(1, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);

    let (rest, _) = ctx.builds.list_builds(2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);
}
