use isocalc_core::db::open_db_in_memory;
use isocalc_core::{
    AddItemOutcome, Caller, EntityKind, IsotopeDraft, IsotopeId, IsotopeRepository,
    ItemMassUpdate, Operation, OrderService, OrderServiceError, OrderStatus,
    SqliteIsotopeRepository, SqliteOrderRepository, DEFAULT_INITIAL_MASS_GRAMS,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn seed_isotope(conn: &Connection, name: &str, half_life_years: f64) -> IsotopeId {
    let repo = SqliteIsotopeRepository::try_new(conn).unwrap();
    repo.create_isotope(&IsotopeDraft::new(name, half_life_years, 1.0))
        .unwrap()
        .id
}

fn service(conn: &mut Connection) -> OrderService<SqliteOrderRepository<'_>> {
    OrderService::new(SqliteOrderRepository::try_new(conn).unwrap())
}

fn draft_count(conn: &Connection, client: &Caller) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM calculation_orders WHERE client_id = ?1 AND status = 'draft';",
        [client.user_id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn first_add_creates_draft_with_default_mass() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    assert!(service.draft_summary(&client).unwrap().is_none());

    let outcome = service.add_isotope(&client, carbon).unwrap();
    let AddItemOutcome::Added(item) = outcome else {
        panic!("expected a new item");
    };
    assert_eq!(item.isotope_id, carbon);
    assert_eq!(item.initial_mass_grams, DEFAULT_INITIAL_MASS_GRAMS);
    assert_eq!(item.remaining_activity, None);

    let summary = service.draft_summary(&client).unwrap().unwrap();
    assert_eq!(summary.order_id, item.order_id);
    assert_eq!(summary.item_count, 1);

    let detail = service.get_order(&client, item.order_id).unwrap();
    assert_eq!(detail.order.status, OrderStatus::Draft);
    assert_eq!(detail.order.client_id, client.user_id);
    assert_eq!(detail.order.time_elapsed_years, 0.0);
    assert_eq!(detail.order.total_activity, None);
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].isotope_name, "Carbon-14");
}

#[test]
fn adding_same_isotope_twice_keeps_one_item() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let client = Caller::client(Uuid::new_v4());

    {
        let mut service = service(&mut conn);
        let first = service.add_isotope(&client, carbon).unwrap();
        let second = service.add_isotope(&client, carbon).unwrap();

        assert!(first.was_added());
        assert!(matches!(second, AddItemOutcome::AlreadyPresent(_)));
        assert_eq!(first.item().id, second.item().id);
    }

    let items: i64 = conn
        .query_row("SELECT COUNT(*) FROM calculation_items;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(items, 1);
    assert_eq!(draft_count(&conn, &client), 1);
}

#[test]
fn get_or_create_draft_returns_the_same_draft() {
    let mut conn = setup();
    let client = Caller::client(Uuid::new_v4());
    let other = Caller::client(Uuid::new_v4());

    {
        let mut service = service(&mut conn);
        let first = service.get_or_create_draft(&client).unwrap();
        let second = service.get_or_create_draft(&client).unwrap();
        let foreign = service.get_or_create_draft(&other).unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, foreign.id);
        assert_eq!(first.status, OrderStatus::Draft);
    }

    assert_eq!(draft_count(&conn, &client), 1);
    assert_eq!(draft_count(&conn, &other), 1);
}

#[test]
fn adding_unknown_or_inactive_isotope_creates_nothing() {
    let mut conn = setup();
    let iodine = seed_isotope(&conn, "Iodine-131", 0.022);
    SqliteIsotopeRepository::try_new(&conn)
        .unwrap()
        .set_isotope_active(iodine, false)
        .unwrap();
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.add_isotope(&client, missing),
        Err(OrderServiceError::NotFound { kind: EntityKind::Isotope, id }) if id == missing
    ));
    assert!(matches!(
        service.add_isotope(&client, iodine),
        Err(OrderServiceError::NotFound { kind: EntityKind::Isotope, .. })
    ));
    assert!(service.draft_summary(&client).unwrap().is_none());
}

#[test]
fn removing_last_item_keeps_the_order() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let item = service.add_isotope(&client, carbon).unwrap().item().clone();
    service.remove_item(&client, item.id).unwrap();

    let detail = service.get_order(&client, item.order_id).unwrap();
    assert!(detail.items.is_empty());
    assert_eq!(detail.order.status, OrderStatus::Draft);
    assert_eq!(service.draft_summary(&client).unwrap().unwrap().item_count, 0);

    assert!(matches!(
        service.remove_item(&client, item.id),
        Err(OrderServiceError::NotFound { kind: EntityKind::Item, .. })
    ));
}

#[test]
fn other_clients_cannot_see_or_remove_items() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let owner = Caller::client(Uuid::new_v4());
    let stranger = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let item = service.add_isotope(&owner, carbon).unwrap().item().clone();

    assert!(matches!(
        service.remove_item(&stranger, item.id),
        Err(OrderServiceError::NotFound { kind: EntityKind::Item, .. })
    ));
    assert!(matches!(
        service.get_order(&stranger, item.order_id),
        Err(OrderServiceError::NotFound { kind: EntityKind::Order, .. })
    ));
    assert_eq!(service.get_order(&owner, item.order_id).unwrap().items.len(), 1);
}

#[test]
fn soft_delete_by_non_owner_affects_zero_rows() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let owner = Caller::client(Uuid::new_v4());
    let stranger = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let order_id = service.add_isotope(&owner, carbon).unwrap().item().order_id;

    assert_eq!(service.soft_delete_order(&stranger, order_id).unwrap(), 0);
    assert_eq!(
        service.get_order(&owner, order_id).unwrap().order.status,
        OrderStatus::Draft
    );

    assert_eq!(service.soft_delete_order(&owner, order_id).unwrap(), 1);
    assert!(matches!(
        service.get_order(&owner, order_id),
        Err(OrderServiceError::NotFound { .. })
    ));
    assert!(service.list_orders(&owner).unwrap().is_empty());
    assert!(service.draft_summary(&owner).unwrap().is_none());

    assert_eq!(service.soft_delete_order(&owner, order_id).unwrap(), 0);
}

#[test]
fn soft_deleted_order_keeps_its_row_and_items() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let owner = Caller::client(Uuid::new_v4());

    let order_id = {
        let mut service = service(&mut conn);
        let order_id = service.add_isotope(&owner, carbon).unwrap().item().order_id;
        service.soft_delete_order(&owner, order_id).unwrap();

        let next = service.add_isotope(&owner, carbon).unwrap();
        assert!(next.was_added());
        assert_ne!(next.item().order_id, order_id);
        order_id
    };

    let (status, items): (String, i64) = conn
        .query_row(
            "SELECT o.status, (SELECT COUNT(*) FROM calculation_items WHERE order_uuid = o.uuid)
             FROM calculation_orders o
             WHERE o.uuid = ?1;",
            [order_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, "deleted");
    assert_eq!(items, 1);
}

#[test]
fn completing_requires_moderator_and_formed_order() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let client = Caller::client(Uuid::new_v4());
    let moderator = Caller::moderator(Uuid::new_v4());
    let mut service = service(&mut conn);

    let order_id = service.add_isotope(&client, carbon).unwrap().item().order_id;

    assert!(matches!(
        service.complete_order(&client, order_id),
        Err(OrderServiceError::Forbidden(Operation::ModerateOrder))
    ));
    assert!(matches!(
        service.complete_order(&moderator, order_id),
        Err(OrderServiceError::InvalidTransition {
            from: OrderStatus::Draft,
            to: OrderStatus::Completed,
            ..
        })
    ));

    let formed = service.form_order(&client, order_id).unwrap();
    assert_eq!(formed.status, OrderStatus::Formed);
    assert!(formed.formed_at.is_some());

    let completed = service.complete_order(&moderator, order_id).unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert_eq!(completed.moderator_id, Some(moderator.user_id));
    assert!(completed.completed_at.is_some());

    assert!(matches!(
        service.complete_order(&moderator, order_id),
        Err(OrderServiceError::InvalidTransition {
            from: OrderStatus::Completed,
            ..
        })
    ));
    assert_eq!(service.soft_delete_order(&client, order_id).unwrap(), 0);
}

#[test]
fn non_moderator_gets_forbidden_even_for_unknown_order() {
    let mut conn = setup();
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    assert!(matches!(
        service.reject_order(&client, Uuid::new_v4()),
        Err(OrderServiceError::Forbidden(_))
    ));
}

#[test]
fn moderator_can_reject_draft_only() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let cobalt = seed_isotope(&conn, "Cobalt-60", 5.27);
    let client = Caller::client(Uuid::new_v4());
    let moderator = Caller::moderator(Uuid::new_v4());
    let mut service = service(&mut conn);

    let first = service.add_isotope(&client, carbon).unwrap().item().order_id;
    let rejected = service.reject_order(&moderator, first).unwrap();
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert_eq!(rejected.moderator_id, Some(moderator.user_id));

    let second = service.add_isotope(&client, cobalt).unwrap().item().order_id;
    assert_ne!(first, second);
    service.form_order(&client, second).unwrap();
    assert!(matches!(
        service.reject_order(&moderator, second),
        Err(OrderServiceError::InvalidTransition {
            from: OrderStatus::Formed,
            to: OrderStatus::Rejected,
            ..
        })
    ));
}

#[test]
fn forming_empty_draft_is_rejected() {
    let mut conn = setup();
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let draft = service.get_or_create_draft(&client).unwrap();
    assert!(matches!(
        service.form_order(&client, draft.id),
        Err(OrderServiceError::EmptyOrder(id)) if id == draft.id
    ));
}

#[test]
fn formed_order_is_frozen_and_frees_the_draft_slot() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let item = service.add_isotope(&client, carbon).unwrap().item().clone();
    service.form_order(&client, item.order_id).unwrap();

    assert!(matches!(
        service.remove_item(&client, item.id),
        Err(OrderServiceError::NotEditable {
            status: OrderStatus::Formed,
            ..
        })
    ));
    assert!(matches!(
        service.form_order(&client, item.order_id),
        Err(OrderServiceError::InvalidTransition { .. })
    ));

    let fresh = service.get_or_create_draft(&client).unwrap();
    assert_ne!(fresh.id, item.order_id);
    assert_eq!(service.list_orders(&client).unwrap().len(), 2);
}

#[test]
fn moderators_list_every_client_and_clients_list_their_own() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let alice = Caller::client(Uuid::new_v4());
    let bob = Caller::client(Uuid::new_v4());
    let moderator = Caller::moderator(Uuid::new_v4());
    let mut service = service(&mut conn);

    let alice_order = service.add_isotope(&alice, carbon).unwrap().item().order_id;
    let bob_order = service.add_isotope(&bob, carbon).unwrap().item().order_id;
    service.soft_delete_order(&bob, bob_order).unwrap();
    service.get_or_create_draft(&bob).unwrap();

    let alice_orders = service.list_orders(&alice).unwrap();
    assert_eq!(alice_orders.len(), 1);
    assert_eq!(alice_orders[0].id, alice_order);

    let all = service.list_orders(&moderator).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|order| order.status != OrderStatus::Deleted));

    let detail = service.get_order(&moderator, alice_order).unwrap();
    assert_eq!(detail.order.client_id, alice.user_id);
}

#[test]
fn order_status_serializes_as_snake_case() {
    assert_eq!(
        serde_json::to_string(&OrderStatus::Completed).unwrap(),
        "\"completed\""
    );
    let parsed: OrderStatus = serde_json::from_str("\"formed\"").unwrap();
    assert_eq!(parsed, OrderStatus::Formed);
}

#[test]
fn removing_computed_item_refreshes_order_total() {
    let mut conn = setup();
    let carbon = seed_isotope(&conn, "Carbon-14", 5730.0);
    let cobalt = seed_isotope(&conn, "Cobalt-60", 5.27);
    let client = Caller::client(Uuid::new_v4());
    let mut service = service(&mut conn);

    let carbon_item = service.add_isotope(&client, carbon).unwrap().item().clone();
    let cobalt_item = service.add_isotope(&client, cobalt).unwrap().item().clone();
    let order_id = carbon_item.order_id;
    let batch = [
        ItemMassUpdate {
            item_id: carbon_item.id,
            initial_mass_grams: 2.0,
        },
        ItemMassUpdate {
            item_id: cobalt_item.id,
            initial_mass_grams: 3.0,
        },
    ];
    let order = service
        .recompute_order(&client, order_id, 0.0, &batch)
        .unwrap();
    assert_eq!(order.total_activity, Some(5.0));

    service.remove_item(&client, cobalt_item.id).unwrap();
    let detail = service.get_order(&client, order_id).unwrap();
    let item_sum: f64 = detail
        .items
        .iter()
        .filter_map(|view| view.item.remaining_activity)
        .sum();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.order.total_activity, Some(item_sum));
    assert_eq!(detail.order.total_activity, Some(2.0));

    service.remove_item(&client, carbon_item.id).unwrap();
    let detail = service.get_order(&client, order_id).unwrap();
    assert!(detail.items.is_empty());
    assert_eq!(detail.order.total_activity, None);
}

#[test]
fn items_and_orders_keep_insertion_order() {
    let mut conn = setup();
    let isotopes: Vec<IsotopeId> = (0..6)
        .map(|index| seed_isotope(&conn, &format!("Isotope-{index}"), 10.0 + index as f64))
        .collect();
    let moderator = Caller::moderator(Uuid::new_v4());
    let clients: Vec<Caller> = (0..4).map(|_| Caller::client(Uuid::new_v4())).collect();
    let mut service = service(&mut conn);

    let first = &clients[0];
    let added: Vec<_> = isotopes
        .iter()
        .map(|isotope| service.add_isotope(first, *isotope).unwrap().item().id)
        .collect();
    let order_id = service.draft_summary(first).unwrap().unwrap().order_id;
    let listed: Vec<_> = service
        .get_order(first, order_id)
        .unwrap()
        .items
        .iter()
        .map(|view| view.item.id)
        .collect();
    assert_eq!(listed, added);

    let created: Vec<_> = clients
        .iter()
        .skip(1)
        .map(|client| service.get_or_create_draft(client).unwrap().id)
        .collect();
    let mut expected_newest_first = vec![order_id];
    expected_newest_first.extend(created);
    expected_newest_first.reverse();
    let listed_orders: Vec<_> = service
        .list_orders(&moderator)
        .unwrap()
        .iter()
        .map(|order| order.id)
        .collect();
    assert_eq!(listed_orders, expected_newest_first);
}
