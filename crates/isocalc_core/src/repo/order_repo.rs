//! Calculation order repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist orders and items with storage-level invariants.
//! - Own the transactional write paths: draft creation, item insertion and
//!   batch recomputation.
//!
//! # Invariants
//! - At most one `draft` order per client (partial unique index). Losing an
//!   insert race is recovered by re-reading the winner's draft.
//! - `(order_uuid, isotope_uuid)` is unique; re-adding is reported, not raised.
//! - Recompute validates and writes every item plus the order total in one
//!   transaction; any failure leaves the previous committed state.
//! - The stored order total always equals the sum of its items' computed
//!   activities; item removal refreshes it in the same transaction.
//! - Status changes are conditional updates keyed on the expected current
//!   status (and owner where relevant), never load-mutate-save.

use crate::db::is_unique_violation;
use crate::decay::checked_remaining_activity;
use crate::model::isotope::IsotopeId;
use crate::model::order::{
    AddItemOutcome, CalculationItem, CalculationOrder, ItemId, ItemMassUpdate, OrderId,
    OrderItemView, OrderStatus, UserId, DEFAULT_INITIAL_MASS_GRAMS,
};
use crate::model::{require_non_negative, require_positive};
use crate::repo::{ensure_connection_ready, parse_uuid, EntityKind, RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

const ORDER_SELECT_SQL: &str = "SELECT
    uuid,
    status,
    created_at,
    formed_at,
    completed_at,
    client_id,
    moderator_id,
    time_elapsed_years,
    total_activity
FROM calculation_orders";

const ITEM_SELECT_SQL: &str = "SELECT
    uuid,
    order_uuid,
    isotope_uuid,
    initial_mass_grams,
    remaining_activity
FROM calculation_items";

/// Query options for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderListQuery {
    /// Restrict to one client; `None` lists every client's orders.
    pub client_id: Option<UserId>,
}

/// Repository interface for calculation orders and items.
pub trait OrderRepository {
    /// Returns the client's draft, creating it when absent.
    fn get_or_create_draft(&mut self, client_id: UserId) -> RepoResult<CalculationOrder>;
    /// Adds an active isotope to the client's draft in one transaction.
    fn add_to_draft(
        &mut self,
        client_id: UserId,
        isotope_id: IsotopeId,
    ) -> RepoResult<(CalculationOrder, AddItemOutcome)>;
    fn find_draft(&self, client_id: UserId) -> RepoResult<Option<CalculationOrder>>;
    /// Loads one order; deleted orders are hidden.
    fn get_order(&self, order_id: OrderId) -> RepoResult<Option<CalculationOrder>>;
    fn list_orders(&self, query: &OrderListQuery) -> RepoResult<Vec<CalculationOrder>>;
    fn list_items(&self, order_id: OrderId) -> RepoResult<Vec<OrderItemView>>;
    fn count_items(&self, order_id: OrderId) -> RepoResult<u32>;
    /// Loads one item if its order belongs to `client_id` and is not deleted.
    fn get_client_item(
        &self,
        item_id: ItemId,
        client_id: UserId,
    ) -> RepoResult<Option<CalculationItem>>;
    /// Deletes one item from a draft owned by `client_id` and refreshes the
    /// order total. Returns rows affected.
    fn delete_item(&mut self, item_id: ItemId, client_id: UserId) -> RepoResult<usize>;
    /// Applies a mass batch, recomputes activities and the order total.
    fn recompute(
        &mut self,
        order_id: OrderId,
        client_id: UserId,
        time_elapsed_years: f64,
        updates: &[ItemMassUpdate],
    ) -> RepoResult<CalculationOrder>;
    /// `draft -> formed` for an owned, non-empty draft. Returns rows affected.
    fn form_order(&self, order_id: OrderId, client_id: UserId) -> RepoResult<usize>;
    /// Moves an order from `from` to `to`, stamping moderator and completion
    /// time. Returns rows affected.
    fn moderate_order(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        moderator_id: UserId,
    ) -> RepoResult<usize>;
    /// Soft-deletes an owned `draft`/`formed` order. Returns rows affected.
    fn soft_delete_order(&self, order_id: OrderId, client_id: UserId) -> RepoResult<usize>;
}

/// SQLite-backed order repository.
pub struct SqliteOrderRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteOrderRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &["isotopes", "calculation_orders", "calculation_items"],
        )?;
        Ok(Self { conn })
    }
}

impl OrderRepository for SqliteOrderRepository<'_> {
    fn get_or_create_draft(&mut self, client_id: UserId) -> RepoResult<CalculationOrder> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let draft = draft_in_tx(&tx, client_id)?;
        tx.commit()?;
        Ok(draft)
    }

    fn add_to_draft(
        &mut self,
        client_id: UserId,
        isotope_id: IsotopeId,
    ) -> RepoResult<(CalculationOrder, AddItemOutcome)> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let isotope_active: Option<i64> = tx
            .query_row(
                "SELECT is_active FROM isotopes WHERE uuid = ?1;",
                [isotope_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if isotope_active != Some(1) {
            return Err(RepoError::not_found(EntityKind::Isotope, isotope_id));
        }

        let draft = draft_in_tx(&tx, client_id)?;
        let candidate = CalculationItem {
            id: Uuid::new_v4(),
            order_id: draft.id,
            isotope_id,
            initial_mass_grams: DEFAULT_INITIAL_MASS_GRAMS,
            remaining_activity: None,
        };
        let inserted = tx.execute(
            "INSERT INTO calculation_items (
                uuid,
                order_uuid,
                isotope_uuid,
                initial_mass_grams
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (order_uuid, isotope_uuid) DO NOTHING;",
            params![
                candidate.id.to_string(),
                candidate.order_id.to_string(),
                candidate.isotope_id.to_string(),
                candidate.initial_mass_grams,
            ],
        )?;

        let outcome = if inserted == 1 {
            AddItemOutcome::Added(candidate)
        } else {
            let existing = tx
                .query_row(
                    &format!("{ITEM_SELECT_SQL} WHERE order_uuid = ?1 AND isotope_uuid = ?2;"),
                    params![draft.id.to_string(), isotope_id.to_string()],
                    |row| Ok(parse_item_row(row)),
                )
                .optional()?
                .transpose()?
                .ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "item for isotope {isotope_id} vanished from order {}",
                        draft.id
                    ))
                })?;
            AddItemOutcome::AlreadyPresent(existing)
        };

        tx.commit()?;
        Ok((draft, outcome))
    }

    fn find_draft(&self, client_id: UserId) -> RepoResult<Option<CalculationOrder>> {
        find_draft_on(self.conn, client_id)
    }

    fn get_order(&self, order_id: OrderId) -> RepoResult<Option<CalculationOrder>> {
        self.conn
            .query_row(
                &format!("{ORDER_SELECT_SQL} WHERE uuid = ?1 AND status <> 'deleted';"),
                [order_id.to_string()],
                |row| Ok(parse_order_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_orders(&self, query: &OrderListQuery) -> RepoResult<Vec<CalculationOrder>> {
        let mut sql = format!("{ORDER_SELECT_SQL} WHERE status <> 'deleted'");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(client_id) = query.client_id {
            sql.push_str(" AND client_id = ?");
            bind_values.push(Value::Text(client_id.to_string()));
        }
        // created_at has second resolution; rowid keeps insertion order.
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut orders = Vec::new();
        while let Some(row) = rows.next()? {
            orders.push(parse_order_row(row)?);
        }
        Ok(orders)
    }

    fn list_items(&self, order_id: OrderId) -> RepoResult<Vec<OrderItemView>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                ci.uuid,
                ci.order_uuid,
                ci.isotope_uuid,
                ci.initial_mass_grams,
                ci.remaining_activity,
                i.name AS isotope_name,
                i.half_life_years
             FROM calculation_items ci
             INNER JOIN isotopes i ON i.uuid = ci.isotope_uuid
             WHERE ci.order_uuid = ?1
             ORDER BY ci.created_at ASC, ci.rowid ASC;",
        )?;
        let mut rows = stmt.query([order_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(OrderItemView {
                item: parse_item_row(row)?,
                isotope_name: row.get("isotope_name")?,
                half_life_years: row.get("half_life_years")?,
            });
        }
        Ok(items)
    }

    fn count_items(&self, order_id: OrderId) -> RepoResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM calculation_items WHERE order_uuid = ?1;",
            [order_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn get_client_item(
        &self,
        item_id: ItemId,
        client_id: UserId,
    ) -> RepoResult<Option<CalculationItem>> {
        self.conn
            .query_row(
                "SELECT
                    ci.uuid,
                    ci.order_uuid,
                    ci.isotope_uuid,
                    ci.initial_mass_grams,
                    ci.remaining_activity
                 FROM calculation_items ci
                 INNER JOIN calculation_orders o ON o.uuid = ci.order_uuid
                 WHERE ci.uuid = ?1
                   AND o.client_id = ?2
                   AND o.status <> 'deleted';",
                params![item_id.to_string(), client_id.to_string()],
                |row| Ok(parse_item_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn delete_item(&mut self, item_id: ItemId, client_id: UserId) -> RepoResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let order_text: Option<String> = tx
            .query_row(
                "SELECT o.uuid
                 FROM calculation_items ci
                 INNER JOIN calculation_orders o ON o.uuid = ci.order_uuid
                 WHERE ci.uuid = ?1
                   AND o.client_id = ?2
                   AND o.status = 'draft';",
                params![item_id.to_string(), client_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(order_text) = order_text else {
            return Ok(0);
        };

        let changed = tx.execute(
            "DELETE FROM calculation_items WHERE uuid = ?1;",
            [item_id.to_string()],
        )?;
        refresh_total(&tx, &order_text)?;
        tx.commit()?;
        Ok(changed)
    }

    fn recompute(
        &mut self,
        order_id: OrderId,
        client_id: UserId,
        time_elapsed_years: f64,
        updates: &[ItemMassUpdate],
    ) -> RepoResult<CalculationOrder> {
        let time_elapsed_years = require_non_negative("time_elapsed_years", time_elapsed_years)?;
        let order_text = order_id.to_string();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let order = tx
            .query_row(
                &format!(
                    "{ORDER_SELECT_SQL}
                     WHERE uuid = ?1
                       AND client_id = ?2
                       AND status <> 'deleted';"
                ),
                params![order_text.as_str(), client_id.to_string()],
                |row| Ok(parse_order_row(row)),
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| RepoError::not_found(EntityKind::Order, order_id))?;
        if order.status != OrderStatus::Draft {
            return Err(RepoError::StatusConflict {
                order_id,
                status: order.status,
            });
        }

        for update in updates {
            let mass = require_positive("initial_mass_grams", update.initial_mass_grams)?;
            let half_life_years: f64 = tx
                .query_row(
                    "SELECT i.half_life_years
                     FROM calculation_items ci
                     INNER JOIN isotopes i ON i.uuid = ci.isotope_uuid
                     WHERE ci.uuid = ?1
                       AND ci.order_uuid = ?2;",
                    params![update.item_id.to_string(), order_text.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| RepoError::not_found(EntityKind::Item, update.item_id))?;

            let activity = checked_remaining_activity(half_life_years, mass, time_elapsed_years)
                .map_err(|err| {
                    RepoError::InvalidData(format!("item {}: {err}", update.item_id))
                })?;
            tx.execute(
                "UPDATE calculation_items
                 SET
                    initial_mass_grams = ?2,
                    remaining_activity = ?3
                 WHERE uuid = ?1;",
                params![update.item_id.to_string(), mass, activity],
            )?;
        }

        tx.execute(
            "UPDATE calculation_orders SET time_elapsed_years = ?2 WHERE uuid = ?1;",
            params![order_text.as_str(), time_elapsed_years],
        )?;
        let total_activity = refresh_total(&tx, &order_text)?;

        tx.commit()?;

        Ok(CalculationOrder {
            time_elapsed_years,
            total_activity,
            ..order
        })
    }

    fn form_order(&self, order_id: OrderId, client_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE calculation_orders
             SET
                status = 'formed',
                formed_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND client_id = ?2
               AND status = 'draft'
               AND EXISTS (
                   SELECT 1 FROM calculation_items WHERE order_uuid = ?1
               );",
            params![order_id.to_string(), client_id.to_string()],
        )?;
        Ok(changed)
    }

    fn moderate_order(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        moderator_id: UserId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE calculation_orders
             SET
                status = ?3,
                moderator_id = ?4,
                completed_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND status = ?2;",
            params![
                order_id.to_string(),
                from.as_str(),
                to.as_str(),
                moderator_id.to_string(),
            ],
        )?;
        Ok(changed)
    }

    fn soft_delete_order(&self, order_id: OrderId, client_id: UserId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE calculation_orders
             SET status = 'deleted'
             WHERE uuid = ?1
               AND client_id = ?2
               AND status IN ('draft', 'formed');",
            params![order_id.to_string(), client_id.to_string()],
        )?;
        Ok(changed)
    }
}

/// Fetches or creates the client's draft inside an open transaction.
///
/// A concurrent writer on another connection may win the insert; the unique
/// violation is then resolved by reading back its draft.
fn draft_in_tx(tx: &Transaction<'_>, client_id: UserId) -> RepoResult<CalculationOrder> {
    if let Some(draft) = find_draft_on(tx, client_id)? {
        return Ok(draft);
    }

    let order_id = Uuid::new_v4();
    let inserted = tx.execute(
        "INSERT INTO calculation_orders (uuid, status, client_id)
         VALUES (?1, 'draft', ?2);",
        params![order_id.to_string(), client_id.to_string()],
    );

    match inserted {
        Ok(_) => find_draft_on(tx, client_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("draft {order_id} missing after insert"))
        }),
        // Unreachable while every writer goes through an IMMEDIATE transaction;
        // covers connections that insert drafts without one.
        Err(err) if is_unique_violation(&err) => {
            debug!("event=order_draft_conflict module=repo status=retry client_id={client_id}");
            find_draft_on(tx, client_id)?
                .ok_or_else(|| RepoError::InvalidData("draft conflict without draft row".into()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Rewrites the stored order total from its items and returns it.
///
/// SUM skips NULL activities and yields NULL when nothing is computed.
fn refresh_total(tx: &Transaction<'_>, order_text: &str) -> RepoResult<Option<f64>> {
    let total_activity: Option<f64> = tx.query_row(
        "SELECT SUM(remaining_activity)
         FROM calculation_items
         WHERE order_uuid = ?1;",
        [order_text],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE calculation_orders SET total_activity = ?2 WHERE uuid = ?1;",
        params![order_text, total_activity],
    )?;
    Ok(total_activity)
}

fn find_draft_on(conn: &Connection, client_id: UserId) -> RepoResult<Option<CalculationOrder>> {
    conn.query_row(
        &format!("{ORDER_SELECT_SQL} WHERE client_id = ?1 AND status = 'draft';"),
        [client_id.to_string()],
        |row| Ok(parse_order_row(row)),
    )
    .optional()?
    .transpose()
}

fn parse_order_row(row: &Row<'_>) -> RepoResult<CalculationOrder> {
    let uuid_text: String = row.get("uuid")?;
    let status_text: String = row.get("status")?;
    let status = OrderStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in calculation_orders.status"
        ))
    })?;
    let client_text: String = row.get("client_id")?;
    let moderator_id = match row.get::<_, Option<String>>("moderator_id")? {
        Some(value) => Some(parse_uuid(&value, "calculation_orders.moderator_id")?),
        None => None,
    };

    Ok(CalculationOrder {
        id: parse_uuid(&uuid_text, "calculation_orders.uuid")?,
        status,
        created_at: row.get("created_at")?,
        formed_at: row.get("formed_at")?,
        completed_at: row.get("completed_at")?,
        client_id: parse_uuid(&client_text, "calculation_orders.client_id")?,
        moderator_id,
        time_elapsed_years: row.get("time_elapsed_years")?,
        total_activity: row.get("total_activity")?,
    })
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<CalculationItem> {
    let uuid_text: String = row.get("uuid")?;
    let order_text: String = row.get("order_uuid")?;
    let isotope_text: String = row.get("isotope_uuid")?;

    Ok(CalculationItem {
        id: parse_uuid(&uuid_text, "calculation_items.uuid")?,
        order_id: parse_uuid(&order_text, "calculation_items.order_uuid")?,
        isotope_id: parse_uuid(&isotope_text, "calculation_items.isotope_uuid")?,
        initial_mass_grams: row.get("initial_mass_grams")?,
        remaining_activity: row.get("remaining_activity")?,
    })
}
