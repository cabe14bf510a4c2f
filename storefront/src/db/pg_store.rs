// verdant/storefront/src/db/pg_store.rs

//! PostgreSQL implementation of the ledger store.
//!
//! Every change set runs inside one transaction. Guards are expressed in the
//! `WHERE` clause of the guarded statement; when it touches no row the
//! transaction is dropped (rolled back) and the matching `StoreError` returned.

use super::rows::{CustomerRow, OrderItemRow, OrderRow, ProductRow, WalletTransactionRow};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;
use verdant_core::models::{Cart, CartLine, Customer, Order, OrderItem, Product, WalletTransaction};
use verdant_core::{ChangeSet, LedgerStore, Mutation, StoreError, StoreResult};

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, recipient_name, phone, address, email, \
  note, subtotal, discount_amount, shipping_fee, total, wallet_amount_used, points_earned, points_awarded_at, \
  cancellation_reason, cancellation_requested_at, cancelled_reason, created_at, updated_at, shipped_at, delivered_at, \
  cancelled_at, version";

const ITEM_COLUMNS: &str =
  "id, order_id, product_id, sku, name, quantity, unit_cost_price, unit_price, line_total, points_per_item";

const WALLET_COLUMNS: &str = "id, user_id, order_id, transaction_type, status, amount, balance_before, balance_after, \
  description, gateway, gateway_transaction_id, created_at, updated_at";

fn db(err: sqlx::Error) -> StoreError {
  StoreError::Backend(err.into())
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
  StoreError::NotFound {
    entity,
    id: id.to_string(),
  }
}

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  /// Attaches items to order rows, preserving row order.
  async fn hydrate(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    if rows.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let items: Vec<OrderItemRow> = sqlx::query_as(&format!(
      "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position"
    ))
    .bind(&ids)
    .fetch_all(&self.pool)
    .await
    .map_err(db)?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
      by_order.entry(item.order_id).or_default().push(item.into());
    }
    rows
      .into_iter()
      .map(|row| {
        let items = by_order.remove(&row.id).unwrap_or_default();
        row.into_order(items)
      })
      .collect()
  }

  async fn one_order(&self, row: Option<OrderRow>) -> StoreResult<Option<Order>> {
    match row {
      Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
      None => Ok(None),
    }
  }
}

#[async_trait]
impl LedgerStore for PgStore {
  async fn customer(&self, user_id: Uuid) -> StoreResult<Option<Customer>> {
    let row: Option<CustomerRow> =
      sqlx::query_as("SELECT id, email, full_name, wallet_balance, points FROM customers WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
    Ok(row.map(Customer::from))
  }

  async fn cart(&self, user_id: Uuid) -> StoreResult<Cart> {
    let discount_amount: Option<i64> = sqlx::query_scalar("SELECT discount_amount FROM carts WHERE user_id = $1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(db)?;
    let lines: Vec<(Uuid, i64)> =
      sqlx::query_as("SELECT product_id, quantity FROM cart_lines WHERE user_id = $1 ORDER BY product_id")
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

    Ok(Cart {
      user_id,
      lines: lines
        .into_iter()
        .map(|(product_id, quantity)| CartLine { product_id, quantity })
        .collect(),
      discount_amount: discount_amount.unwrap_or_default(),
    })
  }

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as(
      "SELECT id, sku, name, cost_price, price, quantity, is_active, points_per_item FROM products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(db)?;
    Ok(row.map(Product::from))
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(db)?;
    self.one_order(row).await
  }

  async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"))
      .bind(order_number)
      .fetch_optional(&self.pool)
      .await
      .map_err(db)?;
    self.one_order(row).await
  }

  async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, order_number DESC"
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(db)?;
    self.hydrate(rows).await
  }

  async fn orders_awaiting_cancellation(&self) -> StoreResult<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE cancellation_requested_at IS NOT NULL \
       ORDER BY cancellation_requested_at ASC"
    ))
    .fetch_all(&self.pool)
    .await
    .map_err(db)?;
    self.hydrate(rows).await
  }

  async fn wallet_transactions(&self, user_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    let rows: Vec<WalletTransactionRow> = sqlx::query_as(&format!(
      "SELECT {WALLET_COLUMNS} FROM wallet_transactions WHERE user_id = $1 ORDER BY seq ASC"
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(db)?;
    rows.into_iter().map(WalletTransaction::try_from).collect()
  }

  async fn wallet_transactions_for_order(&self, order_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    let rows: Vec<WalletTransactionRow> = sqlx::query_as(&format!(
      "SELECT {WALLET_COLUMNS} FROM wallet_transactions WHERE order_id = $1 ORDER BY seq ASC"
    ))
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(db)?;
    rows.into_iter().map(WalletTransaction::try_from).collect()
  }

  async fn wallet_transaction_by_gateway_id(
    &self,
    gateway_transaction_id: &str,
  ) -> StoreResult<Option<WalletTransaction>> {
    let row: Option<WalletTransactionRow> = sqlx::query_as(&format!(
      "SELECT {WALLET_COLUMNS} FROM wallet_transactions WHERE gateway_transaction_id = $1"
    ))
    .bind(gateway_transaction_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(db)?;
    row.map(WalletTransaction::try_from).transpose()
  }

  #[instrument(name = "pg_store::apply", skip_all, fields(mutations = %changes.summary()), err(Display))]
  async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
    let mut tx = self.pool.begin().await.map_err(db)?;
    for mutation in changes.into_mutations() {
      apply_mutation(&mut tx, mutation).await?;
    }
    tx.commit().await.map_err(db)?;
    debug!("change set committed");
    Ok(())
  }
}

async fn apply_mutation(tx: &mut Transaction<'_, Postgres>, mutation: Mutation) -> StoreResult<()> {
  match mutation {
    Mutation::InsertOrder(order) => insert_order(tx, &order).await,
    Mutation::UpdateOrder { order, expected_version } => update_order(tx, &order, expected_version).await,
    Mutation::AdjustStock { product_id, delta } => {
      let updated: Option<i64> = sqlx::query_scalar(
        "UPDATE products SET quantity = quantity + $2 WHERE id = $1 AND quantity + $2 >= 0 RETURNING quantity",
      )
      .bind(product_id)
      .bind(delta)
      .fetch_optional(&mut **tx)
      .await
      .map_err(db)?;
      if updated.is_some() {
        return Ok(());
      }
      let available: Option<i64> = sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db)?;
      match available {
        Some(available) => Err(StoreError::InsufficientStock {
          product_id,
          available,
          requested: -delta,
        }),
        None => Err(not_found("product", product_id)),
      }
    }
    Mutation::ClearCart { user_id } => {
      sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
      sqlx::query("UPDATE carts SET discount_amount = 0 WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
      Ok(())
    }
    Mutation::InsertWalletTransaction(row) => {
      let inserted = sqlx::query(&format!(
        "INSERT INTO wallet_transactions ({WALLET_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (gateway_transaction_id) DO NOTHING"
      ))
      .bind(row.id)
      .bind(row.user_id)
      .bind(row.order_id)
      .bind(row.transaction_type.as_str())
      .bind(row.status.as_str())
      .bind(row.amount)
      .bind(row.balance_before)
      .bind(row.balance_after)
      .bind(&row.description)
      .bind(row.gateway.map(|g| g.as_str()))
      .bind(&row.gateway_transaction_id)
      .bind(row.created_at)
      .bind(row.updated_at)
      .execute(&mut **tx)
      .await
      .map_err(db)?;
      if inserted.rows_affected() == 0 {
        return Err(StoreError::DuplicateGatewayTransaction(
          row.gateway_transaction_id.unwrap_or_default(),
        ));
      }
      Ok(())
    }
    Mutation::SettleWalletTransaction {
      id,
      expected,
      status,
      balance_before,
      balance_after,
      at,
    } => {
      let settled = sqlx::query(
        "UPDATE wallet_transactions SET status = $3, balance_before = $4, balance_after = $5, updated_at = $6 \
         WHERE id = $1 AND status = $2",
      )
      .bind(id)
      .bind(expected.as_str())
      .bind(status.as_str())
      .bind(balance_before)
      .bind(balance_after)
      .bind(at)
      .execute(&mut **tx)
      .await
      .map_err(db)?;
      if settled.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
          "wallet transaction {} is no longer {}",
          id,
          expected.as_str()
        )));
      }
      Ok(())
    }
    Mutation::SetWalletBalance { user_id, expected, balance } => {
      let updated = sqlx::query("UPDATE customers SET wallet_balance = $3 WHERE id = $1 AND wallet_balance = $2")
        .bind(user_id)
        .bind(expected)
        .bind(balance)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
      if updated.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
          "wallet balance of {} is no longer {}",
          user_id, expected
        )));
      }
      Ok(())
    }
    Mutation::AwardPoints { user_id, points } => {
      let updated = sqlx::query("UPDATE customers SET points = points + $2 WHERE id = $1")
        .bind(user_id)
        .bind(points)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
      if updated.rows_affected() == 0 {
        return Err(not_found("customer", user_id));
      }
      Ok(())
    }
  }
}

async fn insert_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> StoreResult<()> {
  let (cancellation_reason, cancellation_requested_at) = match &order.cancellation_request {
    Some(request) => (Some(request.reason.as_str()), Some(request.requested_at)),
    None => (None, None),
  };
  let inserted = sqlx::query(&format!(
    "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
     $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26) ON CONFLICT (order_number) DO NOTHING"
  ))
  .bind(order.id)
  .bind(&order.order_number)
  .bind(order.user_id)
  .bind(order.status.as_str())
  .bind(order.payment_status.as_str())
  .bind(&order.shipping.recipient_name)
  .bind(&order.shipping.phone)
  .bind(&order.shipping.address)
  .bind(&order.shipping.email)
  .bind(&order.note)
  .bind(order.subtotal)
  .bind(order.discount_amount)
  .bind(order.shipping_fee)
  .bind(order.total)
  .bind(order.wallet_amount_used)
  .bind(order.points_earned)
  .bind(order.points_awarded_at)
  .bind(cancellation_reason)
  .bind(cancellation_requested_at)
  .bind(&order.cancelled_reason)
  .bind(order.created_at)
  .bind(order.updated_at)
  .bind(order.shipped_at)
  .bind(order.delivered_at)
  .bind(order.cancelled_at)
  .bind(0_i64)
  .execute(&mut **tx)
  .await
  .map_err(db)?;
  if inserted.rows_affected() == 0 {
    return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
  }

  for (position, item) in order.items.iter().enumerate() {
    sqlx::query(&format!(
      "INSERT INTO order_items ({ITEM_COLUMNS}, position) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(item.id)
    .bind(order.id)
    .bind(item.product_id)
    .bind(&item.sku)
    .bind(&item.name)
    .bind(item.quantity)
    .bind(item.unit_cost_price)
    .bind(item.unit_price)
    .bind(item.line_total)
    .bind(item.points_per_item)
    .bind(position as i32)
    .execute(&mut **tx)
    .await
    .map_err(db)?;
  }
  Ok(())
}

async fn update_order(tx: &mut Transaction<'_, Postgres>, order: &Order, expected_version: u64) -> StoreResult<()> {
  let expected = i64::try_from(expected_version)
    .map_err(|_| StoreError::Conflict(format!("order {} version {} out of range", order.id, expected_version)))?;
  let (cancellation_reason, cancellation_requested_at) = match &order.cancellation_request {
    Some(request) => (Some(request.reason.as_str()), Some(request.requested_at)),
    None => (None, None),
  };

  let updated = sqlx::query(
    "UPDATE orders SET status = $3, payment_status = $4, note = $5, points_awarded_at = $6, \
     cancellation_reason = $7, cancellation_requested_at = $8, cancelled_reason = $9, updated_at = $10, \
     shipped_at = $11, delivered_at = $12, cancelled_at = $13, version = version + 1 \
     WHERE id = $1 AND version = $2",
  )
  .bind(order.id)
  .bind(expected)
  .bind(order.status.as_str())
  .bind(order.payment_status.as_str())
  .bind(&order.note)
  .bind(order.points_awarded_at)
  .bind(cancellation_reason)
  .bind(cancellation_requested_at)
  .bind(&order.cancelled_reason)
  .bind(order.updated_at)
  .bind(order.shipped_at)
  .bind(order.delivered_at)
  .bind(order.cancelled_at)
  .execute(&mut **tx)
  .await
  .map_err(db)?;
  if updated.rows_affected() > 0 {
    return Ok(());
  }

  let current: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
    .bind(order.id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db)?;
  match current {
    Some(version) => Err(StoreError::Conflict(format!(
      "order {} is at version {}, expected {}",
      order.id, version, expected_version
    ))),
    None => Err(not_found("order", order.id)),
  }
}
