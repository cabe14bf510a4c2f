// verdant/src/store/memory.rs

//! In-process [`LedgerStore`] used by tests, benches and local development.

use super::{ChangeSet, LedgerStore, Mutation};
use crate::error::{StoreError, StoreResult};
use crate::models::{Cart, Customer, Order, Product, WalletTransaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct State {
  customers: HashMap<Uuid, Customer>,
  products: HashMap<Uuid, Product>,
  carts: HashMap<Uuid, Cart>,
  orders: HashMap<Uuid, Order>,
  transactions: Vec<WalletTransaction>,
}

impl State {
  fn apply(&mut self, mutation: Mutation) -> StoreResult<()> {
    match mutation {
      Mutation::InsertOrder(order) => {
        if self.orders.values().any(|o| o.order_number == order.order_number) {
          return Err(StoreError::DuplicateOrderNumber(order.order_number));
        }
        self.orders.insert(order.id, order);
      }
      Mutation::UpdateOrder { mut order, expected_version } => {
        let current = self.orders.get_mut(&order.id).ok_or_else(|| StoreError::NotFound {
          entity: "order",
          id: order.id.to_string(),
        })?;
        if current.version != expected_version {
          return Err(StoreError::Conflict(format!(
            "order {} is at version {}, expected {}",
            order.id, current.version, expected_version
          )));
        }
        order.version = expected_version + 1;
        order.items = std::mem::take(&mut current.items);
        *current = order;
      }
      Mutation::AdjustStock { product_id, delta } => {
        let product = self.products.get_mut(&product_id).ok_or_else(|| StoreError::NotFound {
          entity: "product",
          id: product_id.to_string(),
        })?;
        if product.quantity + delta < 0 {
          return Err(StoreError::InsufficientStock {
            product_id,
            available: product.quantity,
            requested: -delta,
          });
        }
        product.quantity += delta;
      }
      Mutation::ClearCart { user_id } => {
        if let Some(cart) = self.carts.get_mut(&user_id) {
          cart.lines.clear();
          cart.discount_amount = 0;
        }
      }
      Mutation::InsertWalletTransaction(tx) => {
        if let Some(gateway_id) = &tx.gateway_transaction_id {
          if self
            .transactions
            .iter()
            .any(|t| t.gateway_transaction_id.as_deref() == Some(gateway_id.as_str()))
          {
            return Err(StoreError::DuplicateGatewayTransaction(gateway_id.clone()));
          }
        }
        self.transactions.push(tx);
      }
      Mutation::SettleWalletTransaction {
        id,
        expected,
        status,
        balance_before,
        balance_after,
        at,
      } => {
        let tx = self
          .transactions
          .iter_mut()
          .find(|t| t.id == id)
          .ok_or_else(|| StoreError::NotFound {
            entity: "wallet transaction",
            id: id.to_string(),
          })?;
        if tx.status != expected {
          return Err(StoreError::Conflict(format!(
            "wallet transaction {} is {}, expected {}",
            id,
            tx.status.as_str(),
            expected.as_str()
          )));
        }
        tx.status = status;
        tx.balance_before = balance_before;
        tx.balance_after = balance_after;
        tx.updated_at = at;
      }
      Mutation::SetWalletBalance { user_id, expected, balance } => {
        let customer = self.customer_mut(user_id)?;
        if customer.wallet_balance != expected {
          return Err(StoreError::Conflict(format!(
            "wallet balance of {} is {}, expected {}",
            user_id, customer.wallet_balance, expected
          )));
        }
        customer.wallet_balance = balance;
      }
      Mutation::AwardPoints { user_id, points } => {
        self.customer_mut(user_id)?.points += points;
      }
    }
    Ok(())
  }

  fn customer_mut(&mut self, user_id: Uuid) -> StoreResult<&mut Customer> {
    self.customers.get_mut(&user_id).ok_or_else(|| StoreError::NotFound {
      entity: "customer",
      id: user_id.to_string(),
    })
  }
}

/// All state sits behind one mutex. `apply` works on a scratch copy and
/// swaps it in only when every mutation succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_customer(&self, customer: Customer) {
    self.state.lock().customers.insert(customer.id, customer);
  }

  pub fn insert_product(&self, product: Product) {
    self.state.lock().products.insert(product.id, product);
  }

  pub fn put_cart(&self, cart: Cart) {
    self.state.lock().carts.insert(cart.user_id, cart);
  }

  pub fn set_product_active(&self, product_id: Uuid, active: bool) {
    if let Some(product) = self.state.lock().products.get_mut(&product_id) {
      product.is_active = active;
    }
  }

  pub fn product_quantity(&self, product_id: Uuid) -> Option<i64> {
    self.state.lock().products.get(&product_id).map(|p| p.quantity)
  }

  pub fn wallet_balance(&self, user_id: Uuid) -> Option<i64> {
    self.state.lock().customers.get(&user_id).map(|c| c.wallet_balance)
  }

  pub fn order_count(&self) -> usize {
    self.state.lock().orders.len()
  }
}

#[async_trait]
impl LedgerStore for MemoryStore {
  async fn customer(&self, user_id: Uuid) -> StoreResult<Option<Customer>> {
    Ok(self.state.lock().customers.get(&user_id).cloned())
  }

  async fn cart(&self, user_id: Uuid) -> StoreResult<Cart> {
    Ok(self.state.lock().carts.get(&user_id).cloned().unwrap_or_else(|| Cart {
      user_id,
      ..Cart::default()
    }))
  }

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
    Ok(self.state.lock().products.get(&product_id).cloned())
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
    Ok(self.state.lock().orders.get(&order_id).cloned())
  }

  async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
    Ok(
      self
        .state
        .lock()
        .orders
        .values()
        .find(|o| o.order_number == order_number)
        .cloned(),
    )
  }

  async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
    let mut orders: Vec<Order> = self
      .state
      .lock()
      .orders
      .values()
      .filter(|o| o.user_id == user_id)
      .cloned()
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
  }

  async fn orders_awaiting_cancellation(&self) -> StoreResult<Vec<Order>> {
    let mut orders: Vec<Order> = self
      .state
      .lock()
      .orders
      .values()
      .filter(|o| o.cancellation_request.is_some())
      .cloned()
      .collect();
    orders.sort_by_key(|o| o.cancellation_request.as_ref().map(|r| r.requested_at));
    Ok(orders)
  }

  async fn wallet_transactions(&self, user_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    Ok(
      self
        .state
        .lock()
        .transactions
        .iter()
        .filter(|t| t.user_id == user_id)
        .cloned()
        .collect(),
    )
  }

  async fn wallet_transactions_for_order(&self, order_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
    Ok(
      self
        .state
        .lock()
        .transactions
        .iter()
        .filter(|t| t.order_id == Some(order_id))
        .cloned()
        .collect(),
    )
  }

  async fn wallet_transaction_by_gateway_id(
    &self,
    gateway_transaction_id: &str,
  ) -> StoreResult<Option<WalletTransaction>> {
    Ok(
      self
        .state
        .lock()
        .transactions
        .iter()
        .find(|t| t.gateway_transaction_id.as_deref() == Some(gateway_transaction_id))
        .cloned(),
    )
  }

  async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
    let mut guard = self.state.lock();
    let mut scratch = guard.clone();
    for mutation in changes.into_mutations() {
      scratch.apply(mutation)?;
    }
    *guard = scratch;
    Ok(())
  }
}
