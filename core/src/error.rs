// verdant/src/error.rs
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the pipeline engine itself, as opposed to its handlers.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },
}

/// Failures reported by a [`LedgerStore`](crate::store::LedgerStore).
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  /// An optimistic guard (order version, wallet balance, transaction status) no longer held.
  #[error("Concurrent modification detected: {0}")]
  Conflict(String),

  #[error("Order number already exists: {0}")]
  DuplicateOrderNumber(String),

  #[error("Gateway transaction id already recorded: {0}")]
  DuplicateGatewayTransaction(String),

  #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
  InsufficientStock {
    product_id: Uuid,
    available: i64,
    requested: i64,
  },

  #[error("Store backend failure: {0}")]
  Backend(#[from] anyhow::Error),
}

/// Coarse classification used by callers that translate errors into responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  InvalidState,
  InsufficientStock,
  InsufficientBalance,
  Unauthorized,
  Gateway,
  SignatureMismatch,
  Validation,
  Internal,
}

#[derive(Debug, Error)]
pub enum CommerceError {
  #[error("User not found: {0}")]
  UserNotFound(Uuid),

  #[error("Order not found: {0}")]
  OrderNotFound(String),

  #[error("Product not found: {0}")]
  ProductNotFound(Uuid),

  #[error("Wallet transaction not found: {0}")]
  TransactionNotFound(String),

  #[error("Cart is empty")]
  CartEmpty,

  #[error("Product '{name}' ({product_id}) is no longer available")]
  ProductUnavailable { product_id: Uuid, name: String },

  #[error("Insufficient stock for '{name}' ({product_id}): available {available}, requested {requested}")]
  InsufficientStock {
    product_id: Uuid,
    name: String,
    available: i64,
    requested: i64,
  },

  #[error("Insufficient wallet balance: available {available}, requested {requested}")]
  InsufficientBalance { available: i64, requested: i64 },

  #[error("Wallet amount {requested} exceeds order total {total}")]
  WalletAmountExceedsTotal { requested: i64, total: i64 },

  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("User {user_id} does not own order {order_id}")]
  Unauthorized { user_id: Uuid, order_id: Uuid },

  #[error("Validation error: {0}")]
  Validation(String),

  #[error("Unsupported payment gateway: {0}")]
  UnsupportedGateway(String),

  #[error("Payment gateway error: {0}")]
  Gateway(String),

  #[error("Callback signature mismatch for gateway {0}")]
  SignatureMismatch(String),

  #[error("Store error: {0}")]
  Store(#[from] StoreError),

  #[error("Workflow error: {0}")]
  Pipeline(#[from] PipelineError),
}

impl CommerceError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UserNotFound(_) | Self::OrderNotFound(_) | Self::ProductNotFound(_) | Self::TransactionNotFound(_) => {
        ErrorKind::NotFound
      }
      Self::CartEmpty | Self::InvalidState(_) => ErrorKind::InvalidState,
      Self::ProductUnavailable { .. } | Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
      Self::InsufficientBalance { .. } | Self::WalletAmountExceedsTotal { .. } => ErrorKind::InsufficientBalance,
      Self::Unauthorized { .. } => ErrorKind::Unauthorized,
      Self::Validation(_) => ErrorKind::Validation,
      Self::UnsupportedGateway(_) | Self::Gateway(_) => ErrorKind::Gateway,
      Self::SignatureMismatch(_) => ErrorKind::SignatureMismatch,
      Self::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
      Self::Store(StoreError::InsufficientStock { .. }) => ErrorKind::InsufficientStock,
      Self::Store(StoreError::Conflict(_)) => ErrorKind::InvalidState,
      Self::Store(_) | Self::Pipeline(_) => ErrorKind::Internal,
    }
  }

  /// Localized, non-technical text for storefront customers.
  pub fn customer_message(&self) -> String {
    match self {
      Self::UserNotFound(_) => "Không tìm thấy tài khoản của bạn.".to_string(),
      Self::OrderNotFound(_) => "Không tìm thấy đơn hàng.".to_string(),
      Self::ProductNotFound(_) => "Sản phẩm không tồn tại.".to_string(),
      Self::TransactionNotFound(_) => "Không tìm thấy giao dịch.".to_string(),
      Self::CartEmpty => "Giỏ hàng của bạn đang trống.".to_string(),
      Self::ProductUnavailable { name, .. } => format!("Sản phẩm \"{}\" hiện không còn bán.", name),
      Self::InsufficientStock { name, available, .. } => {
        format!("Sản phẩm \"{}\" chỉ còn {} sản phẩm trong kho.", name, available)
      }
      Self::InsufficientBalance { .. } => "Số dư ví không đủ để thực hiện giao dịch.".to_string(),
      Self::WalletAmountExceedsTotal { .. } => "Số tiền dùng từ ví vượt quá tổng giá trị đơn hàng.".to_string(),
      Self::InvalidState(_) => "Không thể thực hiện thao tác này với đơn hàng ở trạng thái hiện tại.".to_string(),
      Self::Unauthorized { .. } => "Bạn không có quyền truy cập đơn hàng này.".to_string(),
      Self::Validation(_) => "Thông tin gửi lên không hợp lệ.".to_string(),
      Self::UnsupportedGateway(_) => "Phương thức thanh toán không được hỗ trợ.".to_string(),
      Self::Gateway(_) | Self::SignatureMismatch(_) => {
        "Cổng thanh toán đang gặp sự cố, vui lòng thử lại sau.".to_string()
      }
      Self::Store(StoreError::InsufficientStock { .. }) => "Một số sản phẩm trong giỏ đã hết hàng.".to_string(),
      Self::Store(StoreError::Conflict(_)) => "Đơn hàng vừa được cập nhật, vui lòng thử lại.".to_string(),
      Self::Store(_) | Self::Pipeline(_) => "Đã có lỗi xảy ra, vui lòng thử lại sau.".to_string(),
    }
  }
}

pub type CommerceResult<T> = Result<T, CommerceError>;
pub type StoreResult<T> = Result<T, StoreError>;
