//! Domain models for the storefront.
//!
//! These are validated domain objects. Database row types live next to the
//! queries in `crate::db` and convert into these.

pub mod custom_order;
pub mod notification;
pub mod order;
pub mod session;
pub mod user;

pub use custom_order::{CustomOrder, CustomOrderType, NewCustomOrder};
pub use notification::{Notification, OutboxTask};
pub use order::{NewOrder, Order, OrderPatch, PaymentSettlement};
pub use session::{CurrentAdmin, CurrentCustomer, session_keys};
pub use user::{AdminUser, Customer};
