//! Aggregates module
pub mod account;
pub mod basket;
pub mod order;
pub mod product;
pub mod shop;

pub use account::{Admin, Registration, User};
pub use basket::{Basket, BasketError, BasketItem, BasketOption};
pub use order::{Order, OrderItem, OrderItemOption, OrderStatusLog, OrderSummary, StatusChange};
pub use product::{OptionCategory, OptionCategoryDraft, OptionDraft, Product, ProductDetails, ProductDraft, ProductError, ProductOption, ProductStatus};
pub use shop::{PublicShop, Shop, ShopDraft, ShopError, ShopPatch};
