//! Domain layer: aggregates, value objects and the pure order-lifecycle rules.
pub mod aggregates;
pub mod events;
pub mod flow;
pub mod pricing;
pub mod stock;
pub mod value_objects;
