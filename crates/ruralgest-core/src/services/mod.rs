//! Services shared by every RuralGest client.

mod inventory;
mod local_store;

pub use inventory::{
    InventoryService, NewConsumption, NewProduct, NewPurchase, CONSUMPTION_ENDPOINT,
    PRODUCTS_ENDPOINT, PURCHASES_ENDPOINT,
};
pub use local_store::LocalStore;
