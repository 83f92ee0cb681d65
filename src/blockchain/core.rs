// core.rs splits responsibilities into submodules for easier maintenance.
pub mod chain;
pub mod store;
pub mod validation;

pub use chain::*;
pub use store::*;
pub use validation::{
    find_by_id, first_invalid_index, verify_block, verify_chain, verify_chain_with_difficulty,
};
