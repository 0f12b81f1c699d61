//! CLI command implementations

pub mod checkout;
pub mod clean;
pub mod list;

pub use checkout::CheckoutArgs;
pub use clean::CleanArgs;
pub use list::ListArgs;
