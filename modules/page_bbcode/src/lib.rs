// === MODULE DEFINITION ===
// The registry needs access to the module struct for instantiation
pub mod module;
pub use module::PageBBCodeRegistration;

#[doc(hidden)]
pub mod config;
pub use config::{BBCodeElement, PageBBCodeConfig};
