pub mod code_generator;
pub mod lifecycle;
pub mod redemption_store;
pub mod validation;
