pub mod extract;
pub mod health_handlers;
pub mod redemption_handlers;
