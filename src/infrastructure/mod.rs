//! Infrastructure layer: concrete implementations of the domain's
//! transport and history interfaces, plus the wire DTOs they share.

pub mod dto;
pub mod history;
pub mod transport;
