mod request_types;

pub use request_types::{BuyTicketRequest, Reply, Ticket};

pub mod server;
