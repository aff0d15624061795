use serde::{Deserialize, Serialize};

#[derive(Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BuyTicketRequest {
    pub concert_id: u64,
    pub ticket_category: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    pub serial_number: String,
    pub concert_id: u64,
    pub ticket_category: u64,
}

impl Ticket {
    pub fn issue(id: u64, serial_number: String, request: &BuyTicketRequest) -> Self {
        Self {
            id,
            serial_number,
            concert_id: request.concert_id,
            ticket_category: request.ticket_category,
        }
    }
}

/// The envelope every ticket endpoint answers with.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Ticket>,
}

impl Reply {
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn with_ticket(code: u16, message: &str, ticket: Ticket) -> Self {
        Self {
            data: Some(ticket),
            ..Self::new(code, message)
        }
    }
}
