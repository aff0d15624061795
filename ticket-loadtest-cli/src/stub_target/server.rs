use crate::stub_target::{BuyTicketRequest, Reply, Ticket};
use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer, ResponseError};
use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_GATE_TRIES: u32 = 32;
pub const DEFAULT_GATE_RETRY_DELAY: RangeInclusive<Duration> =
    Duration::from_millis(50)..=Duration::from_millis(250);
pub const DEFAULT_CONCERT_ID: u64 = 1;

/// Admits one purchase at a time. A buyer finding the gate taken retries a
/// bounded number of times, sleeping a random delay in between, and is
/// turned away with a 429 once the tries run out.
pub struct TicketGate {
    lock: Mutex<()>,
    tries: u32,
    retry_delay: RangeInclusive<Duration>,
    concert_id: u64,
    remaining: AtomicU64,
    next_ticket_id: AtomicU64,
    hold: Duration,
}

impl TicketGate {
    pub fn new(capacity: u64, hold: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            tries: DEFAULT_GATE_TRIES,
            retry_delay: DEFAULT_GATE_RETRY_DELAY,
            concert_id: DEFAULT_CONCERT_ID,
            remaining: AtomicU64::new(capacity),
            next_ticket_id: AtomicU64::new(1),
            hold,
        }
    }

    pub fn with_retry(mut self, tries: u32, retry_delay: RangeInclusive<Duration>) -> Self {
        self.tries = tries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_concert(mut self, concert_id: u64) -> Self {
        self.concert_id = concert_id;
        self
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> Option<MutexGuard<'_, ()>> {
        for attempt in 1..=self.tries {
            if let Ok(granted) = self.lock.try_lock() {
                return Some(granted);
            }
            if attempt < self.tries {
                debug!("gate busy, attempt {} of {}", attempt, self.tries);
                tokio::time::sleep(self.next_retry_delay()).await;
            }
        }
        None
    }

    fn next_retry_delay(&self) -> Duration {
        let (min, max) = (*self.retry_delay.start(), *self.retry_delay.end());
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }

    fn reserve(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok()
    }

    fn issue(&self, request: &BuyTicketRequest) -> Ticket {
        let id = self.next_ticket_id.fetch_add(1, Ordering::SeqCst);
        let serial_number = format!("{:016X}", rand::random::<u64>());
        Ticket::issue(id, serial_number, request)
    }
}

#[derive(Debug)]
enum ErrorResponse {
    BadRequest,
    TooManyRequests,
    UnprocessableEntity,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "failed to buy a ticket."),
            Self::TooManyRequests => write!(f, "too many request. try again later."),
            Self::UnprocessableEntity => write!(f, "failed to process data"),
        }
    }
}

impl ResponseError for ErrorResponse {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(Reply::new(status.as_u16(), &self.to_string()))
    }
}

// Used for health checks
async fn status() -> web::Json<()> {
    web::Json(())
}

async fn buy_ticket(
    gate: web::Data<TicketGate>,
    body: web::Bytes,
) -> Result<HttpResponse, ErrorResponse> {
    let _granted = gate.acquire().await.ok_or_else(|| {
        debug!("gate still busy after {} tries, turning request away", gate.tries);
        ErrorResponse::TooManyRequests
    })?;
    debug!("gate granted");

    let request: BuyTicketRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("rejecting purchase: {}", e);
        ErrorResponse::UnprocessableEntity
    })?;

    if request.concert_id != gate.concert_id {
        warn!("no concert with id {}", request.concert_id);
        return Err(ErrorResponse::BadRequest);
    }

    // Stands in for the purchase transaction.
    tokio::time::sleep(gate.hold).await;

    if !gate.reserve() {
        return Ok(HttpResponse::Ok().json(Reply::new(
            StatusCode::OK.as_u16(),
            "failed to buy a ticket. limit reached :(",
        )));
    }

    let ticket = gate.issue(&request);
    info!("ticket created: {:?}", ticket);
    Ok(HttpResponse::Created().json(Reply::with_ticket(
        StatusCode::CREATED.as_u16(),
        "booking succeeded.",
        ticket,
    )))
}

pub async fn run_stub_server(address: &str, gate: Arc<TicketGate>) -> std::io::Result<()> {
    let data = web::Data::from(gate);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/status", web::get().to(status))
            .route("/ticket", web::post().to(buy_ticket))
            .route("/ticket/", web::post().to(buy_ticket))
    })
    .bind(address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    fn purchase() -> BuyTicketRequest {
        BuyTicketRequest {
            concert_id: 1,
            ticket_category: 1,
        }
    }

    #[actix_rt::test]
    async fn test_status() {
        let app = test::init_service(App::new().route("/status", web::get().to(status))).await;

        let req = test::TestRequest::with_uri("/status").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_buy_ticket() {
        let data = web::Data::new(TicketGate::new(2, Duration::ZERO));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket/", web::post().to(buy_ticket)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let reply: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(reply["code"], 201);
        assert_eq!(reply["message"], "booking succeeded.");

        let ticket = reply["data"].as_object().unwrap();
        let mut keys: Vec<&str> = ticket.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["concert_id", "id", "serial_number", "ticket_category"]
        );
        assert_eq!(ticket["id"], 1);
        assert_eq!(ticket["concert_id"], 1);
        assert_eq!(ticket["ticket_category"], 1);
        assert!(!ticket["serial_number"].as_str().unwrap().is_empty());
        assert_eq!(data.remaining(), 1);
    }

    #[actix_rt::test]
    async fn test_buy_ticket_limit_reached() {
        let data = web::Data::new(TicketGate::new(1, Duration::ZERO));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket", web::post().to(buy_ticket)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/ticket")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        // Capacity is exhausted now
        let req = test::TestRequest::post()
            .uri("/ticket")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let reply: Reply = test::read_body_json(resp).await;
        assert_eq!(reply.message, "failed to buy a ticket. limit reached :(");
        assert_eq!(reply.data, None);
        assert_eq!(data.remaining(), 0);
    }

    #[actix_rt::test]
    async fn test_buy_ticket_while_gate_is_held() {
        let data = web::Data::new(
            TicketGate::new(10, Duration::ZERO)
                .with_retry(3, Duration::from_millis(1)..=Duration::from_millis(2)),
        );
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket/", web::post().to(buy_ticket)),
        )
        .await;

        let held = data.lock.try_lock().unwrap();

        let req = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let reply: Reply = test::read_body_json(resp).await;
        assert_eq!(reply.code, 429);
        assert_eq!(reply.message, "too many request. try again later.");
        assert_eq!(data.remaining(), 10);

        drop(held);

        let req = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[actix_rt::test]
    async fn test_buy_ticket_malformed_body() {
        let data = web::Data::new(TicketGate::new(10, Duration::ZERO));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket/", web::post().to(buy_ticket)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/ticket/")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"concert_id":"one"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(data.remaining(), 10);

        // The gate is released after a rejection
        let req = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[actix_rt::test]
    async fn test_buyer_waits_for_a_short_purchase() {
        let data = web::Data::new(TicketGate::new(10, Duration::from_millis(100)));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket/", web::post().to(buy_ticket)),
        )
        .await;

        let first = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let second = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let (first, second) = tokio::join!(
            test::call_service(&app, first),
            test::call_service(&app, second)
        );

        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(second.status(), StatusCode::CREATED);
        assert_eq!(data.remaining(), 8);
    }

    #[actix_rt::test]
    async fn test_buy_ticket_unknown_concert() {
        let data = web::Data::new(TicketGate::new(10, Duration::ZERO).with_concert(7));
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/ticket/", web::post().to(buy_ticket)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/ticket/")
            .set_json(purchase())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let reply: Reply = test::read_body_json(resp).await;
        assert_eq!(reply.code, 400);
        assert_eq!(reply.message, "failed to buy a ticket.");
        assert_eq!(data.remaining(), 10);
    }

    #[::core::prelude::v1::test]
    fn retry_delay_stays_within_bounds() {
        let gate = TicketGate::new(1, Duration::ZERO);
        for _ in 0..100 {
            let delay = gate.next_retry_delay();
            assert!(DEFAULT_GATE_RETRY_DELAY.contains(&delay));
        }

        let fixed = TicketGate::new(1, Duration::ZERO)
            .with_retry(0, Duration::from_millis(5)..=Duration::from_millis(5));
        assert_eq!(fixed.tries, 1);
        assert_eq!(fixed.next_retry_delay(), Duration::from_millis(5));
    }
}
