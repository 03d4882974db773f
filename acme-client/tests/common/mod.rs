//! A tiny in-process ACME server used by the integration tests.
//!
//! It implements just enough of RFC 8555 to drive the client through registration, ordering,
//! dns-01/http-01 validation, finalization and certificate download, and records counters the
//! tests assert on. JWS signatures are not verified; the protected header and payload are
//! decoded and inspected structurally.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};

use acme_core::b64u_decode;

pub const TEST_PEM_CHAIN: &str = "-----BEGIN CERTIFICATE-----\nMIIBtest\n-----END CERTIFICATE-----\n";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OrderPhase {
    Pending,
    Ready,
    Processing,
    Valid,
}

pub struct OrderState {
    pub identifiers: Vec<String>,
    pub phase: OrderPhase,
    pub challenge_submitted: bool,
    /// Polls observed while `Processing`; the order turns `Valid` after the first.
    pub processing_polls: u32,
}

#[derive(Default)]
pub struct Counters {
    pub directory_gets: u64,
    pub head_new_nonce: u64,
    pub new_account_posts: u64,
    pub new_order_posts: u64,
}

pub struct MockCa {
    pub counters: Mutex<Counters>,
    pub orders: Mutex<HashMap<u64, OrderState>>,
    next_order: AtomicU64,
    nonce_counter: AtomicU64,
    /// When set, the next `newOrder` POST is rejected with `badNonce`.
    pub bad_nonce_once: Mutex<bool>,
    /// When set, the next `newOrder` POST is answered with 429 and this Retry-After.
    pub rate_limit_once: Mutex<Option<u64>>,
    base: Mutex<String>,
}

impl MockCa {
    fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            orders: Mutex::new(HashMap::new()),
            next_order: AtomicU64::new(1),
            nonce_counter: AtomicU64::new(0),
            bad_nonce_once: Mutex::new(false),
            rate_limit_once: Mutex::new(None),
            base: Mutex::new(String::new()),
        }
    }

    pub fn base(&self) -> String {
        self.base.lock().unwrap().clone()
    }

    pub fn directory_url(&self) -> String {
        format!("{}/directory", self.base())
    }

    fn fresh_nonce(&self) -> String {
        format!("nonce-{}", self.nonce_counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// Decoded flattened JWS as the mock cares about it.
pub struct DecodedJws {
    pub protected: serde_json::Value,
    pub payload: serde_json::Value,
}

fn decode_jws(body: &[u8]) -> DecodedJws {
    let jws: serde_json::Value = serde_json::from_slice(body).expect("request body is not json");
    let protected = b64u_decode(jws["protected"].as_str().expect("missing protected"))
        .expect("protected is not base64url");
    let protected: serde_json::Value = serde_json::from_slice(&protected).unwrap();

    let payload_raw = jws["payload"].as_str().expect("missing payload");
    let payload = if payload_raw.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&b64u_decode(payload_raw).unwrap()).unwrap()
    };

    DecodedJws { protected, payload }
}

/// Spawn the server, returning the shared state. The listener stays alive for the whole test.
pub async fn spawn() -> Arc<MockCa> {
    let state = Arc::new(MockCa::new());

    let service_state = state.clone();
    let make = make_service_fn(move |_conn| {
        let state = service_state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req)))
        }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(make);
    *state.base.lock().unwrap() = format!("http://{}", server.local_addr());
    tokio::spawn(server);

    state
}

async fn handle(state: Arc<MockCa>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = hyper::body::to_bytes(req.into_body()).await.unwrap();

    let nonce = state.fresh_nonce();
    let base = state.base();

    let respond = |status: u16, content_type: &str, body: Vec<u8>| {
        let mut builder = Response::builder()
            .status(status)
            .header("Replay-Nonce", nonce.as_str());
        if !content_type.is_empty() {
            builder = builder.header("Content-Type", content_type);
        }
        builder.body(Body::from(body)).unwrap()
    };

    let json_response = |status: u16, value: serde_json::Value| {
        respond(status, "application/json", value.to_string().into_bytes())
    };

    let problem = |status: u16, ty: &str, detail: &str, retry_after: Option<u64>| {
        let body = serde_json::json!({
            "type": format!("urn:ietf:params:acme:error:{}", ty),
            "detail": detail,
        });
        let mut response = respond(
            status,
            "application/problem+json",
            body.to_string().into_bytes(),
        );
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", secs.to_string().parse().unwrap());
        }
        response
    };

    let response = match (method, path.as_str()) {
        (Method::GET, "/directory") => {
            state.counters.lock().unwrap().directory_gets += 1;
            json_response(
                200,
                serde_json::json!({
                    "newNonce": format!("{}/acme/new-nonce", base),
                    "newAccount": format!("{}/acme/new-acct", base),
                    "newOrder": format!("{}/acme/new-order", base),
                    "revokeCert": format!("{}/acme/revoke-cert", base),
                    "keyChange": format!("{}/acme/key-change", base),
                    "meta": {
                        "termsOfService": format!("{}/terms.pdf", base)
                    }
                }),
            )
        }

        (Method::HEAD, "/acme/new-nonce") => {
            state.counters.lock().unwrap().head_new_nonce += 1;
            respond(200, "", Vec::new())
        }

        (Method::POST, "/acme/new-acct") => {
            state.counters.lock().unwrap().new_account_posts += 1;
            let jws = decode_jws(&body);
            assert!(
                jws.protected.get("jwk").is_some(),
                "newAccount must embed the jwk"
            );
            assert!(
                jws.protected.get("kid").is_none(),
                "newAccount must not use a kid"
            );
            assert!(jws.protected.get("nonce").is_some());
            assert_eq!(
                jws.protected["url"],
                format!("{}/acme/new-acct", base),
                "protected url must match the request target"
            );

            let mut response = json_response(
                201,
                serde_json::json!({ "status": "valid", "contact": [] }),
            );
            response.headers_mut().insert(
                "Location",
                format!("{}/acme/acct/1", base).parse().unwrap(),
            );
            response
        }

        (Method::POST, "/acme/new-order") => {
            state.counters.lock().unwrap().new_order_posts += 1;

            if std::mem::take(&mut *state.bad_nonce_once.lock().unwrap()) {
                problem(400, "badNonce", "nonce reused", None)
            } else if let Some(secs) = state.rate_limit_once.lock().unwrap().take() {
                problem(429, "rateLimited", "slow down", Some(secs))
            } else {
                let jws = decode_jws(&body);
                assert!(jws.protected.get("kid").is_some(), "orders must use the kid");
                let identifiers: Vec<String> = jws.payload["identifiers"]
                    .as_array()
                    .expect("identifiers missing")
                    .iter()
                    .map(|id| id["value"].as_str().unwrap().to_string())
                    .collect();

                let id = state.next_order.fetch_add(1, Ordering::SeqCst);
                state.orders.lock().unwrap().insert(
                    id,
                    OrderState {
                        identifiers: identifiers.clone(),
                        phase: OrderPhase::Pending,
                        challenge_submitted: false,
                        processing_polls: 0,
                    },
                );

                let mut response = json_response(201, order_body(&state, &base, id));
                response.headers_mut().insert(
                    "Location",
                    format!("{}/acme/order/{}", base, id).parse().unwrap(),
                );
                response
            }
        }

        (Method::POST, path) if path.starts_with("/acme/order/") => {
            let rest = path.trim_start_matches("/acme/order/");
            if let Some(id) = rest.strip_suffix("/finalize") {
                let id: u64 = id.parse().unwrap();
                let mut orders = state.orders.lock().unwrap();
                let order = orders.get_mut(&id).unwrap();
                if order.phase != OrderPhase::Ready {
                    drop(orders);
                    problem(403, "orderNotReady", "order is not ready", None)
                } else {
                    let jws = decode_jws(&body);
                    let csr = jws.payload["csr"].as_str().expect("csr missing");
                    assert!(b64u_decode(csr).is_ok(), "csr must be base64url");
                    order.phase = OrderPhase::Processing;
                    order.processing_polls = 0;
                    let body = order_body_locked(order, &base, id);
                    drop(orders);
                    json_response(200, body)
                }
            } else {
                // POST-as-GET poll of the order
                let id: u64 = rest.parse().unwrap();
                let mut orders = state.orders.lock().unwrap();
                let order = orders.get_mut(&id).unwrap();
                if order.phase == OrderPhase::Processing {
                    if order.processing_polls > 0 {
                        order.phase = OrderPhase::Valid;
                    }
                    order.processing_polls += 1;
                }
                let body = order_body_locked(order, &base, id);
                drop(orders);
                json_response(200, body)
            }
        }

        (Method::POST, path) if path.starts_with("/acme/authz/") => {
            let id: u64 = path.trim_start_matches("/acme/authz/").parse().unwrap();
            let orders = state.orders.lock().unwrap();
            let order = orders.get(&id).unwrap();
            let status = match order.phase {
                OrderPhase::Pending if order.challenge_submitted => "valid",
                OrderPhase::Pending => "pending",
                _ => "valid",
            };
            let challenge_status = if order.challenge_submitted { "valid" } else { "pending" };
            let identifier = order.identifiers[0].clone();
            drop(orders);

            let wildcard = identifier.starts_with("*.");
            let bare = identifier.trim_start_matches("*.").to_string();

            json_response(
                200,
                serde_json::json!({
                    "identifier": { "type": "dns", "value": bare },
                    "status": status,
                    "wildcard": wildcard,
                    "challenges": [
                        {
                            "type": "dns-01",
                            "status": challenge_status,
                            "url": format!("{}/acme/chall/{}/dns", base, id),
                            "token": "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA"
                        },
                        {
                            "type": "http-01",
                            "status": challenge_status,
                            "url": format!("{}/acme/chall/{}/http", base, id),
                            "token": "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA"
                        }
                    ]
                }),
            )
        }

        (Method::POST, path) if path.starts_with("/acme/chall/") => {
            let id: u64 = path
                .trim_start_matches("/acme/chall/")
                .split('/')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            let jws = decode_jws(&body);
            assert_eq!(
                jws.payload,
                serde_json::json!({}),
                "challenge validation payload must be the empty object"
            );
            let mut orders = state.orders.lock().unwrap();
            let order = orders.get_mut(&id).unwrap();
            order.challenge_submitted = true;
            order.phase = OrderPhase::Ready;
            drop(orders);
            json_response(
                200,
                serde_json::json!({
                    "type": "dns-01",
                    "status": "processing",
                    "url": format!("{}{}", base, path),
                    "token": "evaGxfADs6pSRb2LAv9IZf17Dt3juxGJ-PCt92wr-oA"
                }),
            )
        }

        (Method::POST, path) if path.starts_with("/acme/cert/") => respond(
            200,
            "application/pem-certificate-chain",
            TEST_PEM_CHAIN.as_bytes().to_vec(),
        ),

        (Method::POST, "/acme/revoke-cert") => {
            let jws = decode_jws(&body);
            assert!(jws.payload.get("certificate").is_some());
            respond(200, "", Vec::new())
        }

        (method, path) => {
            eprintln!("mock CA: unhandled {} {}", method, path);
            problem(404, "malformed", "unknown resource", None)
        }
    };

    Ok(response)
}

fn order_body(state: &MockCa, base: &str, id: u64) -> serde_json::Value {
    let orders = state.orders.lock().unwrap();
    order_body_locked(orders.get(&id).unwrap(), base, id)
}

fn order_body_locked(order: &OrderState, base: &str, id: u64) -> serde_json::Value {
    let status = match order.phase {
        OrderPhase::Pending => "pending",
        OrderPhase::Ready => "ready",
        OrderPhase::Processing => "processing",
        OrderPhase::Valid => "valid",
    };

    let mut body = serde_json::json!({
        "status": status,
        "expires": "2026-12-01T00:00:00Z",
        "identifiers": order
            .identifiers
            .iter()
            .map(|value| serde_json::json!({ "type": "dns", "value": value }))
            .collect::<Vec<_>>(),
        "authorizations": [format!("{}/acme/authz/{}", base, id)],
        "finalize": format!("{}/acme/order/{}/finalize", base, id),
    });

    if order.phase == OrderPhase::Valid {
        body["certificate"] = serde_json::json!(format!("{}/acme/cert/{}", base, id));
    }

    body
}
