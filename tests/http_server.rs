//! End-to-end scenarios over the public API (SPEC_FULL.md §8 S2/S3 plus
//! mux boundary behaviours): a real `Server` bound to an OS-assigned
//! port on `127.0.0.1`, driven by the real `HttpClient`.

use coronet::{Handled, Handler, HttpMux, Method, Request, Response, Server, StatusCode};
use tokio::net::TcpListener as TokioTcpListener;

struct Root;

impl Handler for Root {
    async fn handle(&self, _: &mut (), _req: &Request, resp: &mut Response) -> Handled {
        resp.status(StatusCode::Ok)
            .header("content-type", "text/jsonp")
            .body("hello world")
    }
}

struct Chunked;

impl Handler for Chunked {
    async fn handle(&self, _: &mut (), _req: &Request, resp: &mut Response) -> Handled {
        resp.status(StatusCode::Ok)
            .write_chunk("abc")
            .write_chunk("defgh")
            .write_chunk("ij")
            .final_request()
    }
}

async fn spawn_server<H: Handler>(handler: H) -> std::net::SocketAddr {
    let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Server::builder().listener(listener).handler(handler).build();

    tokio::spawn(server.launch());
    addr
}

/// S2 - HTTP GET: mux handles `/` with a fixed body, client receives it
/// verbatim with status 200.
#[tokio::test]
async fn s2_http_get_hello_world() {
    let addr = spawn_server(Root).await;

    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let response = client.get("/").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.header(b"content-type"), Some(&b"text/jsonp"[..]));
    assert_eq!(response.body(), b"hello world");
}

/// S3 - HTTP chunked response: handler writes three chunks without a
/// declared Content-Length; client reassembles the full body.
#[tokio::test]
async fn s3_http_chunked_response() {
    let addr = spawn_server(Chunked).await;

    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let response = client.get("/").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), b"abcdefghij");
}

/// Unknown routes fall through to the built-in 404 handler (§4.10/§7).
#[tokio::test]
async fn unknown_route_is_404() {
    let addr = spawn_server(Root).await;

    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let response = client.get("/does-not-exist").await.unwrap();
    assert_eq!(response.status(), 404);
}

/// Two keep-alive requests over the same connection both succeed -
/// `HttpClient` reuses its transport and the server's per-connection
/// loop serves a second request on the same stream (§4.11 `DoCycle`).
#[tokio::test]
async fn keep_alive_serves_multiple_requests() {
    let addr = spawn_server(Root).await;

    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let first = client.get("/").await.unwrap();
    assert_eq!(first.status(), 200);
    assert!(first.keep_alive());

    let second = client.get("/").await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.body(), b"hello world");
}

/// POST with a JSON body round-trips through an echo handler.
#[tokio::test]
async fn post_echoes_body() {
    struct Echo;
    impl Handler for Echo {
        async fn handle(&self, _: &mut (), req: &Request, resp: &mut Response) -> Handled {
            assert_eq!(req.method(), Method::Post);
            let body = req.body().unwrap_or(b"").to_vec();
            resp.status(StatusCode::Ok).body(body)
        }
    }

    let addr = spawn_server(Echo).await;
    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let response = client.post("/", b"{\"n\":1}").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), b"{\"n\":1}");
}

/// §4.10: the mux picks the *longest* matching pattern, and a pattern
/// registered with a trailing slash installs an implicit 302 redirect at
/// the same path without the slash.
#[tokio::test]
async fn mux_longest_prefix_and_trailing_slash_redirect() {
    struct Api;
    impl Handler for Api {
        async fn handle(&self, _: &mut (), _req: &Request, resp: &mut Response) -> Handled {
            resp.status(StatusCode::Ok).body("api-root")
        }
    }
    struct ApiUsers;
    impl Handler for ApiUsers {
        async fn handle(&self, _: &mut (), _req: &Request, resp: &mut Response) -> Handled {
            resp.status(StatusCode::Ok).body("api-users")
        }
    }

    let mut mux = HttpMux::<()>::new();
    mux.handle("/api/", Api).unwrap();
    mux.handle("/api/users/", ApiUsers).unwrap();

    let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::builder().listener(listener).handler(mux).build();
    tokio::spawn(server.launch());

    let client_limits = coronet::limits::ClientLimits::default();
    let mut client =
        coronet::HttpClient::initialize(false, addr.ip().to_string(), addr.port(), None, &client_limits);

    let longest = client.get("/api/users/42").await.unwrap();
    assert_eq!(longest.status(), 200);
    assert_eq!(longest.body(), b"api-users");

    let shortest = client.get("/api/other").await.unwrap();
    assert_eq!(shortest.status(), 200);
    assert_eq!(shortest.body(), b"api-root");

    let redirect = client.get("/api/users").await.unwrap();
    assert_eq!(redirect.status(), 302);
    assert_eq!(redirect.header(b"location"), Some(&b"/api/users/"[..]));
}
