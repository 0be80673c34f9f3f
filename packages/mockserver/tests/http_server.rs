// packages/mockserver/tests/http_server.rs
//! End-to-end tests of the HTTP and HTTPS servers over real sockets

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use sentra_lab_mockserver::testing::HttpTestServer;
use sentra_lab_mockserver::{
    http_server, https_server, start_server, start_tls_server, Directive, Hook, HttpServer,
};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn client() -> Client {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn servers() -> Vec<HttpServer> {
    vec![
        start_server(None, None).unwrap(),
        start_tls_server(None, None, None, None).unwrap(),
    ]
}

/// Poll until `condition` holds; cleanup and `after_request` run after the
/// client has already received the response
fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_history_in_request_order() {
    for server in servers() {
        let client = client();
        client.get(server.url("/first")).send().unwrap();
        client.post(server.url("/second")).body("data").send().unwrap();

        let history = server.history();
        assert_eq!(history.len(), 2);

        assert_eq!(history[0]["command"], "GET");
        assert_eq!(history[0]["path"], "/first");
        assert!(!history[0].contains_key("body"));

        assert_eq!(history[1]["command"], "POST");
        assert_eq!(history[1]["path"], "/second");
        assert_eq!(history[1]["body"], b"data");
        assert_eq!(history[1]["scheme"], server.scheme());
    }
}

#[test]
fn test_last_history_entry_matches_data() {
    let server = start_server(None, None).unwrap();
    client().get(server.url("/a?x=1")).send().unwrap();

    let data = server.data();
    let last = server.history().pop().unwrap();
    for key in ["command", "path", "request_version", "requestline", "headers"] {
        assert_eq!(data.get(key), last.get(key), "mismatch on {}", key);
    }
    assert_eq!(last["path"], "/a?x=1");
    assert_eq!(last["request_version"], "HTTP/1.1");
    assert_eq!(last["requestline"], "GET /a?x=1 HTTP/1.1");
}

#[test]
fn test_every_method_is_captured() {
    let server = start_server(None, None).unwrap();
    let client = client();
    let url = server.url("/method");

    client.put(&url).body("put").send().unwrap();
    client.patch(&url).body("patch").send().unwrap();
    client.delete(&url).send().unwrap();
    client.head(&url).send().unwrap();
    client
        .request(reqwest::Method::OPTIONS, &url)
        .send()
        .unwrap();

    let commands: Vec<String> = server
        .history()
        .iter()
        .map(|entry| entry["command"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(commands, vec!["PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]);
    assert_eq!(server.history()[1]["body"], b"patch");
}

#[test]
fn test_request_headers_and_addresses() {
    let server = start_server(None, None).unwrap();
    client()
        .get(server.url("/headers"))
        .header("X-Test", "one")
        .send()
        .unwrap();

    let entry = &server.history()[0];
    assert_eq!(entry.header("x-test"), Some("one"));
    assert_eq!(
        entry["server_address"].as_addr(),
        Some(server.local_addr())
    );
    assert!(entry["client_address"].as_addr().unwrap().ip().is_loopback());
}

#[test]
fn test_scripted_response() {
    for server in servers() {
        server.set("response_status", 201);
        server.set(
            "response_headers",
            vec![
                ("X-One", "1"),
                ("Set-Cookie", "a=1"),
                ("Set-Cookie", "b=2"),
            ],
        );
        server.set("response_content", "hello");

        let response = client().get(server.url("/")).send().unwrap();

        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.headers()["x-one"], "1");
        let cookies: Vec<_> = response
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(response.text().unwrap(), "hello");
    }
}

#[test]
fn test_binary_content() {
    let server = start_server(None, None).unwrap();
    server.set("response_content", vec![0u8, 159, 146, 150]);

    let body = client().get(server.url("/")).send().unwrap().bytes().unwrap();
    assert_eq!(&body[..], &[0u8, 159, 146, 150]);
}

#[test]
fn test_error_statuses() {
    let server = start_server(None, None).unwrap();
    let client = client();

    for code in [404, 500, 503] {
        server.set("response_status", code);
        let response = client.get(server.url("/")).send().unwrap();
        assert_eq!(response.status().as_u16(), code as u16);
    }
}

#[test]
fn test_deferred_value_resolved_once() {
    let server = start_server(None, None).unwrap();
    let calls = Arc::new(AtomicI64::new(0));

    let counter = Arc::clone(&calls);
    server.set_deferred("response_status", move || {
        200 + counter.fetch_add(1, Ordering::SeqCst) + 1
    });

    let response = client().get(server.url("/")).send().unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.history()[0]["response_status"], 201);
    assert_eq!(server.data()["response_status"], 201);
}

#[test]
fn test_timeout_produces_client_timeout() {
    let server = start_server(None, None).unwrap();
    server.set("response_timeout", 2);

    let slow_client = Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let err = slow_client.get(server.url("/slow")).send().unwrap_err();
    assert!(err.is_timeout());

    // Recorded even though the client gave up
    wait_for(|| server.history().len() == 1);
    assert_eq!(server.history()[0]["path"], "/slow");

    server.remove("response_timeout");
    client().get(server.url("/fast")).send().unwrap();
    assert_eq!(server.history().len(), 2);
}

#[test]
fn test_response_clear_removes_directives_only() {
    for server in servers() {
        server.set("response_status", 302);
        server.set("response_headers", vec![("Location", "/elsewhere")]);
        server.set("response_clear", true);
        server.set("marker", "kept");

        let response = client().get(server.url("/redirect")).send().unwrap();
        assert_eq!(response.status().as_u16(), 302);
        assert_eq!(response.headers()["location"], "/elsewhere");

        wait_for(|| !server.data().contains_key("response_status"));
        let data = server.data();
        assert!(data.keys().all(|key| !key.starts_with("response_")));
        assert_eq!(data["path"], "/redirect");
        assert_eq!(data["marker"], "kept");
        assert_eq!(server.history().len(), 1);

        let response = client().get(server.url("/elsewhere")).send().unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}

#[test]
fn test_response_reset_clears_everything() {
    let server = start_server(None, None).unwrap();
    server.set("response_status", 202);
    server.set("response_reset", true);
    server
        .register_hook("before_request", Hook::no_args(|| {}))
        .unwrap();

    let response = client().get(server.url("/once")).send().unwrap();
    assert_eq!(response.status().as_u16(), 202);

    wait_for(|| server.history().is_empty());
    assert!(server.data().is_empty());
    assert!(server.hooks().is_empty());
}

#[test]
fn test_reset_is_idempotent() {
    let server = start_server(None, None).unwrap();
    client().get(server.url("/")).send().unwrap();

    server.reset();
    assert!(server.data().is_empty());
    assert!(server.history().is_empty());

    server.reset();
    assert!(server.data().is_empty());
    assert!(server.history().is_empty());
}

#[test]
fn test_hooks_run_in_lifecycle_order() {
    let server = start_server(None, None).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&calls);
    server
        .register_hook(
            "before_request",
            Hook::no_args(move || log.lock().push("before_request".to_string())),
        )
        .unwrap();
    let log = Arc::clone(&calls);
    server
        .register_hook(
            "before_response",
            Hook::request(move |snapshot| {
                log.lock().push(format!("before_response {}", snapshot["path"].as_str().unwrap()))
            }),
        )
        .unwrap();
    let log = Arc::clone(&calls);
    server
        .register_hook(
            "after_response",
            Hook::exchange(move |_, response| {
                log.lock().push(format!("after_response {}", response.status()))
            }),
        )
        .unwrap();
    let log = Arc::clone(&calls);
    server
        .register_hook(
            "after_request",
            Hook::exchange(move |_, _| log.lock().push("after_request".to_string())),
        )
        .unwrap();

    client().get(server.url("/hooked")).send().unwrap();

    wait_for(|| calls.lock().len() == 4);
    assert_eq!(
        *calls.lock(),
        vec![
            "before_request",
            "before_response /hooked",
            "after_response 200",
            "after_request"
        ]
    );
}

#[test]
fn test_after_response_runs_before_client_sees_response() {
    let server = start_server(None, None).unwrap();
    let seen = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&seen);
    server
        .register_hook(
            "after_response",
            Hook::exchange(move |_, _| flag.store(true, Ordering::SeqCst)),
        )
        .unwrap();

    client().get(server.url("/")).send().unwrap();
    assert!(seen.load(Ordering::SeqCst));
}

#[test]
fn test_hook_can_change_response() {
    let server = start_server(None, None).unwrap();
    let state = server.state();

    server
        .register_hook(
            "before_response",
            Hook::request(move |_| state.set("response_status", Directive::literal(418))),
        )
        .unwrap();

    let response = client().get(server.url("/")).send().unwrap();
    assert_eq!(response.status().as_u16(), 418);
}

#[test]
fn test_concurrent_clients() {
    let server = Arc::new(start_server(None, None).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let client = client();
                for i in 0..5 {
                    let response = client
                        .post(server.url(&format!("/w{}/{}", worker, i)))
                        .body(format!("{}-{}", worker, i))
                        .send()
                        .unwrap();
                    assert_eq!(response.status().as_u16(), 200);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = server.history();
    assert_eq!(history.len(), 40);
    for entry in &history {
        let path = entry["path"].as_str().unwrap();
        let body = String::from_utf8(entry["body"].as_bytes().unwrap().to_vec()).unwrap();
        let parts: Vec<_> = path.trim_start_matches("/w").split('/').collect();
        assert_eq!(body, format!("{}-{}", parts[0], parts[1]));
    }
}

#[test]
fn test_missing_content_length_fails_only_that_connection() {
    let server = start_server(None, None).unwrap();

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(b"POST /broken HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap();
    let mut reply = Vec::new();
    let _ = stream.read_to_end(&mut reply);
    assert!(!reply.starts_with(b"HTTP/1.1 200"));
    assert!(server.history().is_empty());

    let response = client().get(server.url("/after")).send().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(server.history().len(), 1);
}

#[test]
fn test_invalid_directive_fails_only_that_connection() {
    let server = start_server(None, None).unwrap();
    server.set("response_status", "not a number");

    assert!(client().get(server.url("/bad")).send().is_err());

    server.set("response_status", 204);
    let response = client().get(server.url("/good")).send().unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[test]
fn test_scoped_helpers_release_the_socket() {
    let addr = http_server(|server| {
        client().get(server.url("/")).send().unwrap();
        assert_eq!(server.history().len(), 1);
        server.local_addr()
    })
    .unwrap();
    assert!(TcpStream::connect(addr).is_err());

    let addr = https_server(|server| {
        assert!(server.url("/").starts_with("https://"));
        let response = client().get(server.url("/secure")).send().unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(server.history()[0]["scheme"], "https");
        server.local_addr()
    })
    .unwrap();
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_fixture_reused_across_cases() {
    let server = HttpTestServer::https().unwrap();

    for case in 0..3 {
        server.setup();
        server.set("response_content", format!("case {}", case));

        let body = client().get(server.default_url()).send().unwrap().text().unwrap();
        assert_eq!(body, format!("case {}", case));
        assert_eq!(server.history().len(), 1);
        assert_eq!(server.history()[0]["path"], "/testing/this");
    }
}

#[test]
fn test_stop_and_is_running() {
    let server = start_server(None, None).unwrap();
    assert!(server.is_running());

    server.stop();
    assert!(!server.is_running());
    assert!(client().get(server.url("/")).send().is_err());

    // Already stopped
    server.stop();
}
