//! Integration tests for the IMAP client.
//!
//! Each test drives a `Client` against a scripted server on the other end of
//! an in-memory duplex stream. The transport's TLS upgrade is the identity,
//! so the script keeps speaking plaintext after STARTTLS.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

use quillmail_imap::{
    AuthMechanism, Capability, Client, Config, ConnectionState, Error, Result, TlsState, Transport,
};

/// Transport handing out prepared streams in order and counting upgrades.
struct Scripted {
    streams: Mutex<VecDeque<DuplexStream>>,
    upgrades: Arc<AtomicUsize>,
    fail_upgrade: bool,
}

impl Transport for Scripted {
    type Stream = DuplexStream;

    async fn connect(&self, _config: &Config) -> Result<DuplexStream> {
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::NotConnected)
    }

    async fn upgrade(&self, stream: DuplexStream, _config: &Config) -> Result<DuplexStream> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        if self.fail_upgrade {
            return Err(Error::Io(io::Error::other("handshake failed")));
        }
        Ok(stream)
    }
}

/// Server side of the duplex.
struct Server(BufReader<DuplexStream>);

impl Server {
    async fn send(&mut self, data: &str) {
        self.0.get_mut().write_all(data.as_bytes()).await.unwrap();
    }

    async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        self.0.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Reads one tagged command, checks its text and returns the tag.
    async fn expect(&mut self, command: &str) -> String {
        let line = self.recv_line().await;
        let (tag, rest) = line.split_once(' ').unwrap();
        assert_eq!(rest, command);
        tag.to_string()
    }

    async fn reply_capability(&mut self, caps: &str) {
        let tag = self.expect("CAPABILITY").await;
        self.send(&format!("* CAPABILITY {caps}\r\n{tag} OK CAPABILITY completed\r\n"))
            .await;
    }
}

/// Builds a client on `port` whose transport yields one stream per server.
fn setup_servers(
    port: u16,
    count: usize,
    fail_upgrade: bool,
) -> (Client<Scripted>, Vec<Server>, Arc<AtomicUsize>) {
    let (client_ends, servers): (VecDeque<_>, Vec<_>) = (0..count)
        .map(|_| {
            let (client_end, server_end) = duplex(4096);
            (client_end, Server(BufReader::new(server_end)))
        })
        .unzip();
    let upgrades = Arc::new(AtomicUsize::new(0));
    let transport = Scripted {
        streams: Mutex::new(client_ends),
        upgrades: Arc::clone(&upgrades),
        fail_upgrade,
    };
    let config = Config::builder("imap.example.com").port(port).build();
    (Client::with_transport(config, transport), servers, upgrades)
}

fn setup(fail_upgrade: bool) -> (Client<Scripted>, Server, Arc<AtomicUsize>) {
    let (client, mut servers, upgrades) = setup_servers(143, 1, fail_upgrade);
    (client, servers.remove(0), upgrades)
}

/// Connects `client` through `server`, which advertises `caps`.
async fn greet(client: &Client<Scripted>, server: &mut Server, caps: &str) {
    server.send("* OK IMAP4rev1 server ready\r\n").await;
    let (connected, ()) = tokio::join!(client.connect(), server.reply_capability(caps));
    connected.unwrap();
}

async fn connected_with(
    caps: &str,
    fail_upgrade: bool,
) -> (Client<Scripted>, Server, Arc<AtomicUsize>) {
    let (client, mut server, upgrades) = setup(fail_upgrade);
    greet(&client, &mut server, caps).await;
    (client, server, upgrades)
}

async fn connected(caps: &str) -> (Client<Scripted>, Server) {
    let (client, server, _) = connected_with(caps, false).await;
    (client, server)
}

#[tokio::test]
async fn test_connect_loads_capabilities() {
    let (client, _server) = connected("IMAP4rev1 STARTTLS AUTH=PLAIN").await;

    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
    assert_eq!(client.tls_state(), TlsState::None);
    let caps = client.capabilities();
    assert_eq!(caps.len(), 3);
    assert!(caps.contains(&Capability::Imap4Rev1));
    assert!(caps.contains(&Capability::StartTls));
    assert!(caps.supports_auth("PLAIN"));
}

#[tokio::test]
async fn test_connect_rejects_bad_greeting() {
    let (client, mut server, _) = setup(false);
    server.send("* BYE too many connections\r\n").await;

    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, Error::InvalidResponse(line) if line == "* BYE too many connections"));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_reload_capabilities_replaces_cache() {
    let (client, mut server) = connected("IMAP4rev1 STARTTLS AUTH=PLAIN").await;

    let (first, ()) = tokio::join!(
        client.reload_capabilities(),
        server.reply_capability("IMAP4rev1 IDLE")
    );
    let (second, ()) = tokio::join!(
        client.reload_capabilities(),
        server.reply_capability("IMAP4rev1 IDLE")
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(client.capabilities().to_string(), "IMAP4rev1 IDLE");
    assert!(!client.has_capability(&Capability::StartTls));
}

#[tokio::test]
async fn test_empty_capability_response_fails() {
    let (client, mut server) = connected("IMAP4rev1").await;

    let script = async {
        let tag = server.expect("CAPABILITY").await;
        server.send(&format!("{tag} OK nothing to say\r\n")).await;
    };
    let (result, ()) = tokio::join!(client.reload_capabilities(), script);

    assert!(matches!(result, Err(Error::InvalidCapabilities(lines)) if lines.len() == 1));
    assert!(client.capabilities().is_empty());
}

#[tokio::test]
async fn test_no_and_bad_completions() {
    let (client, mut server) = connected("IMAP4rev1").await;

    let script = async {
        let tag = server.expect("NOOP").await;
        server.send(&format!("{tag} NO server busy\r\n")).await;
        let tag = server.expect("NOOP").await;
        server.send(&format!("{tag} BAD command unknown\r\n")).await;
    };
    let client_side = async { (client.noop().await, client.noop().await) };
    let ((no, bad), ()) = tokio::join!(client_side, script);

    assert!(matches!(no, Err(Error::NoResponse(line)) if line.ends_with("NO server busy")));
    assert!(matches!(bad, Err(Error::BadResponse(_))));
}

#[tokio::test]
async fn test_concurrent_commands_share_untagged_data() {
    let (client, mut server) = connected("IMAP4rev1").await;

    let script = async {
        let first = server.recv_line().await;
        let second = server.recv_line().await;
        let tag_a = first.split_whitespace().next().unwrap().to_string();
        let tag_b = second.split_whitespace().next().unwrap().to_string();
        assert_ne!(tag_a, tag_b);
        // Complete in reverse order; correlation is by tag, not position.
        server
            .send(&format!(
                "* 5 EXISTS\r\n{tag_b} OK done\r\n{tag_a} OK done\r\n"
            ))
            .await;
    };
    let (a, b, ()) = tokio::join!(
        client.send_command("NOOP", None),
        client.send_command("CHECK", None),
        script
    );

    for lines in [a.unwrap(), b.unwrap()] {
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "* 5 EXISTS");
        assert!(lines[1].ends_with("OK done"));
    }
}

#[tokio::test]
async fn test_login_runs_starttls_then_refuses_logindisabled() {
    let (client, mut server, upgrades) =
        connected_with("IMAP4rev1 STARTTLS AUTH=PLAIN", false).await;

    let script = async {
        let tag = server.expect("STARTTLS").await;
        server.send(&format!("{tag} OK begin TLS negotiation\r\n")).await;
        server
            .reply_capability("IMAP4rev1 LOGINDISABLED AUTH=PLAIN")
            .await;
    };
    let (result, ()) = tokio::join!(client.login("user", "pass"), script);

    assert!(matches!(result, Err(Error::InvalidRequest(_))));
    assert_eq!(upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(client.tls_state(), TlsState::Established);
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
    assert!(client.has_capability(&Capability::LoginDisabled));
}

#[tokio::test]
async fn test_login_uses_capabilities_from_response() {
    let (client, mut server) = connected("IMAP4rev1 STARTTLS").await;

    let script = async {
        let tag = server.expect("STARTTLS").await;
        server.send(&format!("{tag} OK begin TLS\r\n")).await;
        server.reply_capability("IMAP4rev1 AUTH=PLAIN").await;
        let tag = server.expect(r#"LOGIN "user" "pa\"ss""#).await;
        server
            .send(&format!(
                "* CAPABILITY IMAP4rev1 IDLE NAMESPACE\r\n{tag} OK LOGIN completed\r\n"
            ))
            .await;
    };
    let (result, ()) = tokio::join!(client.login("user", "pa\"ss"), script);

    result.unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticated);
    assert_eq!(client.capabilities().to_string(), "IMAP4rev1 IDLE NAMESPACE");
}

#[tokio::test]
async fn test_authenticate_prefers_plain_over_login() {
    let (client, mut server) = connected("IMAP4rev1 AUTH=LOGIN AUTH=PLAIN").await;

    let script = async {
        let tag = server.expect("AUTHENTICATE PLAIN AHVzZXIAcGFzcw==").await;
        server.send(&format!("{tag} OK authenticated\r\n")).await;
        // No capability line in the response, so the next command re-queries.
        server.reply_capability("IMAP4rev1 IDLE").await;
    };
    let (result, ()) = tokio::join!(client.authenticate("user", "pass", None), script);

    result.unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticated);
    assert!(client.has_capability(&Capability::Idle));
}

#[tokio::test]
async fn test_authenticate_login_exchange() {
    let (client, mut server) = connected("IMAP4rev1 AUTH=LOGIN").await;

    let script = async {
        let tag = server.expect("AUTHENTICATE LOGIN").await;
        server.send("+ VXNlcm5hbWU6\r\n").await;
        assert_eq!(server.recv_line().await, "dXNlcg==");
        server.send("+ UGFzc3dvcmQ6\r\n").await;
        assert_eq!(server.recv_line().await, "cGFzcw==");
        server
            .send(&format!("* CAPABILITY IMAP4rev1 IDLE\r\n{tag} OK done\r\n"))
            .await;
    };
    let (result, ()) = tokio::join!(
        client.authenticate("user", "pass", Some(AuthMechanism::Login)),
        script
    );

    result.unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_authenticate_login_rejects_unexpected_prompt() {
    let (client, mut server) = connected("IMAP4rev1 AUTH=LOGIN").await;

    let script = async {
        let tag = server.expect("AUTHENTICATE LOGIN").await;
        // base64("Token:")
        server.send("+ VG9rZW46\r\n").await;
        assert_eq!(server.recv_line().await, "*");
        server
            .send(&format!("{tag} BAD authentication cancelled\r\n"))
            .await;
        let tag = server.expect("NOOP").await;
        server.send(&format!("{tag} OK\r\n")).await;
    };
    let client_side = async {
        let auth = client
            .authenticate("user", "pass", Some(AuthMechanism::Login))
            .await;
        (auth, client.noop().await)
    };
    let ((auth, noop), ()) = tokio::join!(client_side, script);

    assert!(matches!(auth, Err(Error::InvalidResponse(_))));
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
    noop.unwrap();
}

#[tokio::test]
async fn test_authenticate_mechanism_checks() {
    let (client, _server) = connected("IMAP4rev1 AUTH=CRAM-MD5").await;

    // Advertised but without an exchange in this crate.
    assert!(matches!(
        client
            .authenticate("user", "pass", Some(AuthMechanism::CramMd5))
            .await,
        Err(Error::InvalidRequest(_))
    ));
    // Not advertised.
    assert!(matches!(
        client
            .authenticate("user", "pass", Some(AuthMechanism::Plain))
            .await,
        Err(Error::InvalidRequest(_))
    ));
    // Nothing executable to pick from.
    assert!(matches!(
        client.authenticate("user", "pass", None).await,
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
}

#[tokio::test]
async fn test_authenticate_refuses_plaintext_without_mechanisms() {
    let (client, _server) = connected("IMAP4rev1").await;

    assert!(matches!(
        client.authenticate("user", "pass", None).await,
        Err(Error::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_starttls_requires_advertisement() {
    let (client, _server) = connected("IMAP4rev1 AUTH=PLAIN").await;

    assert!(matches!(
        client.start_tls().await,
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(client.tls_state(), TlsState::None);
}

#[tokio::test]
async fn test_starttls_upgrade_failure_rolls_back() {
    let (client, mut server, upgrades) = connected_with("IMAP4rev1 STARTTLS", true).await;

    let script = async {
        let tag = server.expect("STARTTLS").await;
        server.send(&format!("{tag} OK begin TLS\r\n")).await;
    };
    let (result, ()) = tokio::join!(client.start_tls(), script);

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(client.tls_state(), TlsState::None);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_starttls_refused_by_server() {
    let (client, mut server, upgrades) = connected_with("IMAP4rev1 STARTTLS", false).await;

    let script = async {
        let tag = server.expect("STARTTLS").await;
        server.send(&format!("{tag} NO TLS unavailable\r\n")).await;
    };
    let (result, ()) = tokio::join!(client.start_tls(), script);

    assert!(matches!(result, Err(Error::NoResponse(_))));
    assert_eq!(upgrades.load(Ordering::SeqCst), 0);
    assert_eq!(client.tls_state(), TlsState::None);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_state_gates_not_authenticated_commands() {
    let (client, mut server) = connected("IMAP4rev1 AUTH=PLAIN").await;

    let script = async {
        let tag = server.expect("AUTHENTICATE PLAIN AHVzZXIAcGFzcw==").await;
        server
            .send(&format!("* CAPABILITY IMAP4rev1 STARTTLS\r\n{tag} OK\r\n"))
            .await;
    };
    let (result, ()) = tokio::join!(client.authenticate("user", "pass", None), script);
    result.unwrap();

    let err = client.login("user", "pass").await.unwrap_err();
    assert!(matches!(
        err,
        Error::BadState {
            command: "LOGIN",
            current: ConnectionState::Authenticated,
            required: ConnectionState::NotAuthenticated,
        }
    ));
    assert!(matches!(client.start_tls().await, Err(Error::BadState { .. })));
}

#[tokio::test]
async fn test_logout_resets_session() {
    let (client, mut server) = connected("IMAP4rev1").await;

    let script = async {
        let tag = server.expect("LOGOUT").await;
        server
            .send(&format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n"))
            .await;
    };
    let (result, ()) = tokio::join!(client.logout(), script);

    result.unwrap();
    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
    assert_eq!(client.tls_state(), TlsState::None);
    assert!(client.capabilities().is_empty());
    assert!(matches!(client.noop().await, Err(Error::NotConnected)));
    // Nothing left to close.
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_server_close_fails_pending_command() {
    let (client, server) = connected("IMAP4rev1").await;

    let script = async move {
        let mut server = server;
        server.expect("NOOP").await;
        drop(server);
    };
    let (result, ()) = tokio::join!(client.noop(), script);

    assert!(matches!(result, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn test_server_close_releases_session_for_reconnect() {
    let (client, mut servers, _) = setup_servers(143, 2, false);
    let mut second = servers.pop().unwrap();
    let mut first = servers.pop().unwrap();
    greet(&client, &mut first, "IMAP4rev1").await;

    let script = async move {
        first.expect("NOOP").await;
        drop(first);
    };
    let (in_flight, ()) = tokio::join!(client.noop(), script);
    assert!(matches!(in_flight, Err(Error::ConnectionClosed)));

    assert!(!client.is_connected());
    assert!(matches!(client.noop().await, Err(Error::NotConnected)));
    client.disconnect().await.unwrap();

    greet(&client, &mut second, "IMAP4rev1 IDLE").await;
    assert!(client.is_connected());
    assert!(client.has_capability(&Capability::Idle));
}

#[tokio::test]
async fn test_implicit_tls_skips_starttls() {
    let (client, mut servers, upgrades) = setup_servers(993, 1, false);
    let mut server = servers.remove(0);
    greet(&client, &mut server, "IMAP4rev1 STARTTLS AUTH=PLAIN").await;

    assert_eq!(client.tls_state(), TlsState::Established);
    client.start_tls().await.unwrap();
    assert_eq!(client.tls_state(), TlsState::Established);

    // The first line after the handshake is LOGIN itself.
    let script = async {
        let tag = server.expect(r#"LOGIN "user" "pass""#).await;
        server.send(&format!("* CAPABILITY IMAP4rev1 IDLE\r\n{tag} OK\r\n")).await;
    };
    let (result, ()) = tokio::join!(client.login("user", "pass"), script);

    result.unwrap();
    assert_eq!(upgrades.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_login_refuses_credentials_with_line_breaks() {
    let (client, mut servers, _) = setup_servers(993, 1, false);
    let mut server = servers.remove(0);
    greet(&client, &mut server, "IMAP4rev1").await;

    for (user, pass) in [("u\r\nX999 DELETE INBOX", "p"), ("user", "p\nq"), ("user", "p\0")] {
        assert!(matches!(
            client.login(user, pass).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    // Nothing was written: the next line the server reads is NOOP.
    let script = async {
        let tag = server.expect("NOOP").await;
        server.send(&format!("{tag} OK\r\n")).await;
    };
    let (result, ()) = tokio::join!(client.noop(), script);
    result.unwrap();
    assert_eq!(client.state(), ConnectionState::NotAuthenticated);
}
