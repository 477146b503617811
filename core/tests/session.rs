/*
 * session.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Scenario tests for the IMAP session state machine. Each test scripts a
 * fake server on one end of an in-memory duplex stream and drives a Session
 * on the other end.
 *
 * Run with:
 *   cargo test -p postino_core --test session -- --nocapture
 */

use std::time::Duration;

use postino_core::imap::{
    ConnectionState, Flag, ImapError, MessageEnvelope, ResponseCode, SequenceSet, Session, Status,
};
use postino_core::sasl::{SaslError, SaslMechanism};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

enum Step {
    /// One line from the client, without CRLF.
    Expect(String),
    /// Exact octets from the client (literal data).
    ExpectRaw(Vec<u8>),
    /// Octets to the client, CRLFs included.
    Send(String),
    /// Hang up.
    Close,
}

fn expect(line: &str) -> Step {
    Step::Expect(line.to_string())
}

fn send(text: &str) -> Step {
    Step::Send(text.to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Plays the script; the stream is handed back so it outlives the script.
async fn run_script(stream: DuplexStream, script: Vec<Step>) -> Option<BufReader<DuplexStream>> {
    let mut stream = BufReader::new(stream);
    for step in script {
        match step {
            Step::Expect(expected) => {
                let mut line = String::new();
                stream.read_line(&mut line).await.unwrap();
                assert_eq!(line.trim_end_matches("\r\n"), expected);
            }
            Step::ExpectRaw(expected) => {
                let mut data = vec![0u8; expected.len()];
                stream.read_exact(&mut data).await.unwrap();
                assert_eq!(data, expected);
            }
            Step::Send(text) => {
                stream.get_mut().write_all(text.as_bytes()).await.unwrap();
            }
            Step::Close => return None,
        }
    }
    Some(stream)
}

async fn start(script: Vec<Step>) -> (Session<DuplexStream>, JoinHandle<Option<BufReader<DuplexStream>>>) {
    init_tracing();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(run_script(server, script));
    let session = Session::start(client).await.unwrap();
    (session, server)
}

const GREETING: &str = "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] Dovecot ready.\r\n";
const PREAUTH: &str = "* PREAUTH [CAPABILITY IMAP4rev1] Logged in as alice\r\n";

fn select_inbox(tag: &str, exists: u32) -> Vec<Step> {
    vec![
        expect(&format!("{} SELECT INBOX", tag)),
        send(&format!("* {} EXISTS\r\n* 0 RECENT\r\n{} OK [READ-WRITE] SELECT completed\r\n", exists, tag)),
    ]
}

#[tokio::test]
async fn test_login_moves_to_authenticated() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 LOGIN alice secret"),
        send("A0001 OK LOGIN completed\r\n"),
    ])
    .await;
    assert_eq!(session.state(), ConnectionState::NotAuthenticated);
    assert!(session.has_capability("auth=plain"));
    assert_eq!(session.greeting(), Some("Dovecot ready."));

    session.login("alice", "secret").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_login_quotes_and_literals() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 LOGIN \"alice smith\" {9}"),
        send("+ Ready for literal data\r\n"),
        Step::ExpectRaw("pässword".as_bytes().to_vec()),
        expect(""),
        send("A0001 OK LOGIN completed\r\n"),
    ])
    .await;
    session.login("alice smith", "pässword").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_select_populates_mailbox_state() {
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 SELECT INBOX"),
        send(
            "* 17 EXISTS\r\n\
             * 2 RECENT\r\n\
             * OK [UNSEEN 8] Message 8 is first unseen\r\n\
             * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
             * OK [UIDNEXT 4392] Predicted next UID\r\n\
             * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
             * OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n\
             A0001 OK [READ-WRITE] SELECT completed\r\n",
        ),
    ])
    .await;
    assert_eq!(session.state(), ConnectionState::Authenticated);

    let mailbox = session.select("INBOX").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Selected);
    assert_eq!(mailbox.name, "INBOX");
    assert_eq!(mailbox.message_count, 17);
    assert_eq!(mailbox.recent, 2);
    assert_eq!(mailbox.first_unseen, Some(8));
    assert_eq!(mailbox.uid_validity, Some(3857529045));
    assert_eq!(mailbox.uid_next, Some(4392));
    assert_eq!(mailbox.flags.len(), 5);
    assert!(mailbox.permanent_flags.contains(&Flag::MayCreate));
    assert!(!mailbox.read_only);
    assert_eq!(session.mailbox(), Some(&mailbox));
    server.await.unwrap();
}

#[tokio::test]
async fn test_examine_is_read_only_and_names_are_encoded() {
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 EXAMINE Entw&APw-rfe"),
        send("* 3 EXISTS\r\nA0001 OK [READ-ONLY] EXAMINE completed\r\n"),
        expect("A0002 CLOSE"),
        send("A0002 OK CLOSE completed\r\n"),
    ])
    .await;
    let mailbox = session.examine("Entwürfe").await.unwrap();
    assert_eq!(mailbox.name, "Entwürfe");
    assert!(mailbox.read_only);
    assert_eq!(mailbox.message_count, 3);

    session.close().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    assert!(session.mailbox().is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_body_part_returns_literal_octets() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 3));
    script.push(expect("A0002 FETCH 3 (BODY[1])"));
    script.push(send("* 3 FETCH (BODY[1] {21}\r\nTesting One Two Three)\r\nA0002 OK FETCH completed\r\n"));
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    let body = session.fetch_body_part(3, "1").await.unwrap();
    assert_eq!(body, b"Testing One Two Three".to_vec());
    assert_eq!(body.len(), 21);
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_lost_mid_command() {
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 SELECT INBOX"),
        send("* 17 EXISTS\r\n"),
        Step::Close,
    ])
    .await;

    let err = session.select("INBOX").await.unwrap_err();
    assert!(matches!(err, ImapError::ConnectionLost), "{:?}", err);
    assert!(err.is_connection_error());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.pending().is_none());
    assert!(session.mailbox().is_none());

    let err = session.keep_alive().await.unwrap_err();
    assert!(matches!(err, ImapError::InvalidState { state: ConnectionState::Disconnected, .. }));
    session.logout().await.unwrap();
    assert!(server.await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_twice_yields_identical_snapshots() {
    let status = "* STATUS INBOX (MESSAGES 231 RECENT 1 UIDNEXT 44292 UIDVALIDITY 7 UNSEEN 3)\r\n";
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 STATUS INBOX (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)"),
        send(&format!("{}A0001 OK STATUS completed\r\n", status)),
        expect("A0002 STATUS INBOX (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)"),
        send(&format!("{}A0002 OK STATUS completed\r\n", status)),
    ])
    .await;

    let first = session.status("INBOX").await.unwrap();
    let second = session.status("INBOX").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.message_count, 231);
    assert_eq!(first.unseen, Some(3));
    assert_eq!(first.uid_next, Some(44292));
    assert_eq!(session.state(), ConnectionState::Authenticated);
    assert!(session.mailbox().is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn test_rejection_is_a_completion_for_execute() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 LOGIN alice wrong"),
        send("A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n"),
        expect("A0002 LOGIN alice wrong"),
        send("A0002 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n"),
    ])
    .await;

    let completion = session.execute("LOGIN alice wrong").await.unwrap();
    assert_eq!(completion.status, Status::No);
    assert_eq!(completion.text, "Invalid credentials");
    assert_eq!(
        completion.code,
        Some(ResponseCode::Other { name: "AUTHENTICATIONFAILED".to_string(), value: None })
    );
    assert_eq!(session.state(), ConnectionState::NotAuthenticated);

    let err = session.login("alice", "wrong").await.unwrap_err();
    assert!(err.is_command_failure());
    assert!(!err.is_connection_error());
    assert_eq!(session.state(), ConnectionState::NotAuthenticated);
    assert_eq!(session.last_error(), Some("Invalid credentials"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_invalid_state_consumes_no_tag() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 NOOP"),
        send("A0001 OK NOOP completed\r\n"),
    ])
    .await;

    let err = session.fetch_envelope(1).await.unwrap_err();
    match err {
        ImapError::InvalidState { command, state } => {
            assert_eq!(command, "FETCH");
            assert_eq!(state, ConnectionState::NotAuthenticated);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(session.execute("SELECT INBOX").await.is_err());
    assert!(session.execute("UID FETCH 1 (FLAGS)").await.is_err());

    session.keep_alive().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_dropped_command_leaves_session_sequenced() {
    let (mut session, server) = start(vec![send(PREAUTH), expect("A0001 NOOP")]).await;

    let result = tokio::time::timeout(Duration::from_millis(50), session.keep_alive()).await;
    assert!(result.is_err());
    assert_eq!(session.pending().map(|p| p.tag.as_str()), Some("A0001"));

    match session.capability().await {
        Err(ImapError::Sequencing { outstanding }) => assert_eq!(outstanding, "A0001 NOOP"),
        other => panic!("unexpected {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_response_fails_command_but_not_session() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 4));
    script.extend(vec![
        expect("A0002 FETCH 4 (BODYSTRUCTURE)"),
        send("* 4 FETCH (BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)\r\nA0002 OK FETCH completed\r\n"),
        expect("A0003 NOOP"),
        send("* 5 EXISTS\r\nA0003 OK NOOP completed\r\n"),
    ]);
    script.extend(select_inbox("A0004", 5));
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    let err = session.fetch_structure(4).await.unwrap_err();
    assert!(matches!(err, ImapError::Protocol { .. }), "{:?}", err);
    assert!(session.is_degraded());
    assert!(session.pending().is_none());
    assert_eq!(session.state(), ConnectionState::Selected);

    session.keep_alive().await.unwrap();
    assert_eq!(session.mailbox().map(|m| m.message_count), Some(5));

    session.select("INBOX").await.unwrap();
    assert!(!session.is_degraded());
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_nested_body_structure() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 1));
    script.extend(vec![
        expect("A0002 FETCH 1 (BODYSTRUCTURE)"),
        send(
            "* 1 FETCH (BODYSTRUCTURE (((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" 12 1)\
             (\"TEXT\" \"HTML\" (\"CHARSET\" \"UTF-8\") NIL NIL \"QUOTED-PRINTABLE\" 40 2) \"ALTERNATIVE\")\
             (\"APPLICATION\" \"PDF\" (\"NAME\" \"a.pdf\") NIL NIL \"BASE64\" 4000) \"MIXED\"))\r\n\
             A0002 OK FETCH completed\r\n",
        ),
    ]);
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    let body = session.fetch_structure(1).await.unwrap();
    assert_eq!(body.leaf_count(), 3);
    let leaves: Vec<(String, String)> = body
        .leaves()
        .into_iter()
        .map(|(path, part)| (path, part.mime_type()))
        .collect();
    assert_eq!(
        leaves,
        vec![
            ("1.1".to_string(), "text/plain".to_string()),
            ("1.2".to_string(), "text/html".to_string()),
            ("2".to_string(), "application/pdf".to_string()),
        ]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_authenticate_plain_with_sasl_ir() {
    let (mut session, server) = start(vec![
        send("* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=PLAIN] ready\r\n"),
        expect("A0001 AUTHENTICATE PLAIN AGFsaWNlAHNlY3JldA=="),
        send("A0001 OK [CAPABILITY IMAP4rev1 IDLE] authenticated\r\n"),
    ])
    .await;

    session.authenticate(SaslMechanism::Plain, "alice", "secret").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    assert_eq!(session.capabilities(), ["IMAP4REV1".to_string(), "IDLE".to_string()]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_authenticate_plain_without_sasl_ir() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 AUTHENTICATE PLAIN"),
        send("+ \r\n"),
        expect("AGFsaWNlAHNlY3JldA=="),
        send("A0001 OK authenticated\r\n"),
    ])
    .await;

    session.authenticate(SaslMechanism::Plain, "alice", "secret").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_authenticate_cram_md5() {
    let (mut session, server) = start(vec![
        send("* OK [CAPABILITY IMAP4rev1 AUTH=CRAM-MD5] ready\r\n"),
        expect("A0001 AUTHENTICATE CRAM-MD5"),
        send("+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n"),
        expect("dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw"),
        send("A0001 OK CRAM-MD5 authentication successful\r\n"),
    ])
    .await;

    session.authenticate(SaslMechanism::CramMd5, "tim", "tanstaaftanstaaf").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    server.await.unwrap();
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    use hmac::Mac;
    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

async fn read_client_line(stream: &mut BufReader<DuplexStream>) -> String {
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    line.trim_end_matches("\r\n").to_string()
}

/// Server side of SCRAM-SHA-256: checks the client proof for `password`
/// and answers with the matching server signature.
async fn scram_server(stream: DuplexStream, password: &'static str) -> BufReader<DuplexStream> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use sha2::Digest;

    let mut stream = BufReader::new(stream);
    let salt = b"postino-salt";
    let iterations = 4096;
    stream
        .get_mut()
        .write_all(b"* OK [CAPABILITY IMAP4rev1 AUTH=SCRAM-SHA-256] ready\r\n")
        .await
        .unwrap();
    assert_eq!(read_client_line(&mut stream).await, "A0001 AUTHENTICATE SCRAM-SHA-256");
    stream.get_mut().write_all(b"+ \r\n").await.unwrap();

    let client_first = String::from_utf8(STANDARD.decode(read_client_line(&mut stream).await).unwrap()).unwrap();
    let client_first_bare = client_first.strip_prefix("n,,").unwrap().to_string();
    assert!(client_first_bare.starts_with("n=alice,r="));
    let client_nonce = client_first_bare.split_once(",r=").unwrap().1;
    let server_first = format!("r={}srvnonce,s={},i={}", client_nonce, STANDARD.encode(salt), iterations);
    let challenge = format!("+ {}\r\n", STANDARD.encode(&server_first));
    stream.get_mut().write_all(challenge.as_bytes()).await.unwrap();

    let client_final = String::from_utf8(STANDARD.decode(read_client_line(&mut stream).await).unwrap()).unwrap();
    let (without_proof, proof) = client_final.rsplit_once(",p=").unwrap();
    assert_eq!(without_proof, format!("c=biws,r={}srvnonce", client_nonce));

    let mut salted = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, iterations, &mut salted);
    let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);
    let client_key = hmac_sha256(&salted, b"Client Key");
    let stored_key = sha2::Sha256::digest(&client_key);
    let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
    let expected_proof: Vec<u8> = client_key.iter().zip(&client_signature).map(|(k, s)| k ^ s).collect();
    assert_eq!(STANDARD.decode(proof).unwrap(), expected_proof);

    let server_signature = hmac_sha256(&hmac_sha256(&salted, b"Server Key"), auth_message.as_bytes());
    let server_final = format!("+ {}\r\n", STANDARD.encode(format!("v={}", STANDARD.encode(server_signature))));
    stream.get_mut().write_all(server_final.as_bytes()).await.unwrap();
    assert_eq!(read_client_line(&mut stream).await, "");
    stream.get_mut().write_all(b"A0001 OK SCRAM-SHA-256 authentication successful\r\n").await.unwrap();
    stream
}

#[tokio::test]
async fn test_authenticate_scram_sha256() {
    init_tracing();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(scram_server(server, "pencil"));
    let mut session = Session::start(client).await.unwrap();

    session.authenticate(SaslMechanism::ScramSha256, "alice", "pencil").await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_bad_challenge_cancels_authentication() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 AUTHENTICATE CRAM-MD5"),
        send("+ !!!not base64!!!\r\n"),
        expect("*"),
        send("A0001 BAD AUTHENTICATE cancelled\r\n"),
    ])
    .await;

    let err = session.authenticate(SaslMechanism::CramMd5, "tim", "secret").await.unwrap_err();
    assert!(matches!(err, ImapError::Sasl(SaslError::InvalidChallenge(_))), "{:?}", err);
    assert_eq!(session.state(), ConnectionState::NotAuthenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_append_waits_for_continuation() {
    let message = b"From: a@example.com\r\nSubject: hi\r\n\r\nbody\r\n".to_vec();
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect(&format!("A0001 APPEND Sent (\\Seen) {{{}}}", message.len())),
        send("+ Ready for literal data\r\n"),
        Step::ExpectRaw(message.clone()),
        expect(""),
        send("A0001 OK [APPENDUID 38505 3955] APPEND completed\r\n"),
    ])
    .await;

    session.append("Sent", &[Flag::Seen], &message).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_append_rejected_before_literal() {
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 APPEND Missing {4}"),
        send("A0001 NO [TRYCREATE] No such mailbox\r\n"),
    ])
    .await;

    let err = session.append("Missing", &[], b"test").await.unwrap_err();
    assert_eq!(err.code(), Some(&ResponseCode::TryCreate));
    assert!(session.pending().is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn test_delete_message_targets_requested_sequence_number() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 3));
    script.extend(vec![
        expect("A0002 STORE 2 +FLAGS.SILENT (\\Deleted)"),
        send("A0002 OK STORE completed\r\n"),
        expect("A0003 EXPUNGE"),
        send("* 2 EXPUNGE\r\nA0003 OK EXPUNGE completed\r\n"),
    ]);
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    session.delete_message(2).await.unwrap();
    assert_eq!(session.expunge().await.unwrap(), vec![2]);
    assert_eq!(session.mailbox().map(|m| m.message_count), Some(2));
    server.await.unwrap();
}

#[tokio::test]
async fn test_store_returns_echoed_flags() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 3));
    script.extend(vec![
        expect("A0002 STORE 1:2 -FLAGS (\\Seen)"),
        send("* 1 FETCH (FLAGS (\\Answered))\r\n* 2 FETCH (FLAGS ())\r\nA0002 OK STORE completed\r\n"),
    ]);
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    let flags = session
        .store(&SequenceSet::range(1, 2), &postino_core::imap::StoreOperation::remove(vec![Flag::Seen]))
        .await
        .unwrap();
    assert_eq!(flags, vec![(1, vec![Flag::Answered]), (2, vec![])]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_message_details_falls_back_to_part_one() {
    let mut script = vec![send(PREAUTH)];
    script.extend(select_inbox("A0001", 1));
    script.extend(vec![
        expect("A0002 FETCH 1 (UID FLAGS ENVELOPE RFC822.SIZE INTERNALDATE)"),
        send(
            "* 1 FETCH (UID 42 FLAGS (\\Seen \\Deleted) RFC822.SIZE 120 \
             INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" \
             ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700\" \"Hello\" ((\"Alice\" NIL \"alice\" \"example.com\")) \
             NIL NIL ((NIL NIL \"bob\" \"example.com\")) NIL NIL NIL \"<1@example.com>\"))\r\n\
             A0002 OK FETCH completed\r\n",
        ),
        expect("A0003 FETCH 1 (BODY[1.2])"),
        send("* 1 FETCH (BODY[1.2] NIL)\r\nA0003 OK FETCH completed\r\n"),
        expect("A0004 FETCH 1 (BODY[1])"),
        send("* 1 FETCH (BODY[1] {5}\r\nHello)\r\nA0004 OK FETCH completed\r\n"),
    ]);
    let (mut session, server) = start(script).await;

    session.select("INBOX").await.unwrap();
    let details = session.fetch_message_details(1).await.unwrap();
    assert_eq!(details.part, "1");
    assert_eq!(details.body, b"Hello".to_vec());
    assert!(details.is_deleted());
    assert!(!details.is_answered());
    let message: &MessageEnvelope = &details.message;
    assert_eq!(message.uid, Some(42));
    assert_eq!(message.size, Some(120));
    assert_eq!(message.subject(), Some("Hello"));
    let envelope = message.envelope.as_ref().unwrap();
    assert_eq!(envelope.from[0].to_rfc822(), "Alice <alice@example.com>");
    assert_eq!(envelope.to[0].email().as_deref(), Some("bob@example.com"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_list_and_search() {
    let mut script = vec![
        send(PREAUTH),
        expect("A0001 LIST \"\" \"*\""),
        send(
            "* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
             * LIST (\\Noselect \\HasChildren) \"/\" \"[Gmail]\"\r\n\
             * LIST () \"/\" \"Entw&APw-rfe\"\r\n\
             A0001 OK LIST completed\r\n",
        ),
    ];
    script.extend(select_inbox("A0002", 9));
    script.extend(vec![
        expect("A0003 SEARCH UNSEEN"),
        send("* SEARCH 2 5 9\r\nA0003 OK SEARCH completed\r\n"),
        expect("A0004 UID SEARCH ALL"),
        send("* SEARCH 101 102\r\nA0004 OK UID SEARCH completed\r\n"),
    ]);
    let (mut session, server) = start(script).await;

    let entries = session.list("", "*").await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_selectable());
    assert!(!entries[1].is_selectable());
    assert_eq!(entries[2].name, "Entwürfe");

    session.select("INBOX").await.unwrap();
    assert_eq!(session.search("UNSEEN").await.unwrap(), vec![2, 5, 9]);
    assert_eq!(session.uid_search("ALL").await.unwrap(), vec![101, 102]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_logout() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 LOGOUT"),
        send("* BYE IMAP4rev1 Server logging out\r\nA0001 OK LOGOUT completed\r\n"),
    ])
    .await;

    session.logout().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_logout_when_server_hangs_up_first() {
    let (mut session, server) = start(vec![
        send(GREETING),
        expect("A0001 LOGOUT"),
        send("* BYE bye\r\n"),
        Step::Close,
    ])
    .await;

    session.logout().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_unsolicited_bye_allows_only_logout() {
    let (mut session, server) = start(vec![
        send(PREAUTH),
        expect("A0001 NOOP"),
        send("* BYE Autologout; idle for too long\r\nA0001 OK NOOP completed\r\n"),
    ])
    .await;

    session.keep_alive().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Logout);
    let err = session.status("INBOX").await.unwrap_err();
    assert!(matches!(err, ImapError::InvalidState { state: ConnectionState::Logout, .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn test_greeting_variants() {
    let (session, _server) = start(vec![send(PREAUTH)]).await;
    assert_eq!(session.state(), ConnectionState::Authenticated);
    assert_eq!(session.capabilities(), ["IMAP4REV1".to_string()]);

    let (client, server) = tokio::io::duplex(1024);
    let script = tokio::spawn(run_script(server, vec![send("* BYE Too many connections\r\n")]));
    match Session::start(client).await {
        Err(ImapError::CommandFailure { text, .. }) => assert_eq!(text, "Too many connections"),
        other => panic!("unexpected {:?}", other),
    }
    script.await.unwrap();
}

/// Needs a reachable server; set IMAP_TEST_HOST, IMAP_TEST_USER and IMAP_TEST_PASSWORD.
#[test]
#[ignore] // requires network
fn test_blocking_client_against_real_server() {
    use postino_core::imap::Client;

    let host = std::env::var("IMAP_TEST_HOST").expect("IMAP_TEST_HOST");
    let user = std::env::var("IMAP_TEST_USER").expect("IMAP_TEST_USER");
    let password = std::env::var("IMAP_TEST_PASSWORD").expect("IMAP_TEST_PASSWORD");

    let mut client = Client::connect_to(&host, 993, true).expect("connect");
    client.login(&user, &password).expect("login");
    let mailbox = client.select_mailbox("INBOX").expect("select");
    eprintln!("INBOX: {} messages, {} recent", mailbox.message_count, mailbox.recent);
    if mailbox.message_count > 0 {
        let structure = client.fetch_structure(1).expect("structure");
        eprintln!("message 1: {} ({} parts)", structure.mime_type(), structure.leaf_count());
    }
    client.keep_alive().expect("noop");
    client.logout().expect("logout");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
