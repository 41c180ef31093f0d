//! End-to-end tests for the SMTP client against a scripted server.

#![allow(clippy::unwrap_used)]

use courier_smtp::{ClientError, SmtpClient};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    task::JoinHandle,
};

/// Accept one connection and run a canned happy-path SMTP session,
/// returning every line the client sent.
async fn scripted_server(listener: TcpListener) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut received = Vec::new();

        write.write_all(b"220 mock ready\r\n").await.unwrap();

        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line.clone());
            let upper = line.to_uppercase();

            if upper.starts_with("EHLO") {
                write
                    .write_all(b"250-mock.test\r\n250 SIZE 1000000\r\n")
                    .await
                    .unwrap();
            } else if upper.starts_with("MAIL") || upper.starts_with("RCPT") || upper == "RSET" {
                write.write_all(b"250 OK\r\n").await.unwrap();
            } else if upper == "DATA" {
                write.write_all(b"354 go ahead\r\n").await.unwrap();
                while let Some(body_line) = lines.next_line().await.unwrap() {
                    received.push(body_line.clone());
                    if body_line == "." {
                        break;
                    }
                }
                write.write_all(b"250 accepted\r\n").await.unwrap();
            } else if upper == "QUIT" {
                write.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                write.write_all(b"500 unknown\r\n").await.unwrap();
            }
        }

        received
    })
}

#[tokio::test]
async fn drives_a_full_transaction() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = scripted_server(listener).await;

    let mut client = SmtpClient::connect(&addr.to_string(), "mock.test")
        .await
        .unwrap();

    let greeting = client.read_greeting().await.unwrap();
    assert_eq!(greeting.code, 220);

    let ehlo = client.ehlo("client.test").await.unwrap();
    assert!(ehlo.is_success());
    assert_eq!(ehlo.lines, vec!["mock.test", "SIZE 1000000"]);

    assert!(client.mail_from("sender@example.org").await.unwrap().is_success());
    assert!(client.rcpt_to("rcpt@example.com").await.unwrap().is_success());
    assert_eq!(client.data().await.unwrap().code, 354);

    // Deliberately no trailing newline: the client must repair it before
    // the terminator.
    let mut body: &[u8] = b"Subject: hi\r\n\r\nbody without trailing newline";
    assert!(client.send_body(&mut body).await.unwrap().is_success());

    assert!(client.quit().await.unwrap().is_success());

    let received = server.await.unwrap();
    assert!(received.contains(&"MAIL FROM:<sender@example.org>".to_string()));
    assert!(received.contains(&"RCPT TO:<rcpt@example.com>".to_string()));
    // The dot terminator landed on its own line, so the CRLF repair
    // worked.
    assert!(received.contains(&".".to_string()));
    assert!(received.contains(&"body without trailing newline".to_string()));
}

#[tokio::test]
async fn surfaces_a_closed_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept and immediately drop the connection, greeting unsent.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut client = SmtpClient::connect(&addr.to_string(), "mock.test")
        .await
        .unwrap();
    let result = client.read_greeting().await;

    assert!(matches!(
        result,
        Err(ClientError::ConnectionClosed | ClientError::Io(_))
    ));
}
