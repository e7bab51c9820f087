//! 알림 전송 추상화
//!
//! [`Transport`] trait은 "이 텍스트를 수신자에게 보낸다, 일시적으로 실패할 수 있다"는
//! 계약만 정의합니다. Notifier, Tailer(에러 상한 알림), Supervisor(비정상 종료 알림)가
//! 같은 구현을 `Arc`로 공유합니다.
//!
//! [`SmtpTransport`]는 로컬 릴레이에 평문 SMTP로 전달합니다.
//! 전송마다 새 TCP 연결을 열므로 재시도는 곧 연결 재수립입니다.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use frosty_core::config::NotifyConfig;
use frosty_core::error::{FrostyError, PipelineError};

/// 전송할 알림 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// 제목
    pub subject: String,
    /// 본문 (UTF-8 텍스트)
    pub body: String,
}

impl Notification {
    /// 새 알림을 생성합니다.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// 전송 실패
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 릴레이에 연결할 수 없음
    #[error("connect to {addr} failed: {reason}")]
    Connect {
        /// 릴레이 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 단계별 타임아웃 초과
    #[error("timed out during {stage}")]
    Timeout {
        /// SMTP 단계 (greeting, EHLO, DATA 등)
        stage: &'static str,
    },

    /// 예상하지 못한 SMTP 응답
    #[error("unexpected reply during {stage}: {reply}")]
    Rejected {
        /// SMTP 단계
        stage: &'static str,
        /// 서버 응답 줄
        reply: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for FrostyError {
    fn from(err: TransportError) -> Self {
        FrostyError::Pipeline(PipelineError::Delivery(err.to_string()))
    }
}

/// 알림 전송 trait
///
/// 구현체는 한 번의 `deliver` 호출마다 필요한 연결을 직접 수립해야 합니다.
pub trait Transport: Send + Sync + 'static {
    /// 알림 한 건을 전송합니다.
    fn deliver(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// 평문 SMTP 전송
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    host: String,
    port: u16,
    sender: String,
    recipient: String,
    timeout: Duration,
}

impl SmtpTransport {
    /// 새 SMTP 전송을 생성합니다.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            sender: sender.into(),
            recipient: recipient.into(),
            timeout,
        }
    }

    /// core 설정에서 생성합니다.
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(
            config.smtp_host.clone(),
            config.smtp_port,
            config.sender.clone(),
            config.recipient.clone(),
            config.timeout(),
        )
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// EHLO에 쓸 도메인 (발신자 주소의 도메인 부분)
    fn helo_domain(&self) -> &str {
        self.sender
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
            .unwrap_or("localhost")
    }

    /// 헤더와 dot-stuffing이 적용된 DATA 본문을 생성합니다.
    pub fn encode_message(&self, notification: &Notification) -> String {
        let message_id = uuid::Uuid::new_v4();
        let mut out = String::with_capacity(notification.body.len() + 512);
        out.push_str(&format!("From: {}\r\n", self.sender));
        out.push_str(&format!("To: {}\r\n", self.recipient));
        out.push_str(&format!("Subject: {}\r\n", sanitize_header(&notification.subject)));
        out.push_str(&format!("Date: {}\r\n", chrono::Utc::now().to_rfc2822()));
        out.push_str(&format!(
            "Message-ID: <{message_id}@{}>\r\n",
            self.helo_domain()
        ));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: 8bit\r\n");
        out.push_str("\r\n");
        for line in notification.body.lines() {
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        out.push_str(".\r\n");
        out
    }

    async fn session(&self, notification: &Notification) -> Result<(), TransportError> {
        let addr = self.addr();
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout { stage: "connect" })?
            .map_err(|e| TransportError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        self.expect_reply(&mut reader, "greeting", &[220]).await?;
        self.command(
            &mut write,
            &mut reader,
            &format!("EHLO {}", self.helo_domain()),
            "EHLO",
            &[250],
        )
        .await?;
        self.command(
            &mut write,
            &mut reader,
            &format!("MAIL FROM:<{}>", self.sender),
            "MAIL FROM",
            &[250],
        )
        .await?;
        self.command(
            &mut write,
            &mut reader,
            &format!("RCPT TO:<{}>", self.recipient),
            "RCPT TO",
            &[250, 251],
        )
        .await?;
        self.command(&mut write, &mut reader, "DATA", "DATA", &[354])
            .await?;

        let message = self.encode_message(notification);
        self.write_all(&mut write, message.as_bytes(), "message")
            .await?;
        self.expect_reply(&mut reader, "end of data", &[250]).await?;

        // 메시지는 이미 접수됨. QUIT 실패는 무시합니다.
        if let Err(e) = self
            .command(&mut write, &mut reader, "QUIT", "QUIT", &[221])
            .await
        {
            debug!(error = %e, "smtp quit failed after delivery");
        }
        Ok(())
    }

    async fn command(
        &self,
        write: &mut OwnedWriteHalf,
        reader: &mut BufReader<OwnedReadHalf>,
        line: &str,
        stage: &'static str,
        accepted: &[u16],
    ) -> Result<(), TransportError> {
        self.write_all(write, format!("{line}\r\n").as_bytes(), stage)
            .await?;
        self.expect_reply(reader, stage, accepted).await
    }

    async fn write_all(
        &self,
        write: &mut OwnedWriteHalf,
        bytes: &[u8],
        stage: &'static str,
    ) -> Result<(), TransportError> {
        tokio::time::timeout(self.timeout, write.write_all(bytes))
            .await
            .map_err(|_| TransportError::Timeout { stage })??;
        Ok(())
    }

    /// 여러 줄 응답(`250-...`)의 마지막 줄까지 읽고 코드를 확인합니다.
    async fn expect_reply(
        &self,
        reader: &mut BufReader<OwnedReadHalf>,
        stage: &'static str,
        accepted: &[u16],
    ) -> Result<(), TransportError> {
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(self.timeout, reader.read_line(&mut line))
                .await
                .map_err(|_| TransportError::Timeout { stage })??;
            if n == 0 {
                return Err(TransportError::Rejected {
                    stage,
                    reply: "connection closed".to_owned(),
                });
            }
            let reply = line.trim_end().to_owned();
            let code = reply.get(..3).and_then(|c| c.parse::<u16>().ok());
            let continued = reply.as_bytes().get(3) == Some(&b'-');
            match code {
                Some(_) if continued => continue,
                Some(code) if accepted.contains(&code) => return Ok(()),
                _ => return Err(TransportError::Rejected { stage, reply }),
            }
        }
    }
}

impl Transport for SmtpTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), TransportError> {
        self.session(notification).await
    }
}

/// 헤더 인젝션 방지: 개행을 공백으로 바꿉니다.
fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// 테스트용 mock 전송
///
/// 지정한 횟수만큼 실패한 뒤 성공하며, 성공한 알림을 기록합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockTransport {
    /// 성공적으로 전달된 알림
    pub delivered: std::sync::Mutex<Vec<Notification>>,
    /// 앞으로 실패시킬 호출 수
    pub failures_remaining: std::sync::atomic::AtomicUsize,
    /// 전체 호출 수
    pub attempts: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTransport {
    /// 처음 `n`번의 호출을 실패시키는 mock을 생성합니다.
    pub fn failing(n: usize) -> Self {
        Self {
            failures_remaining: std::sync::atomic::AtomicUsize::new(n),
            ..Default::default()
        }
    }

    /// 전달된 알림 목록의 복사본
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), TransportError> {
        use std::sync::atomic::Ordering;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect {
                addr: "mock".to_owned(),
                reason: "simulated failure".to_owned(),
            });
        }
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn transport(port: u16) -> SmtpTransport {
        SmtpTransport::new(
            "127.0.0.1",
            port,
            "frosty@sensor.local",
            "root@localhost",
            Duration::from_secs(5),
        )
    }

    /// 한 번의 세션을 처리하고 받은 DATA 본문을 돌려주는 가짜 SMTP 릴레이
    async fn fake_relay(listener: TcpListener, reject_rcpt: bool) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut lines = Vec::new();

        write.write_all(b"220 relay ESMTP\r\n").await.unwrap();
        let mut in_data = false;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end_matches("\r\n").to_owned();
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 queued\r\n").await.unwrap();
                } else {
                    lines.push(line);
                }
                continue;
            }
            let reply: &[u8] = if line.starts_with("EHLO") {
                b"250-relay\r\n250 8BITMIME\r\n"
            } else if line.starts_with("MAIL FROM") {
                b"250 ok\r\n"
            } else if line.starts_with("RCPT TO") {
                if reject_rcpt {
                    b"550 no such user\r\n"
                } else {
                    b"250 ok\r\n"
                }
            } else if line == "DATA" {
                in_data = true;
                b"354 go ahead\r\n"
            } else if line == "QUIT" {
                write.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"500 unknown\r\n"
            };
            write.write_all(reply).await.unwrap();
        }
        lines
    }

    #[tokio::test]
    async fn delivers_over_smtp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let relay = tokio::spawn(fake_relay(listener, false));

        let notification = Notification::new("suricata alerts", "ET TROJAN\n.hidden line");
        transport(port).deliver(&notification).await.unwrap();

        let data = relay.await.unwrap();
        assert!(data.contains(&"Subject: suricata alerts".to_owned()));
        assert!(data.contains(&"ET TROJAN".to_owned()));
        // dot-stuffing 적용
        assert!(data.contains(&"..hidden line".to_owned()));
    }

    #[tokio::test]
    async fn rejected_recipient_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _relay = tokio::spawn(fake_relay(listener, true));

        let err = transport(port)
            .deliver(&Notification::new("s", "b"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Rejected {
                stage: "RCPT TO",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_relay_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = transport(port)
            .deliver(&Notification::new("s", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn encode_message_has_headers_and_terminator() {
        let message = transport(25).encode_message(&Notification::new("a\r\nBcc: x", "body"));
        assert!(message.starts_with("From: frosty@sensor.local\r\n"));
        assert!(message.contains("Subject: a  Bcc: x\r\n"));
        assert!(message.contains("@sensor.local>\r\n"));
        assert!(message.ends_with("\r\nbody\r\n.\r\n"));
    }

    #[tokio::test]
    async fn mock_fails_then_succeeds() {
        let mock = MockTransport::failing(1);
        let n = Notification::new("s", "b");
        assert!(mock.deliver(&n).await.is_err());
        assert!(mock.deliver(&n).await.is_ok());
        assert_eq!(mock.delivered().len(), 1);
    }
}
