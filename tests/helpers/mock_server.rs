use std::time::Duration;

use boring::ssl::SslAcceptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Canned behavior for the mock server.
#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub reason: &'static str,
    pub set_cookies: Vec<String>,
    /// Sleep before responding (for cancellation races).
    pub delay: Option<Duration>,
    /// Echo the received request (head + body) back as the response body
    /// instead of `body`, so tests can assert on what was sent.
    pub echo_request: bool,
    pub body: &'static str,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            reason: "OK",
            set_cookies: Vec::new(),
            delay: None,
            echo_request: false,
            body: "Hello from mock server",
        }
    }
}

impl MockResponse {
    pub fn echo() -> Self {
        Self {
            echo_request: true,
            ..Self::default()
        }
    }
}

/// A minimal HTTP/1.1 mock server handling one request per connection.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
}

impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url_tls(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    /// Serve plain HTTP in a background task.
    pub fn start(self, response: MockResponse) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let response = response.clone();
                        tokio::spawn(async move {
                            let _ = handle_connection(stream, response).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        })
    }

    /// Serve TLS-wrapped HTTP in a background task.
    pub fn start_tls(self, acceptor: SslAcceptor, response: MockResponse) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let acceptor = acceptor.clone();
                        let response = response.clone();
                        tokio::spawn(async move {
                            if let Ok(tls_stream) = tokio_boring::accept(&acceptor, stream).await {
                                let _ = handle_connection(tls_stream, response).await;
                            }
                        });
                    }
                    Err(_) => break,
                }
            }
        })
    }
}

async fn handle_connection<S>(mut stream: S, response: MockResponse) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_request(&mut stream).await?;

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let body: Vec<u8> = if response.echo_request {
        request
    } else {
        response.body.as_bytes().to_vec()
    };

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\n",
        response.status, response.reason
    );
    for cookie in &response.set_cookies {
        head.push_str("Set-Cookie: ");
        head.push_str(cookie);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str("Connection: close\r\n\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one full request: head, then Content-Length bytes of body.
async fn read_request<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(request);
        }
        request.extend_from_slice(&buf[..n]);
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&request[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    while request.len() < head_end + content_length {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    Ok(request)
}
