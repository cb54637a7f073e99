use std::{
    io::{self, BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};

use url::Url;

use crate::error::Error;

use super::CALLBACK_PATH;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_HEAD: u64 = 8 * 1024;

/// Query parameters of the redirect back from the authorization page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Loopback listener owned by a single login attempt.  The socket is closed
/// when this value is dropped.
pub struct CallbackListener {
    listener: TcpListener,
    address: SocketAddr,
}

impl CallbackListener {
    pub fn bind(address: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(address).map_err(|err| {
            log::error!("failed to bind callback listener on {}: {}", address, err);
            Error::ServerBind(err)
        })?;
        listener.set_nonblocking(true).map_err(Error::ServerBind)?;
        let address = listener.local_addr().map_err(Error::ServerBind)?;
        log::info!("callback listener bound on {}", address);
        Ok(Self { listener, address })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Wait for the one request on the callback path.  Other paths are
    /// answered with 404 and do not count.  Slow clients are cut off at the
    /// deadline too.
    pub fn wait(&self, timeout: Duration) -> Result<Callback, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::error!("timed out waiting for authorization callback");
                return Err(Error::AuthTimeout);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => match read_request(&stream, deadline) {
                    Ok(Some(params)) => {
                        log::info!("received authorization callback");
                        return Ok(Callback { stream, params });
                    }
                    Ok(None) => {
                        log::debug!("ignoring non-callback request from {}", peer);
                        write_response(&stream, "404 Not Found", NOT_FOUND_PAGE);
                    }
                    Err(err) => {
                        log::warn!("failed to read callback request: {}", err);
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        log::info!("closing callback listener on {}", self.address);
    }
}

/// The accepted callback connection, waiting for its response page.
pub struct Callback {
    stream: TcpStream,
    pub params: CallbackParams,
}

impl Callback {
    pub fn respond_success(self) {
        write_response(&self.stream, "200 OK", SUCCESS_PAGE);
    }

    pub fn respond_failure(self) {
        write_response(&self.stream, "400 Bad Request", FAILURE_PAGE);
    }
}

/// Read the request head, at most `MAX_REQUEST_HEAD` bytes and never past
/// `deadline`.  Returns `None` for any path other than the callback path.
fn read_request(stream: &TcpStream, deadline: Instant) -> io::Result<Option<CallbackParams>> {
    stream.set_nonblocking(false)?;

    let mut reader = BufReader::new(stream.take(MAX_REQUEST_HEAD));
    let mut request_line = String::new();
    limit_read_timeout(stream, deadline)?;
    reader.read_line(&mut request_line)?;

    // Drain the headers so closing the socket doesn't reset the connection
    // before the browser reads our response.
    let mut header = String::new();
    loop {
        limit_read_timeout(stream, deadline)?;
        if reader.read_line(&mut header)? == 0 || header.trim_end().is_empty() {
            break;
        }
        header.clear();
    }

    Ok(parse_request_line(&request_line))
}

fn limit_read_timeout(stream: &TcpStream, deadline: Instant) -> io::Result<()> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(io::ErrorKind::TimedOut.into());
    }
    stream.set_read_timeout(Some(remaining.min(REQUEST_READ_TIMEOUT)))
}

fn parse_request_line(request_line: &str) -> Option<CallbackParams> {
    let target = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(params)
}

fn write_response(mut stream: &TcpStream, status: &str, page: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {length}\r\n\
         Connection: close\r\n\r\n{page}",
        length = page.len(),
    );
    if let Err(err) = stream
        .write_all(response.as_bytes())
        .and_then(|_| stream.flush())
    {
        log::warn!("failed to write callback response: {}", err);
    }
}

const SUCCESS_PAGE: &str = "<html>\
    <head>\
        <style>\
            body {\
                background-color: #121212;\
                color: #ffffff;\
                font-family: sans-serif;\
                display: flex;\
                justify-content: center;\
                align-items: center;\
                height: 100vh;\
                margin: 0;\
            }\
        </style>\
    </head>\
    <body>\
        <div>Successfully authenticated! You can close this window now.</div>\
    </body>\
    </html>";

const FAILURE_PAGE: &str = "<html>\
    <head>\
        <style>\
            body {\
                background-color: #121212;\
                color: #ffffff;\
                font-family: sans-serif;\
                display: flex;\
                justify-content: center;\
                align-items: center;\
                height: 100vh;\
                margin: 0;\
            }\
        </style>\
    </head>\
    <body>\
        <div>Authentication failed. Close this window and try again.</div>\
    </body>\
    </html>";

const NOT_FOUND_PAGE: &str = "<html><body>Not found</body></html>";
