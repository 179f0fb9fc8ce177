// src/sim_interface/client.rs
// Framed request/response client for the UnrealCV plugin server. Every frame is a
// little-endian magic word, a little-endian payload length and the payload. Requests
// carry a numeric id ("<id>:<command>") that the server echoes in front of the reply.

// Dependencies
use log::{debug, warn};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Frame start marker
pub const MAGIC: u32 = 0x9E2B_83C1;

// Largest payload accepted from the server (a raw 4K depth array fits comfortably)
const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Writes one frame around `payload`
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let length = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "payload larger than 4 GiB"))?;
    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads one frame and returns its payload
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    let magic = u32::from_le_bytes(word);
    if magic != MAGIC {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("bad frame magic {:#010x}", magic),
        ));
    }

    reader.read_exact(&mut word)?;
    let length = u32::from_le_bytes(word) as usize;
    if length > MAX_PAYLOAD {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", length),
        ));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Whether an I/O error means the round trip ran out of time rather than the peer going away
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

/// Connection to one simulator instance
pub struct UnrealClient<S = TcpStream> {
    stream: S,
    next_id: u32,
    greeting: String,
}

impl UnrealClient<TcpStream> {
    /// Connects and waits for the server greeting.
    /// The connection only counts as live once the greeting has arrived.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<Self> {
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, format!("cannot resolve {}", host)))?;

        let stream = match timeout {
            Some(limit) => TcpStream::connect_timeout(&address, limit)?,
            None => TcpStream::connect(address)?,
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;

        UnrealClient::from_stream(stream)
    }

    /// Closes both directions of the socket
    pub fn disconnect(self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown failed: {}", err);
        }
    }
}

impl<S: Read + Write> UnrealClient<S> {
    /// Wraps an open stream, consuming the greeting frame
    pub fn from_stream(mut stream: S) -> io::Result<Self> {
        let greeting = read_frame(&mut stream)?;
        let greeting = String::from_utf8_lossy(&greeting).into_owned();
        debug!("Simulator greeting: {}", greeting);

        Ok(UnrealClient {
            stream,
            next_id: 0,
            greeting,
        })
    }

    /// Message the server sent on connect
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Sends `message` and returns the matching reply payload.
    ///
    /// `Ok(None)` means the peer closed or reset the connection. Timeouts come back
    /// as errors (see [`is_timeout`]).
    pub fn request(&mut self, message: &str) -> io::Result<Option<Vec<u8>>> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let framed = format!("{}:{}", id, message);
        if let Err(err) = write_frame(&mut self.stream, framed.as_bytes()) {
            return dead_or_error(err);
        }

        loop {
            let payload = match read_frame(&mut self.stream) {
                Ok(payload) => payload,
                Err(err) => return dead_or_error(err),
            };
            match split_reply(&payload) {
                Some((reply_id, body)) if reply_id == id => return Ok(Some(body.to_vec())),
                Some((reply_id, _)) => {
                    debug!("Skipping stale reply {} while waiting for {}", reply_id, id);
                }
                None => warn!("Skipping unsolicited frame of {} bytes", payload.len()),
            }
        }
    }
}

fn dead_or_error(err: io::Error) -> io::Result<Option<Vec<u8>>> {
    if is_timeout(&err) {
        Err(err)
    } else {
        debug!("Connection dropped: {}", err);
        Ok(None)
    }
}

// "<id>:<body>" with a decimal id; the body may be binary
fn split_reply(payload: &[u8]) -> Option<(u32, &[u8])> {
    let colon = payload.iter().position(|&b| b == b':')?;
    let id = std::str::from_utf8(&payload[..colon]).ok()?.parse().ok()?;
    Some((id, &payload[colon + 1..]))
}
