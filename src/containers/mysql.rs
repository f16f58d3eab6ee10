//! Just enough of the MySQL client protocol to log in.
//!
//! [`login`] reads the server greeting, answers with the target's user,
//! password and database, and follows an auth switch if the server asks for
//! one. `CLIENT_CONNECT_WITH_DB` makes the server check the schema as part of
//! the login, so an OK packet means the app's credentials will work.

use std::io::{self, Read, Write};

use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::readiness::DbTarget;

const PROTOCOL_V10: u8 = 0x0a;
const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xff;
const AUTH_SWITCH: u8 = 0xfe;
const AUTH_MORE_DATA: u8 = 0x01;
const FAST_AUTH_OK: u8 = 0x03;
const FULL_AUTH_REQUIRED: u8 = 0x04;
const COM_QUIT: u8 = 0x01;

const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
const CLIENT_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH;

const UTF8_GENERAL_CI: u8 = 33;
const CLIENT_MAX_PACKET: u32 = 1 << 24;
/// Larger replies are not part of a login.
const MAX_PAYLOAD: usize = 64 * 1024;
const MAX_AUTH_ROUNDS: usize = 4;

pub const NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// Outcome of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    /// OK packet: user, password and database accepted.
    Accepted,
    /// ERR packet, as `<code>: <message>`.
    Refused(String),
    /// `caching_sha2_password` asked for the cleartext password, which needs
    /// TLS or the server's RSA key. The account exists; the password was not
    /// checked.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Greeting {
    server_version: String,
    scramble: Vec<u8>,
    auth_plugin: String,
}

/// Log in as `target` over a fresh connection.
pub fn login<S: Read + Write>(stream: S, target: &DbTarget) -> io::Result<Login> {
    let mut packets = Packets::new(stream);

    let payload = packets.read()?;
    let greeting = match payload.first() {
        Some(&PROTOCOL_V10) => parse_greeting(&payload)?,
        Some(&ERR_PACKET) => return Ok(Login::Refused(error_message(&payload))),
        _ => return Err(invalid("not a MySQL greeting")),
    };
    tracing::trace!(
        version = %greeting.server_version,
        plugin = %greeting.auth_plugin,
        "server greeting"
    );
    packets.write(&handshake_response(&greeting, target))?;

    for _ in 0..MAX_AUTH_ROUNDS {
        let reply = packets.read()?;
        match reply.first() {
            Some(&OK_PACKET) => {
                let _ = packets.command(&[COM_QUIT]);
                return Ok(Login::Accepted);
            }
            Some(&ERR_PACKET) => return Ok(Login::Refused(error_message(&reply))),
            Some(&AUTH_SWITCH) => {
                let (plugin, scramble) = parse_auth_switch(&reply);
                tracing::trace!(%plugin, "auth switch");
                packets.write(&scramble_password(&plugin, &target.password, &scramble))?;
            }
            Some(&AUTH_MORE_DATA) => match reply.get(1) {
                Some(&FAST_AUTH_OK) => {}
                Some(&FULL_AUTH_REQUIRED) => return Ok(Login::Unverified),
                _ => return Err(invalid("unexpected auth data")),
            },
            _ => return Err(invalid("unexpected login reply")),
        }
    }
    Err(invalid("too many auth rounds"))
}

fn handshake_response(greeting: &Greeting, target: &DbTarget) -> Vec<u8> {
    let plugin = client_plugin(&greeting.auth_plugin);
    let auth = scramble_password(plugin, &target.password, &greeting.scramble);

    let mut payload = Vec::with_capacity(96);
    payload.extend_from_slice(&CLIENT_CAPABILITIES.to_le_bytes());
    payload.extend_from_slice(&CLIENT_MAX_PACKET.to_le_bytes());
    payload.push(UTF8_GENERAL_CI);
    payload.extend_from_slice(&[0; 23]);
    push_nul_terminated(&mut payload, target.user.as_bytes());
    // Scrambles are 20 or 32 bytes.
    payload.push(auth.len() as u8);
    payload.extend_from_slice(&auth);
    push_nul_terminated(&mut payload, target.database.as_bytes());
    push_nul_terminated(&mut payload, plugin.as_bytes());
    payload
}

/// Plugins other than the two we speak get a native answer; the server
/// switches us if it cares.
fn client_plugin(server: &str) -> &'static str {
    if server == CACHING_SHA2_PASSWORD {
        CACHING_SHA2_PASSWORD
    } else {
        NATIVE_PASSWORD
    }
}

fn scramble_password(plugin: &str, password: &str, scramble: &[u8]) -> Vec<u8> {
    match client_plugin(plugin) {
        CACHING_SHA2_PASSWORD => caching_sha2_password(password, scramble),
        _ => native_password(password, scramble),
    }
}

/// `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`.
pub fn native_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    xor(&stage1, &hasher.finalize())
}

/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)`.
pub fn caching_sha2_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);
    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(scramble);
    xor(&stage1, &hasher.finalize())
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

fn parse_greeting(payload: &[u8]) -> io::Result<Greeting> {
    let mut fields = Fields::new(payload);
    fields.take(1)?;
    let server_version = String::from_utf8_lossy(fields.nul_terminated()).into_owned();
    fields.take(4)?; // connection id
    let mut scramble = fields.take(8)?.to_vec();
    fields.take(1)?;
    let mut capabilities = u32::from(fields.u16()?);
    let mut auth_plugin = NATIVE_PASSWORD.to_string();

    if !fields.is_empty() {
        fields.take(1)?; // charset
        fields.take(2)?; // status
        capabilities |= u32::from(fields.u16()?) << 16;
        let data_len = usize::from(fields.u8()?);
        fields.take(10)?;
        if capabilities & CLIENT_SECURE_CONNECTION != 0 {
            let part = fields.take(data_len.saturating_sub(8).max(13))?;
            scramble.extend_from_slice(part.strip_suffix(&[0]).unwrap_or(part));
        }
        if capabilities & CLIENT_PLUGIN_AUTH != 0 {
            let name = fields.nul_terminated();
            if !name.is_empty() {
                auth_plugin = String::from_utf8_lossy(name).into_owned();
            }
        }
    }

    Ok(Greeting {
        server_version,
        scramble,
        auth_plugin,
    })
}

fn parse_auth_switch(payload: &[u8]) -> (String, Vec<u8>) {
    let mut fields = Fields::new(payload.get(1..).unwrap_or_default());
    let plugin = String::from_utf8_lossy(fields.nul_terminated()).into_owned();
    let data = fields.rest;
    (plugin, data.strip_suffix(&[0]).unwrap_or(data).to_vec())
}

/// `<code>: <message>` from an ERR packet.
fn error_message(payload: &[u8]) -> String {
    let code = match payload.get(1..3) {
        Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
        _ => 0,
    };
    let mut message = payload.get(3..).unwrap_or_default();
    if message.first() == Some(&b'#') {
        message = message.get(6..).unwrap_or_default();
    }
    format!("{code}: {}", String::from_utf8_lossy(message))
}

fn push_nul_terminated(buffer: &mut Vec<u8>, value: &[u8]) {
    buffer.extend_from_slice(value);
    buffer.push(0);
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Length-prefixed packets with the protocol's sequence counter.
struct Packets<S> {
    stream: S,
    seq: u8,
}

impl<S: Read + Write> Packets<S> {
    fn new(stream: S) -> Self {
        Self { stream, seq: 0 }
    }

    fn read(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        if len > MAX_PAYLOAD {
            return Err(invalid("oversized packet"));
        }
        self.seq = header[3].wrapping_add(1);
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn write(&mut self, payload: &[u8]) -> io::Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(invalid("oversized packet"));
        }
        let len = payload.len() as u32;
        let mut packet = Vec::with_capacity(payload.len() + 4);
        packet.extend_from_slice(&len.to_le_bytes()[..3]);
        packet.push(self.seq);
        packet.extend_from_slice(payload);
        self.seq = self.seq.wrapping_add(1);
        self.stream.write_all(&packet)?;
        self.stream.flush()
    }

    /// A command starts a new sequence.
    fn command(&mut self, payload: &[u8]) -> io::Result<()> {
        self.seq = 0;
        self.write(payload)
    }
}

struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.rest.len() < n {
            return Err(invalid("truncated packet"));
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> io::Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Up to the next NUL (consumed) or the end of the packet.
    fn nul_terminated(&mut self) -> &'a [u8] {
        let end = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail.get(1..).unwrap_or_default();
        head
    }
}
