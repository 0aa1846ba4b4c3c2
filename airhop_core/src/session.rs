use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::net::TcpStream;

use crate::rendezvous::{Passphrase, derive_key, derive_network_name};
use crate::transfer::codec::ChunkKey;

/// Which end of the transfer this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sending"),
            Role::Receiver => f.write_str("receiving"),
        }
    }
}

/// State of one file transfer, created once per invocation.
///
/// The passphrase is fixed at construction and only used locally to derive
/// the network name and the chunk key.
#[derive(Debug)]
pub struct TransferSession {
    role: Role,
    file_path: PathBuf,
    passphrase: Passphrase,
    network_name: String,
    port: u16,
    peer_ip: Option<IpAddr>,
    connection: Option<TcpStream>,
}

impl TransferSession {
    /// `file_path` is read on the sending role and written on the receiving role.
    pub fn new(role: Role, file_path: impl Into<PathBuf>, passphrase: Passphrase, port: u16) -> Self {
        let network_name = derive_network_name(&passphrase);
        Self {
            role,
            file_path: file_path.into(),
            passphrase,
            network_name,
            port,
            peer_ip: None,
            connection: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn key(&self) -> ChunkKey {
        derive_key(&self.passphrase)
    }

    /// Recorded by the wireless link once the peer has associated.
    pub fn set_peer_ip(&mut self, ip: IpAddr) {
        self.peer_ip = Some(ip);
    }

    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_ip
    }

    /// Address the sending role dials.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_ip.map(|ip| SocketAddr::new(ip, self.port))
    }

    pub fn attach_connection(&mut self, stream: TcpStream) {
        self.connection = Some(stream);
    }

    /// Hands the connection to the task that drives the stream pump.
    pub fn take_connection(&mut self) -> Option<TcpStream> {
        self.connection.take()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_derives_name_from_passphrase() {
        let pass = Passphrase::new("correct-horse");
        let expected = derive_network_name(&pass);
        let session = TransferSession::new(Role::Sender, "a.bin", pass, 3290);
        assert_eq!(session.network_name(), expected);
        assert_eq!(session.peer_addr(), None);
    }

    #[test]
    fn test_both_roles_share_name_and_key() {
        let send = TransferSession::new(Role::Sender, "a.bin", Passphrase::new("XK4Q7M2P"), 3290);
        let recv = TransferSession::new(Role::Receiver, "b.bin", Passphrase::new("XK4Q7M2P"), 3290);
        assert_eq!(send.network_name(), recv.network_name());
        assert_eq!(send.key(), recv.key());
    }

    #[test]
    fn test_peer_addr_uses_session_port() {
        let mut session =
            TransferSession::new(Role::Sender, "a.bin", Passphrase::new("pw"), 4000);
        session.set_peer_ip("10.0.0.2".parse().unwrap());
        assert_eq!(session.peer_addr(), Some("10.0.0.2:4000".parse().unwrap()));
    }

    #[test]
    fn test_debug_does_not_leak_passphrase() {
        let session =
            TransferSession::new(Role::Receiver, "a.bin", Passphrase::new("hunter22"), 3290);
        assert!(!format!("{:?}", session).contains("hunter22"));
    }
}
