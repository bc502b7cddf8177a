//! Session lifecycle: handshake, authentication, reconnect, close.
//!
//! A session is bound to one [`Connection`]. Its identifier starts all-zero,
//! is assigned by the server on successful authentication, and is zeroed
//! again by reset or logout. Credentials are cached in memory only, solely so
//! a dropped connection can be re-established transparently; they are never
//! written anywhere.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, TransferError};
use crate::net::connection::Connection;
use crate::protocol::header::{NIL_SESSION_ID, PROTOCOL_VERSION, SESSION_ID_LEN};
use crate::protocol::packet::{
    AuthenticationRequest, CloseSession, HandshakeRequest, Packet, PacketType,
};

pub struct Session {
    conn: Connection,
    session_id: [u8; SESSION_ID_LEN],
    credentials: Option<(String, String)>,
    server_version: Option<u8>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            session_id: NIL_SESSION_ID,
            credentials: None,
            server_version: None,
        }
    }

    pub fn session_id(&self) -> &[u8; SESSION_ID_LEN] {
        &self.session_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_id != NIL_SESSION_ID
    }

    pub(crate) fn credentials(&self) -> Option<&(String, String)> {
        self.credentials.as_ref()
    }

    /// Exchange versions with the server. Returns the server's welcome
    /// message.
    pub async fn handshake(&mut self) -> Result<String> {
        self.send(&Packet::HandshakeRequest(HandshakeRequest {
            client_version: PROTOCOL_VERSION,
        }))
        .await?;

        let packet = self.recv_expect(PacketType::HandshakeResponse).await?;
        let Packet::HandshakeResponse(resp) = packet else {
            unreachable!("recv_expect returned the wrong kind");
        };

        tracing::info!(server_version = resp.server_version, "handshake complete");
        self.server_version = Some(resp.server_version);
        Ok(resp.message)
    }

    /// Authenticate and adopt the server-assigned session identifier.
    /// A denial carries the server's message as `RemoteRejected`.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let request = AuthenticationRequest::new(username, password)?;
        self.send(&Packet::AuthenticationRequest(request)).await?;

        let packet = self.recv_expect(PacketType::AuthenticationResponse).await?;
        let Packet::AuthenticationResponse(resp) = packet else {
            unreachable!("recv_expect returned the wrong kind");
        };

        if !resp.authenticated {
            return Err(TransferError::rejected(0, resp.message));
        }

        self.session_id = resp.session_id;
        self.credentials = Some((username.to_string(), password.to_string()));
        tracing::info!(user = username, "authenticated");
        Ok(())
    }

    /// Re-establish the socket and replay handshake plus authentication with
    /// the cached credentials. Only permitted after a successful login.
    pub async fn reconnect(&mut self) -> Result<()> {
        let (username, password) = self
            .credentials
            .clone()
            .ok_or(TransferError::IllegalState(
                "reconnect requires cached credentials",
            ))?;

        self.conn.reconnect().await?;
        self.session_id = NIL_SESSION_ID;
        self.handshake().await?;
        self.authenticate(&username, &password).await
    }

    /// Notify the server, then drop all session state and the socket.
    pub async fn close(&mut self) -> Result<()> {
        if self.is_authenticated() {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            self.send(&Packet::CloseSession(CloseSession { timestamp }))
                .await?;
        }

        self.reset();
        self.conn.close().await;
        Ok(())
    }

    /// Zero the session identifier and forget the cached credentials.
    pub fn reset(&mut self) {
        self.session_id = NIL_SESSION_ID;
        self.credentials = None;
    }

    /// Send `packet` stamped with this session's identifier.
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        let session_id = self.session_id;
        self.conn.send_packet(&session_id, packet).await
    }

    /// Receive the next packet, requiring kind `expected`.
    pub async fn recv_expect(&mut self, expected: PacketType) -> Result<Packet> {
        self.conn.recv_expect(expected).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::crypto::FrameCipher;
    use crate::protocol::frame;
    use crate::protocol::packet::{AuthenticationResponse, HandshakeResponse};
    use tokio::net::TcpListener;

    /// Minimal peer: answers one handshake and one authentication.
    async fn spawn_auth_server(accept: bool) -> (ClientConfig, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = ClientConfig::with_addr(listener.local_addr().unwrap().to_string());
        let cipher = FrameCipher::new(&cfg.secret_key);

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            let (_, packet) = frame::read_packet(&mut sock, &cipher, u32::MAX).await.unwrap();
            assert!(matches!(packet, Packet::HandshakeRequest(_)));
            frame::write_packet(
                &mut sock,
                &cipher,
                &NIL_SESSION_ID,
                &Packet::HandshakeResponse(HandshakeResponse {
                    server_version: 1,
                    message: "welcome".to_string(),
                }),
            )
            .await
            .unwrap();

            let (header, packet) = frame::read_packet(&mut sock, &cipher, u32::MAX).await.unwrap();
            assert_eq!(header.session_id, NIL_SESSION_ID);
            assert!(matches!(packet, Packet::AuthenticationRequest(_)));

            let resp = if accept {
                AuthenticationResponse {
                    authenticated: true,
                    session_id: [0x11; SESSION_ID_LEN],
                    message: "ok".to_string(),
                }
            } else {
                AuthenticationResponse {
                    authenticated: false,
                    session_id: NIL_SESSION_ID,
                    message: "bad credentials".to_string(),
                }
            };
            frame::write_packet(
                &mut sock,
                &cipher,
                &NIL_SESSION_ID,
                &Packet::AuthenticationResponse(resp),
            )
            .await
            .unwrap();
        });

        (cfg, handle)
    }

    #[tokio::test]
    async fn test_handshake_then_authenticate() {
        let (cfg, server) = spawn_auth_server(true).await;

        let conn = Connection::connect(&cfg).await.unwrap();
        let mut session = Session::new(conn);

        let message = session.handshake().await.unwrap();
        assert_eq!(message, "welcome");
        assert!(!session.is_authenticated());

        session.authenticate("alice", "wonderland").await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.session_id(), &[0x11; SESSION_ID_LEN]);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_denied_authentication_keeps_session_unbound() {
        let (cfg, server) = spawn_auth_server(false).await;

        let conn = Connection::connect(&cfg).await.unwrap();
        let mut session = Session::new(conn);
        session.handshake().await.unwrap();

        let err = session.authenticate("mallory", "guess").await.unwrap_err();
        match err {
            TransferError::RemoteRejected { message, .. } => {
                assert_eq!(message, "bad credentials")
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }
        assert!(!session.is_authenticated());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_without_credentials_is_illegal() {
        let (cfg, server) = spawn_auth_server(true).await;

        let conn = Connection::connect(&cfg).await.unwrap();
        let mut session = Session::new(conn);
        let err = session.reconnect().await.unwrap_err();
        assert!(matches!(err, TransferError::IllegalState(_)));

        // Complete the exchange so the server task can finish.
        session.handshake().await.unwrap();
        session.authenticate("alice", "wonderland").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_clears_identity_and_credentials() {
        let (cfg, server) = spawn_auth_server(true).await;

        let conn = Connection::connect(&cfg).await.unwrap();
        let mut session = Session::new(conn);
        session.handshake().await.unwrap();
        session.authenticate("alice", "wonderland").await.unwrap();
        server.await.unwrap();

        session.reset();
        assert!(!session.is_authenticated());
        assert!(session.credentials().is_none());
    }
}
