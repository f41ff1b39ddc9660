//! Typed protocol messages.
//!
//! A connection to a Software House opens with a [`Command`]; the fields
//! that follow depend on it. A Developer session with the Linker has no
//! command: it starts directly with the entry-point string.

use crate::codec::{WireError, WireStream};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

/// Opening command of a connection to a Software House.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request new licenses (`REQ`).
    Request,
    /// Verify and redeem a wrapped license (`VER`).
    Verify,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Request => "REQ",
            Command::Verify => "VER",
        }
    }

    /// Parse a command name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("REQ") {
            Some(Command::Request)
        } else if s.eq_ignore_ascii_case("VER") {
            Some(Command::Verify)
        } else {
            None
        }
    }

    pub async fn write_to<S>(&self, stream: &mut WireStream<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_string(self.as_str()).await
    }

    pub async fn read_from<S>(stream: &mut WireStream<S>) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let raw = stream.read_string().await?;
        Self::parse(&raw).ok_or(WireError::UnknownCommand(raw))
    }
}

/// Developer -> SWH: body of a `REQ` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    pub library: String,
    pub count: i32,
}

impl LicenseRequest {
    pub async fn write_to<S>(&self, stream: &mut WireStream<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_string(&self.library).await?;
        stream.write_int(self.count).await
    }

    pub async fn read_from<S>(stream: &mut WireStream<S>) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let library = stream.read_string().await?;
        let count = stream.read_int().await?;
        Ok(Self { library, count })
    }
}

/// SWH -> Developer: one issued license, as plaintext and wrapped token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedLicense {
    pub token: String,
    pub wrapped_token: String,
}

impl IssuedLicense {
    pub async fn write_to<S>(&self, stream: &mut WireStream<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_string(&self.token).await?;
        stream.write_string(&self.wrapped_token).await
    }

    pub async fn read_from<S>(stream: &mut WireStream<S>) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let token = stream.read_string().await?;
        let wrapped_token = stream.read_string().await?;
        Ok(Self {
            token,
            wrapped_token,
        })
    }
}

/// Linker (or Developer) -> SWH: body of a `VER` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub wrapped_token: String,
    /// Identity of the party the artifact is ultimately for.
    pub identity: String,
}

impl VerifyRequest {
    pub async fn write_to<S>(&self, stream: &mut WireStream<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_string(&self.wrapped_token).await?;
        stream.write_string(&self.identity).await
    }

    pub async fn read_from<S>(stream: &mut WireStream<S>) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let wrapped_token = stream.read_string().await?;
        let identity = stream.read_string().await?;
        Ok(Self {
            wrapped_token,
            identity,
        })
    }
}

/// Developer -> Linker: one dependency to redeem and where to redeem it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDecl {
    pub host: String,
    pub port: i32,
    pub wrapped_token: String,
}

impl DependencyDecl {
    /// The declared port, if it is a valid TCP port.
    pub fn port(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|p| *p != 0)
    }

    pub async fn write_to<S>(&self, stream: &mut WireStream<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_string(&self.host).await?;
        stream.write_int(self.port).await?;
        stream.write_string(&self.wrapped_token).await
    }

    pub async fn read_from<S>(stream: &mut WireStream<S>) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let host = stream.read_string().await?;
        let port = stream.read_int().await?;
        let wrapped_token = stream.read_string().await?;
        Ok(Self {
            host,
            port,
            wrapped_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_command_parse_is_case_insensitive() {
        assert_eq!(Command::parse("REQ"), Some(Command::Request));
        assert_eq!(Command::parse("ver"), Some(Command::Verify));
        assert_eq!(Command::parse("Ver"), Some(Command::Verify));
        assert_eq!(Command::parse("DEL"), None);
    }

    #[test]
    fn test_dependency_port_validation() {
        let mut decl = DependencyDecl {
            host: "swh.local".to_string(),
            port: 7400,
            wrapped_token: "00".to_string(),
        };
        assert_eq!(decl.port(), Some(7400));
        decl.port = -1;
        assert_eq!(decl.port(), None);
        decl.port = 70_000;
        assert_eq!(decl.port(), None);
        decl.port = 0;
        assert_eq!(decl.port(), None);
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let (a, b) = duplex(1024);
        let mut a = WireStream::new(a);
        let mut b = WireStream::new(b);
        a.write_string("DROP").await.unwrap();
        match Command::read_from(&mut b).await {
            Err(WireError::UnknownCommand(cmd)) => assert_eq!(cmd, "DROP"),
            other => panic!("Expected UnknownCommand, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_exchange_shape() {
        let (a, b) = duplex(4096);
        let mut linker = WireStream::new(a);
        let mut swh = WireStream::new(b);

        Command::Verify.write_to(&mut linker).await.unwrap();
        VerifyRequest {
            wrapped_token: "deadbeef".to_string(),
            identity: "10.0.0.5:51000".to_string(),
        }
        .write_to(&mut linker)
        .await
        .unwrap();

        assert_eq!(Command::read_from(&mut swh).await.unwrap(), Command::Verify);
        let req = VerifyRequest::read_from(&mut swh).await.unwrap();
        assert_eq!(req.wrapped_token, "deadbeef");
        assert_eq!(req.identity, "10.0.0.5:51000");
    }

    #[test]
    fn test_issued_license_json() {
        let issued = IssuedLicense {
            token: "ab".to_string(),
            wrapped_token: "cd".to_string(),
        };
        let json = serde_json::to_string(&issued).unwrap();
        assert!(json.contains("wrapped_token"));
    }
}
