//! Transport for one connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::opts::{ConnectionOptions, Scheme};

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Open the transport named by `options`.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        match options.scheme {
            Scheme::Tcp => {
                let addr = format!("{}:{}", options.host, options.port);
                debug!(%addr, "connecting over tcp");
                let tcp = TcpStream::connect(&addr).await?;
                tcp.set_nodelay(true)?;
                Ok(Self::Tcp(tcp))
            }
            #[cfg(unix)]
            Scheme::Socket => {
                debug!(path = %options.host, "connecting over unix socket");
                Ok(Self::Unix(UnixStream::connect(&options.host).await?))
            }
            #[cfg(not(unix))]
            Scheme::Socket => Err(Error::Unsupported(
                "unix sockets are not available on this platform".into(),
            )),
        }
    }

    /// Read whatever is available into the spare capacity of `buf`.
    ///
    /// Returns `Error::Connection` when the server closed the stream.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let n = match self {
            Stream::Tcp(s) => s.read_buf(buf).await?,
            #[cfg(unix)]
            Stream::Unix(s) => s.read_buf(buf).await?,
        };
        if n == 0 {
            return Err(Error::Connection("server closed the connection".into()));
        }
        Ok(n)
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.flush().await,
        }
    }
}
