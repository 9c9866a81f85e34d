//! Endpoint parsing and normalization.
//!
//! Accepted forms:
//! - `ssh://[user@]host[:port]/path`
//! - `git://host[:port]/path`
//! - `http[s]://[user@]host[:port]/path`
//! - `file:///path`
//! - `/local/path` or `./relative/path`
//! - `user@host:path` (SCP-like), normalized to the ssh scheme with the
//!   path rooted (`git@github.com:user/repo.git` → ssh, host
//!   `github.com`, path `/user/repo.git`)

use std::fmt;

use crate::TransportError;

/// URL scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ssh,
    Git,
    Http,
    Https,
    File,
    /// Bare local path with no scheme prefix.
    Local,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Ssh => "ssh",
            Scheme::Git => "git",
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::Local => "local",
        })
    }
}

/// A parsed, normalized remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

impl Endpoint {
    /// Parse any accepted endpoint form.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint("empty endpoint".into()));
        }

        for (prefix, scheme) in [
            ("ssh://", Scheme::Ssh),
            ("git://", Scheme::Git),
            ("http://", Scheme::Http),
            ("https://", Scheme::Https),
        ] {
            if let Some(rest) = input.strip_prefix(prefix) {
                return parse_standard(scheme, rest);
            }
        }

        if let Some(rest) = input.strip_prefix("file://") {
            return Ok(Endpoint {
                scheme: Scheme::File,
                user: None,
                host: None,
                port: None,
                path: rest.to_string(),
            });
        }

        // Bare paths.
        if input.starts_with('/') || input.starts_with('.') {
            return Ok(Endpoint {
                scheme: Scheme::Local,
                user: None,
                host: None,
                port: None,
                path: input.to_string(),
            });
        }

        // SCP-like: [user@]host:path, normalized onto the ssh scheme.
        if let Some((authority, path)) = input.split_once(':') {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(format!(
                    "missing path in '{input}'"
                )));
            }
            let (user, host) = match authority.split_once('@') {
                Some((user, _)) if user.is_empty() => {
                    return Err(TransportError::InvalidEndpoint(format!(
                        "empty user in '{input}'"
                    )));
                }
                Some((user, host)) => (Some(user.to_string()), host),
                None => (None, authority),
            };
            if host.is_empty() {
                return Err(TransportError::InvalidEndpoint(format!(
                    "empty host in '{input}'"
                )));
            }
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            return Ok(Endpoint {
                scheme: Scheme::Ssh,
                user,
                host: Some(host.to_string()),
                port: None,
                path,
            });
        }

        Err(TransportError::InvalidEndpoint(format!(
            "could not parse '{input}'"
        )))
    }
}

/// Parse `[user@]host[:port]/path` after a scheme prefix.
fn parse_standard(scheme: Scheme, rest: &str) -> Result<Endpoint, TransportError> {
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };

    let (user, host_port) = match authority.split_once('@') {
        Some((user, host_port)) => (Some(user.to_string()), host_port),
        None => (None, authority),
    };

    // IPv6 hosts are bracketed: [::1] or [::1]:port.
    let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
        let close = rest.find(']').ok_or_else(|| {
            TransportError::InvalidEndpoint("unclosed IPv6 bracket".into())
        })?;
        let host = &rest[..close];
        let port = match rest[close + 1..].strip_prefix(':') {
            Some(port_str) => Some(port_str.parse::<u16>().map_err(|_| {
                TransportError::InvalidEndpoint(format!("invalid port '{port_str}'"))
            })?),
            None => None,
        };
        (host, port)
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str.parse::<u16>().map_err(|_| {
                    TransportError::InvalidEndpoint(format!("invalid port '{port_str}'"))
                })?;
                (host, Some(port))
            }
            None => (host_port, None),
        }
    };

    if host.is_empty() {
        return Err(TransportError::InvalidEndpoint("empty host".into()));
    }

    Ok(Endpoint {
        scheme,
        user,
        host: Some(host.to_string()),
        port,
        path: path.to_string(),
    })
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Local => f.write_str(&self.path),
            Scheme::File => write!(f, "file://{}", self.path),
            _ => {
                write!(f, "{}://", self.scheme)?;
                if let Some(ref user) = self.user {
                    write!(f, "{user}@")?;
                }
                if let Some(ref host) = self.host {
                    f.write_str(host)?;
                }
                if let Some(port) = self.port {
                    write!(f, ":{port}")?;
                }
                f.write_str(&self.path)
            }
        }
    }
}
