//! Host credentials.

use crate::command::Secret;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// How the transport authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Password authentication
    Password(Secret),
    /// Public key authentication with a private key file
    PrivateKey(PathBuf),
}

/// Address, port, user and authentication material for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub auth: Auth,
    sudo: Secret,
}

impl Credentials {
    /// Build credentials, failing before any I/O when neither a password
    /// nor a key path is given.
    ///
    /// When both are given the key authenticates the transport and the
    /// password is kept for sudo.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Option<&str>,
        key_path: Option<&Path>,
    ) -> Result<Self> {
        let address = address.into();
        let user = user.into();
        let password = password.filter(|p| !p.is_empty());
        let key_path = key_path.filter(|k| !k.as_os_str().is_empty());

        let auth = match (password, key_path) {
            (_, Some(key)) => Auth::PrivateKey(key.to_path_buf()),
            (Some(password), None) => Auth::Password(Secret::new(password)),
            (None, None) => {
                return Err(Error::Credential {
                    host: address,
                    user,
                });
            }
        };

        Ok(Self {
            address,
            port,
            user,
            auth,
            sudo: password.map(Secret::new).unwrap_or_default(),
        })
    }

    /// Password used for privilege escalation, if any.
    pub fn sudo_secret(&self) -> &Secret {
        &self.sudo
    }
}
