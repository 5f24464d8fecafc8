//! Local account and SSH key configuration
//!
//! Accounts are upserted: created when absent, password reset when present.
//! `authorized_keys` is rewritten in full on every pass.

use crate::config::UserConfig;
use crate::control::ControlPlane;
use crate::error::{ControlPlaneError, UserApplyError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Mode of the per-account `.ssh` directory
pub const SSH_DIR_MODE: u32 = 0o700;

/// Mode of `authorized_keys`
pub const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// What happened to the account itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountAction {
    Created,
    PasswordReset,
    Unchanged,
}

impl fmt::Display for AccountAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountAction::Created => write!(f, "created"),
            AccountAction::PasswordReset => write!(f, "password reset"),
            AccountAction::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// What a user pass changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub account: AccountAction,
    /// Number of keys written to `authorized_keys`
    pub keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_keys: Option<PathBuf>,
}

/// Apply one user entry through `control`
pub fn apply(
    user: &UserConfig,
    control: &dyn ControlPlane,
) -> Result<UserSummary, UserApplyError> {
    let name = user.name.trim();
    if name.is_empty() {
        return Err(UserApplyError::MissingName);
    }

    let exists = control
        .account_exists(name)
        .map_err(|source| UserApplyError::Lookup {
            user: name.to_string(),
            source,
        })?;

    let account = if !exists {
        info!("Creating user: {}", name);
        control
            .create_account(name, &user.passwd)
            .map_err(|source| UserApplyError::Create {
                user: name.to_string(),
                source,
            })?;
        AccountAction::Created
    } else if !user.passwd.is_empty() {
        debug!("User {} exists, resetting password", name);
        control
            .set_password(name, &user.passwd)
            .map_err(|source| UserApplyError::Password {
                user: name.to_string(),
                source,
            })?;
        AccountAction::PasswordReset
    } else {
        debug!("User {} exists, nothing to change", name);
        AccountAction::Unchanged
    };

    if user.sudo.is_some() {
        debug!("Ignoring sudo rules for {}", name);
    }

    let authorized_keys = if user.ssh_authorized_keys.is_empty() {
        None
    } else {
        Some(write_authorized_keys(name, &user.ssh_authorized_keys, control)?)
    };

    Ok(UserSummary {
        name: name.to_string(),
        account,
        keys: user.ssh_authorized_keys.len(),
        authorized_keys,
    })
}

/// Replace the account's `authorized_keys` with `keys`
fn write_authorized_keys(
    name: &str,
    keys: &[String],
    control: &dyn ControlPlane,
) -> Result<PathBuf, UserApplyError> {
    info!("Configuring {} SSH keys for user {}", keys.len(), name);

    let ssh_dir_err = |source: ControlPlaneError| UserApplyError::SshDirectory {
        user: name.to_string(),
        source,
    };
    let keys_err = |source: ControlPlaneError| UserApplyError::AuthorizedKeys {
        user: name.to_string(),
        source,
    };

    let ssh_dir = control.account_home(name).map_err(ssh_dir_err)?.join(".ssh");
    let authorized_keys_path = ssh_dir.join("authorized_keys");

    control
        .ensure_directory(&ssh_dir, SSH_DIR_MODE)
        .map_err(ssh_dir_err)?;

    let content = keys.join("\n") + "\n";
    control
        .write_file(&authorized_keys_path, content.as_bytes(), AUTHORIZED_KEYS_MODE)
        .map_err(keys_err)?;

    control.set_owner(&ssh_dir, name).map_err(ssh_dir_err)?;
    control
        .set_owner(&authorized_keys_path, name)
        .map_err(keys_err)?;

    Ok(authorized_keys_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::recording::{Call, RecordingControlPlane, Verb};
    use std::path::Path;

    fn user(name: &str, passwd: &str, keys: &[&str]) -> UserConfig {
        UserConfig {
            name: name.to_string(),
            passwd: passwd.to_string(),
            ssh_authorized_keys: keys.iter().map(|k| k.to_string()).collect(),
            sudo: None,
        }
    }

    #[test]
    fn test_creates_missing_account() {
        let plane = RecordingControlPlane::new();

        let summary = apply(&user("alice", "secret", &[]), &plane).unwrap();
        assert_eq!(summary.account, AccountAction::Created);
        assert_eq!(plane.password("alice").as_deref(), Some("secret"));
        assert!(plane.calls_of(Verb::SetPassword).is_empty());
        assert!(plane.calls_of(Verb::EnsureDirectory).is_empty());
    }

    #[test]
    fn test_passwordless_account() {
        let plane = RecordingControlPlane::new();

        apply(&user("alice", "", &[]), &plane).unwrap();
        assert_eq!(
            plane.calls_of(Verb::CreateAccount),
            vec![Call::CreateAccount {
                name: "alice".to_string(),
                password: String::new(),
            }]
        );
    }

    #[test]
    fn test_existing_account_gets_password_reset() {
        let plane = RecordingControlPlane::new().with_account("admin");

        let summary = apply(&user("admin", "rotated", &[]), &plane).unwrap();
        assert_eq!(summary.account, AccountAction::PasswordReset);
        assert!(plane.calls_of(Verb::CreateAccount).is_empty());
        assert_eq!(plane.password("admin").as_deref(), Some("rotated"));
    }

    #[test]
    fn test_existing_account_without_password_is_unchanged() {
        let plane = RecordingControlPlane::new().with_account("admin");

        let summary = apply(&user("admin", "", &[]), &plane).unwrap();
        assert_eq!(summary.account, AccountAction::Unchanged);
        assert!(plane.calls_of(Verb::SetPassword).is_empty());
    }

    #[test]
    fn test_authorized_keys_written_with_modes() {
        let plane = RecordingControlPlane::new().with_home_root("/home");

        let summary = apply(&user("alice", "", &["ssh-ed25519 AAA a", "ssh-rsa BBB b"]), &plane)
            .unwrap();

        let ssh_dir = Path::new("/home/alice/.ssh");
        let keys_path = ssh_dir.join("authorized_keys");
        assert_eq!(summary.keys, 2);
        assert_eq!(summary.authorized_keys.as_deref(), Some(keys_path.as_path()));

        assert!(plane.calls().contains(&Call::EnsureDirectory {
            path: ssh_dir.to_path_buf(),
            mode: 0o700,
        }));
        assert_eq!(
            plane.file(&keys_path).unwrap(),
            b"ssh-ed25519 AAA a\nssh-rsa BBB b\n".to_vec()
        );
        let writes = plane.calls_of(Verb::WriteFile);
        assert!(matches!(&writes[0], Call::WriteFile { mode: 0o600, .. }));

        assert_eq!(plane.owner(ssh_dir).as_deref(), Some("alice"));
        assert_eq!(plane.owner(&keys_path).as_deref(), Some("alice"));
    }

    #[test]
    fn test_keys_are_replaced_not_merged() {
        let plane = RecordingControlPlane::new();
        let keys_path = Path::new("/home/alice/.ssh/authorized_keys");

        apply(&user("alice", "", &["keyA"]), &plane).unwrap();
        apply(&user("alice", "", &["keyB"]), &plane).unwrap();

        assert_eq!(plane.file(keys_path).unwrap(), b"keyB\n".to_vec());
        // Second pass found the account and left it alone
        assert_eq!(plane.calls_of(Verb::CreateAccount).len(), 1);
    }

    #[test]
    fn test_missing_name() {
        let plane = RecordingControlPlane::new();
        let err = apply(&user("  ", "pw", &[]), &plane).unwrap_err();
        assert!(matches!(err, UserApplyError::MissingName));
        assert!(plane.calls().is_empty());
    }

    #[test]
    fn test_fail_fast_on_create() {
        let plane = RecordingControlPlane::new().fail_on(Verb::CreateAccount, "access denied");

        let err = apply(&user("alice", "pw", &["keyA"]), &plane).unwrap_err();
        assert!(matches!(err, UserApplyError::Create { .. }));
        assert!(err.to_string().contains("alice"));
        assert!(err.to_string().contains("access denied"));
        assert!(plane.calls_of(Verb::WriteFile).is_empty());
    }

    #[test]
    fn test_write_failure_keeps_directory() {
        let plane = RecordingControlPlane::new().fail_on(Verb::WriteFile, "disk full");

        let err = apply(&user("alice", "", &["keyA"]), &plane).unwrap_err();
        assert!(matches!(err, UserApplyError::AuthorizedKeys { .. }));
        assert!(plane.has_directory(Path::new("/home/alice/.ssh")));
        assert!(plane.has_account("alice"));
    }
}
